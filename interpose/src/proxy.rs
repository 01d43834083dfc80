//! 类型化代理
//!
//! `#[interface]` 为 trait 生成标记类型与 [`Interface`] 实现，并为 [`Proxy`]
//! 生成该 trait 的实现；`#[intercepted]` 为实现类型生成 [`ImplementationOf`]。
//! 于是 `Proxy<CalculatorInterface, SimpleCalculator>` 可以直接当作
//! `dyn Calculator` 使用。

use crate::cache::global_cache;
use crate::descriptor::{ClassBuilder, TypeDescriptor};
use crate::error::{ProxyError, ProxyResult};
use crate::factory::{ProxyInstance, ProxyType};
use crate::handler::{short_type_name, InterceptionHandler};
use crate::value::TypeInfo;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 接口标记类型
pub trait Interface: Send + Sync + 'static {
    /// 接口描述，键为标记类型自身
    fn descriptor() -> Arc<TypeDescriptor>;
}

/// 接口继承关系：`Self` 继承（或就是）`M`
pub trait Extends<M: Interface>: Interface {}

/// 实现类型对接口 `M` 的方法绑定
pub trait ImplementationOf<M: Interface>: Send + Sync + Sized + 'static {
    /// 向类型描述中加入实现的接口与方法
    fn bind(class: ClassBuilder) -> ClassBuilder;
}

/// 实现类型 `C` 作为接口 `M` 的实现时的描述
pub fn implementation_descriptor<M, C>() -> Arc<TypeDescriptor>
where
    M: Interface,
    C: ImplementationOf<M>,
{
    let class = TypeDescriptor::class::<C>().named(short_type_name(std::any::type_name::<C>()));
    C::bind(class).build()
}

/// 接口 `M` 在实现 `C` 之上的代理
pub struct Proxy<M, C> {
    instance: ProxyInstance,
    target: Arc<C>,
    marker: PhantomData<fn() -> M>,
}

impl<M, C> Proxy<M, C>
where
    M: Interface,
    C: ImplementationOf<M>,
{
    /// 经过全局缓存获取代理类型
    pub fn proxy_type() -> ProxyResult<Arc<ProxyType>> {
        global_cache().get_or_build_with(TypeInfo::of::<M>(), TypeInfo::of::<C>(), || {
            (M::descriptor(), implementation_descriptor::<M, C>())
        })
    }

    /// 创建代理，`handlers` 按 [`ProxyType::handler_types`] 的顺序排列
    pub fn new(target: C, handlers: Vec<Arc<dyn InterceptionHandler>>) -> ProxyResult<Self> {
        Self::from_arc(Arc::new(target), handlers)
    }

    pub fn from_arc(target: Arc<C>, handlers: Vec<Arc<dyn InterceptionHandler>>) -> ProxyResult<Self> {
        let proxy_type = Self::proxy_type()?;
        Self::with_type(&proxy_type, target, handlers)
    }

    /// 使用指定的代理类型（例如另一个缓存或未缓存的构建结果）
    pub fn with_type(
        proxy_type: &Arc<ProxyType>,
        target: Arc<C>,
        handlers: Vec<Arc<dyn InterceptionHandler>>,
    ) -> ProxyResult<Self> {
        let interface = TypeInfo::of::<M>();
        let implementation = TypeInfo::of::<C>();
        if proxy_type.interface().key() != interface
            || proxy_type.implementation().key() != implementation
        {
            return Err(ProxyError::ProxyTypeMismatch {
                proxy: proxy_type.name().to_string(),
                built: format!(
                    "{} on {}",
                    proxy_type.interface(),
                    proxy_type.implementation()
                ),
                requested: format!("{} on {}", interface, implementation),
            });
        }
        let instance = proxy_type.construct(target.clone(), handlers)?;
        Ok(Self {
            instance,
            target,
            marker: PhantomData,
        })
    }
}

impl<M, C> Proxy<M, C> {
    /// 底层的代理实例，可用于按名称调用
    pub fn instance(&self) -> &ProxyInstance {
        &self.instance
    }

    /// 被代理的实现
    pub fn target(&self) -> &C {
        &self.target
    }

    pub fn target_arc(&self) -> &Arc<C> {
        &self.target
    }
}

impl<M, C> fmt::Debug for Proxy<M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("instance", &self.instance)
            .finish()
    }
}

/// 宏生成代码使用的辅助函数
#[doc(hidden)]
pub mod __private {
    use crate::error::{ProxyError, ProxyResult};
    use crate::value::{Args, Value};
    use std::any::Any;

    /// 类型化调用没有错误通道，调用期错误直接 panic
    pub fn fail(method: &str, error: ProxyError) -> ! {
        panic!("call to {} through interception proxy failed: {}", method, error)
    }

    pub fn returned<T: Any>(method: &str, result: ProxyResult<Option<Value>>) -> T {
        let value = result.and_then(|value| {
            value
                .ok_or_else(|| ProxyError::MissingReturn(method.to_string()))?
                .downcast::<T>()
        });
        match value {
            Ok(value) => value,
            Err(error) => fail(method, error),
        }
    }

    pub fn completed(method: &str, result: ProxyResult<Option<Value>>) {
        if let Err(error) = result {
            fail(method, error);
        }
    }

    /// 把按引用或输出参数的最终值写回调用方的变量；槽位为空时保持原值
    pub fn write_back<T: Any>(method: &str, args: &mut Args, index: usize, slot: &mut T) {
        if let Some(value) = args.take_value(index) {
            match value.downcast::<T>() {
                Ok(value) => *slot = value,
                Err(error) => fail(method, error),
            }
        }
    }

    /// 终端调用读取输出参数：尚未赋值时使用默认值
    pub fn out_value<T: Any + Default>(args: &mut Args, index: usize) -> ProxyResult<T> {
        Ok(args
            .take_value(index)
            .map(Value::downcast::<T>)
            .transpose()?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::__private::*;
    use crate::error::ProxyError;
    use crate::value::{Args, Value};

    #[test]
    fn test_returned_downcasts() {
        let value: i32 = returned("Calc::sum", Ok(Some(Value::new(5i32))));
        assert_eq!(value, 5);
    }

    #[test]
    #[should_panic(expected = "Calc::sum")]
    fn test_returned_panics_with_method_name() {
        let _: i32 = returned("Calc::sum", Err(ProxyError::handler(anyhow::anyhow!("denied"))));
    }

    #[test]
    fn test_write_back_keeps_value_when_unset() {
        let mut args = Args::new().unset().arg(9i32);
        let mut first = 1i32;
        let mut second = 2i32;

        write_back("Calc::swap", &mut args, 0, &mut first);
        write_back("Calc::swap", &mut args, 1, &mut second);

        assert_eq!(first, 1);
        assert_eq!(second, 9);
    }

    #[test]
    fn test_out_value_defaults() {
        let mut args = Args::new().unset().arg(String::from("set"));
        assert_eq!(out_value::<String>(&mut args, 0).unwrap(), "");
        assert_eq!(out_value::<String>(&mut args, 1).unwrap(), "set");
    }
}
