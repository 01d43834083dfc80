//! 拦截处理器能力
//!
//! 调用链中的每一环都是一个 [`InterceptionHandler`]。处理器收到续延
//! （代表"链的剩余部分"）与参数信息，可以调用续延零次、一次或多次，
//! 也可以替换返回值、在调用前后修改参数。

use crate::descriptor::TypeDescriptor;
use crate::error::{ProxyError, ProxyResult};
use crate::param::ParamInfo;
use crate::value::{TypeInfo, Value};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

type ValueLink<'a> = dyn Fn(&mut [ParamInfo]) -> ProxyResult<Value> + 'a;
type VoidLink<'a> = dyn Fn(&mut [ParamInfo]) -> ProxyResult<()> + 'a;

/// 有返回值方法的续延
#[derive(Clone, Copy)]
pub struct Continuation<'a> {
    method: &'a str,
    next: &'a ValueLink<'a>,
}

impl<'a> Continuation<'a> {
    pub fn new(method: &'a str, next: &'a ValueLink<'a>) -> Self {
        Self { method, next }
    }

    /// 被拦截的方法（`Interface::method`）
    pub fn method(&self) -> &str {
        self.method
    }

    /// 执行内层处理器与目标方法
    pub fn proceed(&self, params: &mut [ParamInfo]) -> ProxyResult<Value> {
        (self.next)(params)
    }
}

/// 无返回值方法的续延
#[derive(Clone, Copy)]
pub struct VoidContinuation<'a> {
    method: &'a str,
    next: &'a VoidLink<'a>,
}

impl<'a> VoidContinuation<'a> {
    pub fn new(method: &'a str, next: &'a VoidLink<'a>) -> Self {
        Self { method, next }
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn proceed(&self, params: &mut [ParamInfo]) -> ProxyResult<()> {
        (self.next)(params)
    }
}

/// 拦截处理器
///
/// 根据被拦截方法有无返回值，调用链选择 `intercept_value` 或 `intercept_void`。
/// 默认实现直接转发给续延。
///
/// ```ignore
/// struct Doubling;
///
/// impl InterceptionHandler for Doubling {
///     fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
///         let result = next.proceed(params)?.downcast::<i32>()?;
///         Ok(Value::new(result * 2))
///     }
/// }
/// ```
pub trait InterceptionHandler: Send + Sync {
    /// 处理器名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 实例的具体类型，构造代理时用于核对处理器槽位
    fn concrete_type(&self) -> TypeInfo
    where
        Self: 'static,
    {
        TypeInfo::of::<Self>()
    }

    /// 拦截有返回值的方法
    fn intercept_value(
        &self,
        next: Continuation<'_>,
        params: &mut [ParamInfo],
    ) -> ProxyResult<Value> {
        next.proceed(params)
    }

    /// 拦截无返回值的方法
    fn intercept_void(&self, next: VoidContinuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<()> {
        next.proceed(params)
    }
}

static HANDLER_CAPABILITY: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    TypeDescriptor::interface::<dyn InterceptionHandler>()
        .named("InterceptionHandler")
        .build()
});

/// 处理器能力的接口描述
///
/// 一个处理器类型合法，当且仅当它的描述可以赋值给该接口
pub fn handler_capability() -> Arc<TypeDescriptor> {
    HANDLER_CAPABILITY.clone()
}

/// 处理器类型 `H` 的描述
///
/// `H` 可以是具体类型，也可以是继承了 [`InterceptionHandler`] 的 `dyn Trait`。
/// 后者描述为继承处理器能力的接口，任何实现了该 trait 的实例都可以填入它的槽位
pub fn handler_type<H>() -> Arc<TypeDescriptor>
where
    H: ?Sized + InterceptionHandler + 'static,
{
    let name = short_type_name(std::any::type_name::<H>());
    // 指向 trait 对象的引用是胖指针
    if std::mem::size_of::<&H>() != std::mem::size_of::<&()>() {
        return TypeDescriptor::interface::<H>()
            .named(name)
            .extends(handler_capability())
            .build();
    }
    TypeDescriptor::class::<H>()
        .named(name)
        .implements(handler_capability())
        .build()
}

/// 去掉模块路径的类型名（保留泛型参数）
pub(crate) fn short_type_name(full: &str) -> String {
    let (base, generics) = match full.find('<') {
        Some(index) => full.split_at(index),
        None => (full, ""),
    };
    let base = base.rsplit("::").next().unwrap_or(base);
    format!("{}{}", base, generics)
}

/// 处理器注册器
///
/// 用于 inventory 自动收集处理器类型，配置文件通过名称引用它们
pub struct HandlerRegistration {
    /// 处理器名称
    pub name: &'static str,

    /// 生成处理器类型描述的函数
    pub descriptor: fn() -> Arc<TypeDescriptor>,
}

impl HandlerRegistration {
    pub const fn new(name: &'static str, descriptor: fn() -> Arc<TypeDescriptor>) -> Self {
        Self { name, descriptor }
    }
}

inventory::collect!(HandlerRegistration);

/// 获取所有注册的处理器注册器
pub fn get_all_handler_registrations() -> impl Iterator<Item = &'static HandlerRegistration> {
    inventory::iter::<HandlerRegistration>()
}

/// 注册处理器类型，使其可以在配置文件中按名称引用
///
/// ```ignore
/// interpose::register_handler!(AuditHandler, "audit");
/// ```
#[macro_export]
macro_rules! register_handler {
    ($handler:ty, $name:expr) => {
        $crate::inventory::submit! {
            $crate::HandlerRegistration::new($name, || $crate::handler_type::<$handler>())
        }
    };
}

/// 处理器目录：名称到处理器类型描述的映射
#[derive(Debug, Default, Clone)]
pub struct HandlerCatalog {
    entries: HashMap<String, Arc<TypeDescriptor>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 inventory 加载所有注册的处理器
    pub fn from_inventory() -> Self {
        let mut catalog = Self::new();
        for registration in get_all_handler_registrations() {
            tracing::debug!("  ├─ Loading interception handler: {}", registration.name);
            catalog.register(registration.name, (registration.descriptor)());
        }
        tracing::debug!("Loaded {} interception handler(s)", catalog.len());
        catalog
    }

    /// 注册处理器，同名时覆盖
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<TypeDescriptor>) {
        let name = name.into();
        if self.entries.insert(name.clone(), handler).is_some() {
            tracing::warn!("Interception handler '{}' registered twice, keeping the latest", name);
        }
    }

    /// 注册处理器类型 `H`
    pub fn register_type<H>(&mut self, name: impl Into<String>)
    where
        H: ?Sized + InterceptionHandler + 'static,
    {
        self.register(name, handler_type::<H>());
    }

    pub fn resolve(&self, name: &str) -> ProxyResult<Arc<TypeDescriptor>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ProxyError::Config(format!("unknown interception handler '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
