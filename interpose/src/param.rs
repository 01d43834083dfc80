//! 参数描述（ParamInfo）
//!
//! 每次被拦截的调用都会新建一组 [`ParamInfo`]，交给拦截处理器查看与修改。
//! 按引用与输出参数在调用结束后写回调用方。

use crate::error::{ProxyError, ProxyResult};
use crate::value::{Args, TypeInfo, Value};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;

/// 参数传递方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Passing {
    /// 按值传递
    Value,
    /// 按引用传递（`&mut T`，调用前的值对被调方可见）
    Ref,
    /// 输出参数（`&mut T`，只写，不读取调用方的值）
    Out,
}

impl Passing {
    /// 是否按引用传递（输出参数同样按引用传递）
    pub fn is_by_ref(self) -> bool {
        matches!(self, Passing::Ref | Passing::Out)
    }

    pub fn is_out(self) -> bool {
        matches!(self, Passing::Out)
    }
}

impl fmt::Display for Passing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Passing::Value => write!(f, "value"),
            Passing::Ref => write!(f, "ref"),
            Passing::Out => write!(f, "out"),
        }
    }
}

/// 被拦截方法的单个参数信息
pub struct ParamInfo {
    name: Cow<'static, str>,
    param_type: TypeInfo,
    is_by_ref: bool,
    is_out: bool,
    value: Option<Value>,
}

impl ParamInfo {
    /// 创建参数信息，值为空
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        param_type: TypeInfo,
        is_by_ref: bool,
        is_out: bool,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            is_by_ref,
            is_out,
            value: None,
        }
    }

    pub(crate) fn with_passing(
        name: impl Into<Cow<'static, str>>,
        param_type: TypeInfo,
        passing: Passing,
    ) -> Self {
        Self::new(name, param_type, passing.is_by_ref(), passing.is_out())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 参数声明的类型（按引用参数为其指向的类型）
    pub fn param_type(&self) -> TypeInfo {
        self.param_type
    }

    pub fn is_by_ref(&self) -> bool {
        self.is_by_ref
    }

    pub fn is_out(&self) -> bool {
        self.is_out
    }

    /// 当前值；输出参数在被写入之前为 `None`
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn get<T: Any>(&self) -> ProxyResult<&T> {
        self.value
            .as_ref()
            .ok_or_else(|| ProxyError::MissingValue(format!("parameter '{}'", self.name)))?
            .downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self) -> ProxyResult<&mut T> {
        let name = &self.name;
        self.value
            .as_mut()
            .ok_or_else(|| ProxyError::MissingValue(format!("parameter '{}'", name)))?
            .downcast_mut::<T>()
    }

    /// 设置参数值，类型必须与声明类型一致
    pub fn set<T: Any + Send + Clone>(&mut self, value: T) -> ProxyResult<()> {
        self.set_value(Value::new(value))
    }

    pub fn set_value(&mut self, value: Value) -> ProxyResult<()> {
        if value.type_info() != self.param_type {
            return Err(ProxyError::type_mismatch(
                self.param_type.name(),
                value.type_info().name(),
            ));
        }
        self.value = Some(value);
        Ok(())
    }

    pub fn take_value(&mut self) -> Option<Value> {
        self.value.take()
    }

    /// 为调用具体方法读取值：可复制的值返回拷贝，否则取走
    fn read_for_call(&mut self) -> ProxyResult<Value> {
        if let Some(copy) = self.value.as_ref().and_then(Value::try_clone) {
            return Ok(copy);
        }
        self.value
            .take()
            .ok_or_else(|| ProxyError::MissingValue(format!("parameter '{}'", self.name)))
    }
}

impl fmt::Debug for ParamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamInfo")
            .field("name", &self.name)
            .field("type", &self.param_type.name())
            .field("is_by_ref", &self.is_by_ref)
            .field("is_out", &self.is_out)
            .field("value", &self.value)
            .finish()
    }
}

impl Args {
    /// 终端链接：由参数信息生成调用具体方法所用的私有槽位
    ///
    /// 按值与按引用参数复制当前值，输出参数留空
    pub(crate) fn from_params(params: &mut [ParamInfo]) -> ProxyResult<Args> {
        let mut slots = Args::with_capacity(params.len());
        for param in params.iter_mut() {
            if param.is_out() {
                slots.push_unset();
            } else {
                slots.push(Some(param.read_for_call()?));
            }
        }
        Ok(slots)
    }

    /// 终端链接：具体方法返回后，把按引用与输出参数写回参数信息
    pub(crate) fn write_back(&mut self, params: &mut [ParamInfo]) -> ProxyResult<()> {
        for (index, param) in params.iter_mut().enumerate() {
            if !param.is_by_ref() {
                continue;
            }
            if let Some(value) = self.take_value(index) {
                param.set_value(value)?;
            }
        }
        Ok(())
    }
}
