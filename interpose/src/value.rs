//! 类型擦除的值与参数槽位
//!
//! 拦截链在运行时才知道方法签名，参数与返回值都以 [`Value`] 的形式传递，
//! 读取时显式向下转型，类型不符时返回 [`ProxyError::TypeMismatch`]。

use crate::error::{ProxyError, ProxyResult};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// 类型标识
///
/// 由 `TypeId` 与类型名组成，相等性只比较 `TypeId`
#[derive(Clone, Copy)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    /// 获取类型 `T` 的标识
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 是否为类型 `T`
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeInfo({})", self.name)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

trait Erased: Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn try_clone(&self) -> Option<Box<dyn Erased>>;
}

struct Cloneable<T>(T);

struct Opaque<T>(T);

impl<T: Any + Send + Clone> Erased for Cloneable<T> {
    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.0
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        Box::new(self.0)
    }

    fn try_clone(&self) -> Option<Box<dyn Erased>> {
        Some(Box::new(Cloneable(self.0.clone())))
    }
}

impl<T: Any + Send> Erased for Opaque<T> {
    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.0
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        Box::new(self.0)
    }

    fn try_clone(&self) -> Option<Box<dyn Erased>> {
        None
    }
}

/// 类型擦除的值
///
/// - [`Value::new`] 创建可复制的值，每次读取都得到一份拷贝，
///   因此续延（continuation）可以被多次调用
/// - [`Value::opaque`] 创建不可复制的值，只能被取走一次
pub struct Value {
    type_info: TypeInfo,
    inner: Box<dyn Erased>,
}

impl Value {
    /// 创建可复制的值
    pub fn new<T: Any + Send + Clone>(value: T) -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            inner: Box::new(Cloneable(value)),
        }
    }

    /// 创建不可复制的值（常用于返回值）
    pub fn opaque<T: Any + Send>(value: T) -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            inner: Box::new(Opaque(value)),
        }
    }

    /// 值的实际类型
    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_info.is::<T>()
    }

    /// 是否可以复制
    pub fn is_cloneable(&self) -> bool {
        self.inner.try_clone().is_some()
    }

    /// 复制值，不可复制时返回 `None`
    pub fn try_clone(&self) -> Option<Value> {
        self.inner.try_clone().map(|inner| Value {
            type_info: self.type_info,
            inner,
        })
    }

    pub fn downcast_ref<T: Any>(&self) -> ProxyResult<&T> {
        self.inner
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| ProxyError::type_mismatch(std::any::type_name::<T>(), self.type_info.name()))
    }

    pub fn downcast_mut<T: Any>(&mut self) -> ProxyResult<&mut T> {
        let found = self.type_info.name();
        self.inner
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| ProxyError::type_mismatch(std::any::type_name::<T>(), found))
    }

    /// 取出内部值
    pub fn downcast<T: Any>(self) -> ProxyResult<T> {
        let found = self.type_info.name();
        self.inner
            .into_any()
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| ProxyError::type_mismatch(std::any::type_name::<T>(), found))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.type_info.name())
    }
}

/// 按位置排列的参数槽位
///
/// 调用方用它传递实参；终端链接也用它作为调用具体方法时的私有槽位。
/// `None` 表示尚无有效值的输出参数。
#[derive(Debug, Default)]
pub struct Args {
    slots: Vec<Option<Value>>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// 追加一个实参（构建器形式）
    pub fn arg<T: Any + Send + Clone>(mut self, value: T) -> Self {
        self.push_value(value);
        self
    }

    /// 追加一个尚未赋值的输出参数（构建器形式）
    pub fn unset(mut self) -> Self {
        self.push_unset();
        self
    }

    pub fn push(&mut self, value: Option<Value>) {
        self.slots.push(value);
    }

    pub fn push_value<T: Any + Send + Clone>(&mut self, value: T) {
        self.slots.push(Some(Value::new(value)));
    }

    pub fn push_unset(&mut self) {
        self.slots.push(None);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 查看槽位中的值
    pub fn slot(&self, index: usize) -> Option<&Value> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get<T: Any>(&self, index: usize) -> ProxyResult<&T> {
        self.slot_ref(index)?
            .as_ref()
            .ok_or_else(|| ProxyError::MissingValue(format!("argument #{}", index)))?
            .downcast_ref::<T>()
    }

    /// 取走槽位中的值并转型
    pub fn take<T: Any>(&mut self, index: usize) -> ProxyResult<T> {
        self.slot_mut(index)?
            .take()
            .ok_or_else(|| ProxyError::MissingValue(format!("argument #{}", index)))?
            .downcast::<T>()
    }

    /// 取走槽位中的值，越界或为空时返回 `None`
    pub fn take_value(&mut self, index: usize) -> Option<Value> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    pub fn set<T: Any + Send + Clone>(&mut self, index: usize, value: T) -> ProxyResult<()> {
        self.set_value(index, Value::new(value))
    }

    pub fn set_value(&mut self, index: usize, value: Value) -> ProxyResult<()> {
        *self.slot_mut(index)? = Some(value);
        Ok(())
    }

    fn slot_ref(&self, index: usize) -> ProxyResult<&Option<Value>> {
        let len = self.slots.len();
        self.slots
            .get(index)
            .ok_or(ProxyError::ArgumentOutOfRange { index, len })
    }

    fn slot_mut(&mut self, index: usize) -> ProxyResult<&mut Option<Value>> {
        let len = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or(ProxyError::ArgumentOutOfRange { index, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_info_equality_ignores_name() {
        assert_eq!(TypeInfo::of::<i32>(), TypeInfo::of::<i32>());
        assert_ne!(TypeInfo::of::<i32>(), TypeInfo::of::<i64>());
        assert!(TypeInfo::of::<String>().is::<String>());
        assert_eq!(TypeInfo::of::<u8>().to_string(), "u8");
    }

    #[test]
    fn test_value_downcast_fails_loudly() {
        let value = Value::new(42i32);

        assert_eq!(*value.downcast_ref::<i32>().unwrap(), 42);
        let err = value.downcast_ref::<String>().unwrap_err();
        assert!(matches!(err, ProxyError::TypeMismatch { .. }));

        let err = value.downcast::<u64>().unwrap_err();
        assert_eq!(err.to_string(), "type mismatch: expected u64, found i32");
    }

    #[test]
    fn test_cloneable_and_opaque_values() {
        let value = Value::new(String::from("hello"));
        let copy = value.try_clone().unwrap();
        assert_eq!(copy.downcast::<String>().unwrap(), "hello");
        assert!(value.is_cloneable());

        struct Handle;
        let handle = Value::opaque(Handle);
        assert!(handle.try_clone().is_none());
        assert!(handle.is::<Handle>());
    }

    #[test]
    fn test_value_downcast_mut() {
        let mut value = Value::new(vec![1, 2]);
        value.downcast_mut::<Vec<i32>>().unwrap().push(3);
        assert_eq!(value.downcast::<Vec<i32>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_args_slots() {
        let mut args = Args::new().arg(5i32).unset().arg(String::from("x"));

        assert_eq!(args.len(), 3);
        assert_eq!(*args.get::<i32>(0).unwrap(), 5);
        assert!(args.slot(1).is_none());
        assert!(matches!(args.get::<i32>(1), Err(ProxyError::MissingValue(_))));
        assert!(matches!(
            args.take::<i32>(7),
            Err(ProxyError::ArgumentOutOfRange { index: 7, len: 3 })
        ));

        args.set(1, 9i32).unwrap();
        assert_eq!(args.take::<i32>(1).unwrap(), 9);
        assert!(args.take_value(1).is_none());
        assert_eq!(args.take::<String>(2).unwrap(), "x");
    }
}
