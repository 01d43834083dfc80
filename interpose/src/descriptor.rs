//! 类型描述
//!
//! Rust 没有运行时反射，接口与实现的结构由 [`TypeDescriptor`] 显式描述。
//! 描述可以手写（构建器），也可以由 `#[interface]` / `#[intercepted]` 宏生成。

use crate::error::{ProxyError, ProxyResult};
use crate::param::Passing;
use crate::value::{Args, TypeInfo, Value};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// 类型种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// 接口（trait）
    Interface,
    /// 具体类型
    Class,
}

/// 参数或返回值的类型引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// 已知的具体类型
    Concrete(TypeInfo),
    /// 由方法泛型参数构成的开放类型，调用时由调用点闭合
    Open(Cow<'static, str>),
}

impl TypeRef {
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeRef::Concrete(TypeInfo::of::<T>())
    }

    pub fn open(name: impl Into<Cow<'static, str>>) -> Self {
        TypeRef::Open(name.into())
    }

    pub fn concrete(&self) -> Option<TypeInfo> {
        match self {
            TypeRef::Concrete(info) => Some(*info),
            TypeRef::Open(_) => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Concrete(info) => write!(f, "{}", info),
            TypeRef::Open(name) => write!(f, "{}", name),
        }
    }
}

/// 参数签名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSignature {
    name: Cow<'static, str>,
    ty: TypeRef,
    passing: Passing,
}

impl ParamSignature {
    pub fn new(name: impl Into<Cow<'static, str>>, ty: TypeRef, passing: Passing) -> Self {
        Self {
            name: name.into(),
            ty,
            passing,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_cow(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn passing(&self) -> Passing {
        self.passing
    }
}

/// 方法签名
///
/// 参数按位置排列；`returns` 为 `None` 表示无返回值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    name: Cow<'static, str>,
    generics: Vec<Cow<'static, str>>,
    params: Vec<ParamSignature>,
    returns: Option<TypeRef>,
}

impl MethodSignature {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            params: Vec::new(),
            returns: None,
        }
    }

    /// 声明方法泛型参数
    pub fn generic(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.generics.push(name.into());
        self
    }

    /// 按值参数
    pub fn param<T: ?Sized + 'static>(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.with_param(name, TypeRef::of::<T>(), Passing::Value)
    }

    /// 按引用参数
    pub fn by_ref<T: ?Sized + 'static>(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.with_param(name, TypeRef::of::<T>(), Passing::Ref)
    }

    /// 输出参数
    pub fn out<T: ?Sized + 'static>(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.with_param(name, TypeRef::of::<T>(), Passing::Out)
    }

    pub fn with_param(
        mut self,
        name: impl Into<Cow<'static, str>>,
        ty: TypeRef,
        passing: Passing,
    ) -> Self {
        self.params.push(ParamSignature::new(name, ty, passing));
        self
    }

    pub fn returns<T: ?Sized + 'static>(self) -> Self {
        self.with_return(TypeRef::of::<T>())
    }

    pub fn with_return(mut self, ty: TypeRef) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generics(&self) -> &[Cow<'static, str>] {
        &self.generics
    }

    pub fn is_generic(&self) -> bool {
        !self.generics.is_empty()
    }

    pub fn params(&self) -> &[ParamSignature] {
        &self.params
    }

    pub fn return_type(&self) -> Option<&TypeRef> {
        self.returns.as_ref()
    }

    pub fn is_void(&self) -> bool {
        self.returns.is_none()
    }

    /// 检查另一个签名能否实现本签名（名称可以不同）
    pub(crate) fn check_conforms(&self, other: &MethodSignature) -> Result<(), String> {
        if self.generics.len() != other.generics.len() {
            return Err(format!(
                "{} declares {} generic parameter(s), {} declares {}",
                self.name,
                self.generics.len(),
                other.name,
                other.generics.len()
            ));
        }
        if self.params.len() != other.params.len() {
            return Err(format!(
                "{} takes {} parameter(s), {} takes {}",
                self.name,
                self.params.len(),
                other.name,
                other.params.len()
            ));
        }
        for (index, (expected, actual)) in self.params.iter().zip(&other.params).enumerate() {
            if expected.ty != actual.ty || expected.passing != actual.passing {
                return Err(format!(
                    "parameter #{} of {} is {} {}, {} has {} {}",
                    index,
                    self.name,
                    expected.passing,
                    expected.ty,
                    other.name,
                    actual.passing,
                    actual.ty
                ));
            }
        }
        if self.returns != other.returns {
            return Err(format!(
                "{} returns {}, {} returns {}",
                self.name,
                display_return(&self.returns),
                other.name,
                display_return(&other.returns)
            ));
        }
        Ok(())
    }
}

fn display_return(returns: &Option<TypeRef>) -> String {
    returns
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "()".to_string())
}

/// 接口方法的限定标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    interface: TypeInfo,
    method: Cow<'static, str>,
}

impl MethodKey {
    pub fn new(interface: TypeInfo, method: impl Into<Cow<'static, str>>) -> Self {
        Self {
            interface,
            method: method.into(),
        }
    }

    pub fn interface(&self) -> TypeInfo {
        self.interface
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

/// 拦截指令：一个处理器类型及其在调用链中的顺序
///
/// 顺序值越小越靠近目标方法
#[derive(Debug, Clone)]
pub struct InterceptorDirective {
    handler: Arc<TypeDescriptor>,
    order: i32,
}

impl InterceptorDirective {
    pub fn new(handler: Arc<TypeDescriptor>, order: i32) -> Self {
        Self { handler, order }
    }

    pub fn handler(&self) -> &Arc<TypeDescriptor> {
        &self.handler
    }

    pub fn order(&self) -> i32 {
        self.order
    }
}

/// 类型擦除的具体方法调用器
///
/// 从槽位读取实参、调用具体方法，再把按引用与输出参数写回槽位
pub type Invoker =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &mut Args) -> ProxyResult<Option<Value>> + Send + Sync>;

/// 实现类型上的具体方法
#[derive(Clone)]
pub struct ConcreteMethod {
    signature: MethodSignature,
    implements: Option<MethodKey>,
    invoker: Option<Invoker>,
    interceptors: Vec<InterceptorDirective>,
}

impl ConcreteMethod {
    /// 绑定到具体类型 `C` 的方法
    pub fn bind<C, F>(signature: MethodSignature, call: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(&C, &mut Args) -> ProxyResult<Option<Value>> + Send + Sync + 'static,
    {
        let invoker: Invoker = Arc::new(move |target: &(dyn Any + Send + Sync), args: &mut Args| {
            let target = target.downcast_ref::<C>().ok_or_else(|| {
                ProxyError::type_mismatch(std::any::type_name::<C>(), "another implementation")
            })?;
            call(target, args)
        });
        Self {
            signature,
            implements: None,
            invoker: Some(invoker),
            interceptors: Vec::new(),
        }
    }

    /// 泛型方法：没有预先绑定的调用器，调用点负责提供闭合后的终端调用
    pub fn open(signature: MethodSignature) -> Self {
        Self {
            signature,
            implements: None,
            invoker: None,
            interceptors: Vec::new(),
        }
    }

    /// 显式（限定）实现某个接口方法，名称可以与接口方法不同
    pub fn implements(mut self, interface: &TypeDescriptor, method: impl Into<Cow<'static, str>>) -> Self {
        self.implements = Some(MethodKey::new(interface.key(), method));
        self
    }

    /// 附加拦截处理器
    pub fn intercept(mut self, handler: Arc<TypeDescriptor>, order: i32) -> Self {
        self.interceptors.push(InterceptorDirective::new(handler, order));
        self
    }

    pub fn name(&self) -> &str {
        self.signature.name()
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn explicit_target(&self) -> Option<&MethodKey> {
        self.implements.as_ref()
    }

    pub fn invoker(&self) -> Option<&Invoker> {
        self.invoker.as_ref()
    }

    /// 声明顺序的拦截指令
    pub fn interceptors(&self) -> &[InterceptorDirective] {
        &self.interceptors
    }
}

impl fmt::Debug for ConcreteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcreteMethod")
            .field("signature", &self.signature)
            .field("implements", &self.implements)
            .field("has_invoker", &self.invoker.is_some())
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

/// 接口或具体类型的描述，构建完成后不可变
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    key: TypeInfo,
    name: Cow<'static, str>,
    kind: TypeKind,
    generic_args: Vec<TypeInfo>,
    extends: Vec<Arc<TypeDescriptor>>,
    signatures: Vec<MethodSignature>,
    methods: Vec<ConcreteMethod>,
}

impl TypeDescriptor {
    fn empty(key: TypeInfo, kind: TypeKind) -> Self {
        Self {
            key,
            name: Cow::Borrowed(key.name()),
            kind,
            generic_args: Vec::new(),
            extends: Vec::new(),
            signatures: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// 开始描述以 `T` 为标识的接口
    pub fn interface<T: ?Sized + 'static>() -> InterfaceBuilder {
        InterfaceBuilder {
            inner: Self::empty(TypeInfo::of::<T>(), TypeKind::Interface),
        }
    }

    /// 开始描述具体类型 `T`
    pub fn class<T: ?Sized + 'static>() -> ClassBuilder {
        ClassBuilder {
            inner: Self::empty(TypeInfo::of::<T>(), TypeKind::Class),
        }
    }

    pub fn key(&self) -> TypeInfo {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    pub fn generic_args(&self) -> &[TypeInfo] {
        &self.generic_args
    }

    /// 接口：直接继承的接口；具体类型：直接实现的接口
    pub fn extends(&self) -> &[Arc<TypeDescriptor>] {
        &self.extends
    }

    /// 接口直接声明的方法
    pub fn signatures(&self) -> &[MethodSignature] {
        &self.signatures
    }

    /// 具体类型的方法
    pub fn methods(&self) -> &[ConcreteMethod] {
        &self.methods
    }

    /// 是否可以赋值给 `target`（自身或传递地继承/实现了 `target`）
    pub fn is_assignable_to(&self, target: &TypeDescriptor) -> bool {
        self.key == target.key || self.extends.iter().any(|parent| parent.is_assignable_to(target))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.generic_args.is_empty() {
            let args: Vec<_> = self.generic_args.iter().map(TypeInfo::name).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        Ok(())
    }
}

/// 接口描述构建器
#[derive(Debug)]
pub struct InterfaceBuilder {
    inner: TypeDescriptor,
}

impl InterfaceBuilder {
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.inner.name = name.into();
        self
    }

    pub fn generic_arg<T: ?Sized + 'static>(mut self) -> Self {
        self.inner.generic_args.push(TypeInfo::of::<T>());
        self
    }

    /// 继承另一个接口
    pub fn extends(mut self, parent: Arc<TypeDescriptor>) -> Self {
        self.inner.extends.push(parent);
        self
    }

    pub fn method(mut self, signature: MethodSignature) -> Self {
        self.inner.signatures.push(signature);
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        Arc::new(self.inner)
    }
}

/// 具体类型描述构建器
#[derive(Debug)]
pub struct ClassBuilder {
    inner: TypeDescriptor,
}

impl ClassBuilder {
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.inner.name = name.into();
        self
    }

    pub fn generic_arg<T: ?Sized + 'static>(mut self) -> Self {
        self.inner.generic_args.push(TypeInfo::of::<T>());
        self
    }

    /// 声明实现的接口，重复声明会被忽略
    pub fn implements(mut self, interface: Arc<TypeDescriptor>) -> Self {
        if !self.inner.extends.iter().any(|known| known.key() == interface.key()) {
            self.inner.extends.push(interface);
        }
        self
    }

    pub fn method(mut self, method: ConcreteMethod) -> Self {
        self.inner.methods.push(method);
        self
    }

    /// 为名称为 `method` 的具体方法追加拦截处理器，返回匹配到的方法数
    pub fn intercept_method(
        &mut self,
        method: &str,
        handler: &Arc<TypeDescriptor>,
        order: i32,
    ) -> usize {
        let mut matched = 0;
        for concrete in self.inner.methods.iter_mut().filter(|m| m.name() == method) {
            concrete
                .interceptors
                .push(InterceptorDirective::new(handler.clone(), order));
            matched += 1;
        }
        matched
    }

    /// 构建器形式的 [`ClassBuilder::intercept_method`]
    pub fn intercept(mut self, method: &str, handler: Arc<TypeDescriptor>, order: i32) -> Self {
        self.intercept_method(method, &handler, order);
        self
    }

    /// 当前的类型名
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub(crate) fn method_names(&self) -> Vec<String> {
        self.inner.methods.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        Arc::new(self.inner)
    }
}
