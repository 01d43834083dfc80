//! 代理类型工厂
//!
//! 为一个（接口，实现）组合构建 [`ProxyType`]：一张从接口方法到调用计划的分派表。
//! 没有拦截指令的方法直接转发给实现；有拦截指令的方法按顺序值组装调用链，
//! 顺序值最大的处理器在最外层。

use crate::descriptor::{Invoker, MethodSignature, TypeDescriptor, TypeRef};
use crate::error::{ConfigurationError, ProxyError, ProxyResult};
use crate::handler::{handler_capability, Continuation, InterceptionHandler, VoidContinuation};
use crate::param::{ParamInfo, Passing};
use crate::resolution::{resolve, MethodPair};
use crate::value::{Args, TypeInfo, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 终端调用：用私有槽位调用具体方法
pub type Terminal<'a> = dyn Fn(&mut Args) -> ProxyResult<Option<Value>> + 'a;

#[derive(Debug, Clone)]
enum Dispatch {
    /// 直接转发
    PassThrough,
    /// 处理器槽位，按顺序值升序（最内层在前）
    Pipeline(Vec<usize>),
}

/// 闭合后的参数与返回值类型
#[derive(Debug, Clone)]
struct ClosedTypes {
    params: Vec<TypeInfo>,
    returns: Option<TypeInfo>,
}

#[derive(Clone)]
struct MethodPlan {
    qualified: String,
    signature: MethodSignature,
    invoker: Option<Invoker>,
    closed: Option<ClosedTypes>,
    dispatch: Dispatch,
}

#[derive(Debug, Clone, Copy)]
enum Lookup {
    Unique(usize),
    Ambiguous,
}

/// 构建好的代理类型
///
/// 持有一个实现引用与每个不同处理器类型各一个处理器引用，
/// 处理器槽位按发现顺序排列（方法枚举顺序，同一方法内按顺序值）
pub struct ProxyType {
    name: String,
    interface: Arc<TypeDescriptor>,
    implementation: Arc<TypeDescriptor>,
    handler_types: Vec<Arc<TypeDescriptor>>,
    methods: Vec<MethodPlan>,
    index: HashMap<String, Lookup>,
}

/// 构建代理类型（不经过缓存）
///
/// 配置错误在此同步返回，不会延迟到调用期
pub fn build_proxy_type(
    interface: &Arc<TypeDescriptor>,
    implementation: &Arc<TypeDescriptor>,
) -> ProxyResult<Arc<ProxyType>> {
    let span = tracing::debug_span!(
        "build_proxy_type",
        interface = %interface,
        implementation = %implementation
    );
    let _guard = span.enter();

    let pairs = resolve(interface, implementation)?;
    let capability = handler_capability();

    let mut handler_types: Vec<Arc<TypeDescriptor>> = Vec::new();
    let mut methods = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        let qualified = pair.qualified_name();
        let dispatch = plan_dispatch(pair, &qualified, &capability, &mut handler_types)?;
        let signature = pair.interface_method.clone();

        let (invoker, closed) = if signature.is_generic() {
            (None, None)
        } else {
            let invoker = pair.concrete.invoker().cloned().ok_or_else(|| {
                ProxyError::from(ConfigurationError::NotAssignable {
                    interface: interface.to_string(),
                    implementation: implementation.to_string(),
                    reason: format!("method {} has no callable body", pair.concrete.name()),
                })
            })?;
            let closed = close_static(&signature).map_err(|reason| {
                ProxyError::from(ConfigurationError::NotAssignable {
                    interface: interface.to_string(),
                    implementation: implementation.to_string(),
                    reason,
                })
            })?;
            (Some(invoker), Some(closed))
        };

        match &dispatch {
            Dispatch::PassThrough => tracing::debug!("  ├─ {}: pass-through", qualified),
            Dispatch::Pipeline(slots) => {
                tracing::debug!("  ├─ {}: pipeline of {} handler(s)", qualified, slots.len())
            }
        }

        methods.push(MethodPlan {
            qualified,
            signature,
            invoker,
            closed,
            dispatch,
        });
    }

    let mut index = HashMap::new();
    for (position, plan) in methods.iter().enumerate() {
        register_name(&mut index, plan.qualified.clone(), position);
        register_name(&mut index, plan.signature.name().to_string(), position);
    }

    let proxy = ProxyType {
        name: format!("InterceptorProxy_{}_{}", interface, implementation),
        interface: interface.clone(),
        implementation: implementation.clone(),
        handler_types,
        methods,
        index,
    };
    tracing::debug!(
        "Built {} with {} method(s) and {} handler slot(s)",
        proxy.name,
        proxy.methods.len(),
        proxy.handler_types.len()
    );
    Ok(Arc::new(proxy))
}

/// 排序并校验拦截指令，分配处理器槽位
fn plan_dispatch(
    pair: &MethodPair<'_>,
    qualified: &str,
    capability: &TypeDescriptor,
    handler_types: &mut Vec<Arc<TypeDescriptor>>,
) -> ProxyResult<Dispatch> {
    let mut directives: Vec<_> = pair.concrete.interceptors().iter().collect();
    if directives.is_empty() {
        return Ok(Dispatch::PassThrough);
    }
    // 稳定排序，同序时保持声明顺序
    directives.sort_by_key(|directive| directive.order());

    let mut slots = Vec::with_capacity(directives.len());
    for directive in directives {
        let handler = directive.handler();
        if !handler.is_assignable_to(capability) {
            return Err(ConfigurationError::InvalidHandler {
                handler: handler.to_string(),
                method: qualified.to_string(),
            }
            .into());
        }
        let slot = match handler_types.iter().position(|known| known.key() == handler.key()) {
            Some(slot) => slot,
            None => {
                handler_types.push(handler.clone());
                handler_types.len() - 1
            }
        };
        slots.push(slot);
    }
    Ok(Dispatch::Pipeline(slots))
}

fn close_static(signature: &MethodSignature) -> Result<ClosedTypes, String> {
    let open = |ty: &TypeRef| {
        format!(
            "{} uses open type {} but declares no generic parameters",
            signature.name(),
            ty
        )
    };
    let params = signature
        .params()
        .iter()
        .map(|param| param.ty().concrete().ok_or_else(|| open(param.ty())))
        .collect::<Result<Vec<_>, _>>()?;
    let returns = match signature.return_type() {
        Some(ty) => Some(ty.concrete().ok_or_else(|| open(ty))?),
        None => None,
    };
    Ok(ClosedTypes { params, returns })
}

fn register_name(index: &mut HashMap<String, Lookup>, name: String, position: usize) {
    index
        .entry(name)
        .and_modify(|existing| {
            if !matches!(existing, Lookup::Unique(known) if *known == position) {
                *existing = Lookup::Ambiguous;
            }
        })
        .or_insert(Lookup::Unique(position));
}

impl ProxyType {
    /// 代理类型名，形如 `InterceptorProxy_Calculator_SimpleCalculator`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface(&self) -> &Arc<TypeDescriptor> {
        &self.interface
    }

    pub fn implementation(&self) -> &Arc<TypeDescriptor> {
        &self.implementation
    }

    /// 构造实例时需要的处理器类型，按槽位顺序
    pub fn handler_types(&self) -> &[Arc<TypeDescriptor>] {
        &self.handler_types
    }

    /// 所有接口方法的限定名，按枚举顺序
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.iter().map(|plan| plan.qualified.as_str()).collect()
    }

    /// 方法是否经过拦截链
    pub fn is_intercepted(&self, method: &str) -> ProxyResult<bool> {
        Ok(matches!(self.plan(method)?.dispatch, Dispatch::Pipeline(_)))
    }

    /// 方法的处理器类型，最内层在前；直接转发的方法返回空列表
    pub fn handler_chain(&self, method: &str) -> ProxyResult<Vec<Arc<TypeDescriptor>>> {
        Ok(match &self.plan(method)?.dispatch {
            Dispatch::PassThrough => Vec::new(),
            Dispatch::Pipeline(slots) => slots
                .iter()
                .map(|&slot| self.handler_types[slot].clone())
                .collect(),
        })
    }

    /// 构造代理实例
    ///
    /// `handlers` 必须与 [`ProxyType::handler_types`] 一一对应：具体处理器类型的槽位
    /// 只接受该类型的实例
    pub fn construct(
        self: &Arc<Self>,
        target: Arc<dyn Any + Send + Sync>,
        handlers: Vec<Arc<dyn InterceptionHandler>>,
    ) -> ProxyResult<ProxyInstance> {
        let expected = self.implementation.key();
        if (*target).type_id() != expected.id() {
            return Err(ProxyError::InstanceMismatch {
                proxy: self.name.clone(),
                expected: expected.name().to_string(),
                found: "an instance of another type".to_string(),
            });
        }
        if handlers.len() != self.handler_types.len() {
            return Err(ProxyError::HandlerCountMismatch {
                proxy: self.name.clone(),
                expected: self.handler_types.len(),
                found: handlers.len(),
            });
        }
        for (slot, (expected, handler)) in self.handler_types.iter().zip(&handlers).enumerate() {
            // 角色槽位（`dyn Trait`）接受任何实现了该 trait 的实例
            if expected.is_interface() {
                continue;
            }
            let found = handler.concrete_type();
            if found != expected.key() {
                return Err(ProxyError::HandlerMismatch {
                    proxy: self.name.clone(),
                    slot,
                    expected: expected.to_string(),
                    found: found.name().to_string(),
                });
            }
        }
        Ok(ProxyInstance {
            proxy_type: self.clone(),
            target,
            handlers,
        })
    }

    fn plan(&self, method: &str) -> ProxyResult<&MethodPlan> {
        match self.index.get(method) {
            Some(Lookup::Unique(position)) => Ok(&self.methods[*position]),
            Some(Lookup::Ambiguous) => Err(ProxyError::AmbiguousMethod {
                interface: self.interface.to_string(),
                method: method.to_string(),
            }),
            None => Err(ProxyError::UnknownMethod {
                interface: self.interface.to_string(),
                method: method.to_string(),
            }),
        }
    }
}

impl fmt::Debug for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyType")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .field("handler_slots", &self.handler_types.len())
            .finish()
    }
}

/// 泛型方法在调用点的闭合方式
#[derive(Debug, Clone, Default)]
pub struct ClosedMethod {
    type_args: Vec<TypeInfo>,
    params: Vec<TypeInfo>,
    returns: Option<TypeInfo>,
}

impl ClosedMethod {
    pub fn new() -> Self {
        Self::default()
    }

    /// 方法泛型参数的实际类型
    pub fn type_arg<T: ?Sized + 'static>(mut self) -> Self {
        self.type_args.push(TypeInfo::of::<T>());
        self
    }

    /// 下一个参数闭合后的类型（按引用参数为其指向的类型）
    pub fn param<T: ?Sized + 'static>(mut self) -> Self {
        self.params.push(TypeInfo::of::<T>());
        self
    }

    pub fn returns<T: ?Sized + 'static>(mut self) -> Self {
        self.returns = Some(TypeInfo::of::<T>());
        self
    }

    pub fn type_args(&self) -> &[TypeInfo] {
        &self.type_args
    }

    fn close(&self, method: &str, signature: &MethodSignature) -> ProxyResult<ClosedTypes> {
        let mismatch = |reason: String| ProxyError::GenericMismatch {
            method: method.to_string(),
            reason,
        };
        if self.type_args.len() != signature.generics().len() {
            return Err(mismatch(format!(
                "expected {} type argument(s), got {}",
                signature.generics().len(),
                self.type_args.len()
            )));
        }
        if self.params.len() != signature.params().len() {
            return Err(mismatch(format!(
                "expected {} closed parameter type(s), got {}",
                signature.params().len(),
                self.params.len()
            )));
        }
        for (index, (param, closed)) in signature.params().iter().zip(&self.params).enumerate() {
            if let Some(declared) = param.ty().concrete() {
                if declared != *closed {
                    return Err(mismatch(format!(
                        "parameter #{} is declared as {}, closed as {}",
                        index, declared, closed
                    )));
                }
            }
        }
        match (signature.return_type(), self.returns) {
            (None, None) => {}
            (Some(TypeRef::Open(_)), Some(_)) => {}
            (Some(TypeRef::Concrete(declared)), Some(closed)) if *declared == closed => {}
            (declared, closed) => {
                return Err(mismatch(format!(
                    "return type is declared as {}, closed as {}",
                    declared.map(ToString::to_string).unwrap_or_else(|| "()".to_string()),
                    closed.map(|info| info.name()).unwrap_or("()")
                )));
            }
        }
        Ok(ClosedTypes {
            params: self.params.clone(),
            returns: self.returns,
        })
    }
}

/// 代理实例
///
/// 构造后不可变，可以在线程间共享
pub struct ProxyInstance {
    proxy_type: Arc<ProxyType>,
    target: Arc<dyn Any + Send + Sync>,
    handlers: Vec<Arc<dyn InterceptionHandler>>,
}

impl ProxyInstance {
    pub fn proxy_type(&self) -> &Arc<ProxyType> {
        &self.proxy_type
    }

    pub fn target(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.target
    }

    pub fn handlers(&self) -> &[Arc<dyn InterceptionHandler>] {
        &self.handlers
    }

    /// 调用非泛型接口方法
    ///
    /// `method` 可以是方法名或 `Interface::method`。按引用与输出参数的最终值写回 `args`
    pub fn invoke(&self, method: &str, args: &mut Args) -> ProxyResult<Option<Value>> {
        let plan = self.proxy_type.plan(method)?;
        let (invoker, closed) = match (&plan.invoker, &plan.closed) {
            (Some(invoker), Some(closed)) => (invoker, closed),
            _ => {
                return Err(ProxyError::GenericMismatch {
                    method: plan.qualified.clone(),
                    reason: "generic methods must be invoked with their closed type arguments"
                        .to_string(),
                })
            }
        };
        let target = self.target.as_ref();
        let terminal = |slots: &mut Args| invoker(target, slots);
        self.dispatch(plan, closed, args, &terminal)
    }

    /// 调用泛型接口方法
    ///
    /// `terminal` 是调用点按实际类型参数闭合后的具体方法调用
    pub fn invoke_generic(
        &self,
        method: &str,
        closed: &ClosedMethod,
        args: &mut Args,
        terminal: &Terminal<'_>,
    ) -> ProxyResult<Option<Value>> {
        let plan = self.proxy_type.plan(method)?;
        if !plan.signature.is_generic() {
            return Err(ProxyError::GenericMismatch {
                method: plan.qualified.clone(),
                reason: "method declares no generic parameters".to_string(),
            });
        }
        let closed = closed.close(&plan.qualified, &plan.signature)?;
        self.dispatch(plan, &closed, args, terminal)
    }

    fn dispatch(
        &self,
        plan: &MethodPlan,
        closed: &ClosedTypes,
        args: &mut Args,
        terminal: &Terminal<'_>,
    ) -> ProxyResult<Option<Value>> {
        let expected = plan.signature.params().len();
        if args.len() != expected {
            return Err(ProxyError::ArityMismatch {
                method: plan.qualified.clone(),
                expected,
                found: args.len(),
            });
        }

        let slots = match &plan.dispatch {
            Dispatch::PassThrough => {
                tracing::trace!("Forwarding {}", plan.qualified);
                let result = terminal(args)?;
                return self.check_return(plan, closed, result);
            }
            Dispatch::Pipeline(slots) => slots,
        };
        tracing::trace!(
            "Dispatching {} through {} handler(s)",
            plan.qualified,
            slots.len()
        );

        let mut params = self.describe(plan, closed, args)?;
        let method = plan.qualified.as_str();
        let result = if plan.signature.is_void() {
            let inner = |params: &mut [ParamInfo]| -> ProxyResult<()> {
                let mut private = Args::from_params(params)?;
                terminal(&mut private)?;
                private.write_back(params)
            };
            self.run_void(slots, method, &mut params, &inner)?;
            None
        } else {
            let inner = |params: &mut [ParamInfo]| -> ProxyResult<Value> {
                let mut private = Args::from_params(params)?;
                let value = terminal(&mut private)?;
                private.write_back(params)?;
                value.ok_or_else(|| ProxyError::MissingReturn(method.to_string()))
            };
            Some(self.run_value(slots, method, &mut params, &inner)?)
        };

        for (index, param) in params.iter_mut().enumerate() {
            if !param.is_by_ref() {
                continue;
            }
            if let Some(value) = param.take_value() {
                args.set_value(index, value)?;
            }
        }
        self.check_return(plan, closed, result)
    }

    /// 由调用方实参生成参数信息
    fn describe(&self, plan: &MethodPlan, closed: &ClosedTypes, args: &mut Args) -> ProxyResult<Vec<ParamInfo>> {
        let mut params = Vec::with_capacity(closed.params.len());
        for (index, (signature, ty)) in plan.signature.params().iter().zip(&closed.params).enumerate() {
            let mut param = ParamInfo::with_passing(signature.name_cow(), *ty, signature.passing());
            let initial = match signature.passing() {
                Passing::Out => None,
                Passing::Ref => args
                    .slot(index)
                    .and_then(Value::try_clone)
                    .or_else(|| args.take_value(index)),
                Passing::Value => args.take_value(index),
            };
            match initial {
                Some(value) => param.set_value(value)?,
                None if signature.passing().is_out() => {}
                None => {
                    return Err(ProxyError::MissingValue(format!(
                        "parameter '{}' of {}",
                        signature.name(),
                        plan.qualified
                    )))
                }
            }
            params.push(param);
        }
        Ok(params)
    }

    fn run_value(
        &self,
        chain: &[usize],
        method: &str,
        params: &mut [ParamInfo],
        terminal: &dyn Fn(&mut [ParamInfo]) -> ProxyResult<Value>,
    ) -> ProxyResult<Value> {
        match chain.split_last() {
            None => terminal(params),
            Some((&outer, inner)) => {
                let next =
                    |params: &mut [ParamInfo]| self.run_value(inner, method, params, terminal);
                self.handlers[outer].intercept_value(Continuation::new(method, &next), params)
            }
        }
    }

    fn run_void(
        &self,
        chain: &[usize],
        method: &str,
        params: &mut [ParamInfo],
        terminal: &dyn Fn(&mut [ParamInfo]) -> ProxyResult<()>,
    ) -> ProxyResult<()> {
        match chain.split_last() {
            None => terminal(params),
            Some((&outer, inner)) => {
                let next = |params: &mut [ParamInfo]| self.run_void(inner, method, params, terminal);
                self.handlers[outer].intercept_void(VoidContinuation::new(method, &next), params)
            }
        }
    }

    fn check_return(
        &self,
        plan: &MethodPlan,
        closed: &ClosedTypes,
        result: Option<Value>,
    ) -> ProxyResult<Option<Value>> {
        let Some(expected) = closed.returns else {
            return Ok(None);
        };
        let value = result.ok_or_else(|| ProxyError::MissingReturn(plan.qualified.clone()))?;
        if value.type_info() != expected {
            return Err(ProxyError::type_mismatch(expected.name(), value.type_info().name()));
        }
        Ok(Some(value))
    }
}

impl fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("proxy_type", &self.proxy_type.name())
            .field(
                "handlers",
                &self.handlers.iter().map(|handler| handler.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ConcreteMethod;
    use crate::handler::handler_type;
    use parking_lot::Mutex;

    trait Calculator {}

    struct SimpleCalculator {
        calls: Mutex<Vec<String>>,
    }

    impl SimpleCalculator {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    /// 记录调用顺序
    struct First(Log);
    struct Second(Log);

    impl InterceptionHandler for First {
        fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
            self.0.lock().push("First".to_string());
            next.proceed(params)
        }
    }

    impl InterceptionHandler for Second {
        fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
            self.0.lock().push("Second".to_string());
            next.proceed(params)
        }
    }

    trait Auditor: InterceptionHandler {}

    impl Auditor for Fixed {}

    struct Fixed;

    impl InterceptionHandler for Fixed {
        fn intercept_value(&self, _next: Continuation<'_>, _params: &mut [ParamInfo]) -> ProxyResult<Value> {
            Ok(Value::new(42i32))
        }
    }

    struct NotAHandler;

    fn calculator() -> Arc<TypeDescriptor> {
        TypeDescriptor::interface::<dyn Calculator>()
            .named("Calculator")
            .method(MethodSignature::new("sum").param::<i32>("a").param::<i32>("b").returns::<i32>())
            .method(MethodSignature::new("reset"))
            .build()
    }

    fn sum() -> ConcreteMethod {
        ConcreteMethod::bind::<SimpleCalculator, _>(
            MethodSignature::new("sum").param::<i32>("a").param::<i32>("b").returns::<i32>(),
            |calc, args| {
                calc.calls.lock().push("sum".to_string());
                let a = args.take::<i32>(0)?;
                let b = args.take::<i32>(1)?;
                Ok(Some(Value::new(a + b)))
            },
        )
    }

    fn reset() -> ConcreteMethod {
        ConcreteMethod::bind::<SimpleCalculator, _>(MethodSignature::new("reset"), |calc, _| {
            calc.calls.lock().clear();
            Ok(None)
        })
    }

    fn class(sum: ConcreteMethod) -> Arc<TypeDescriptor> {
        TypeDescriptor::class::<SimpleCalculator>()
            .implements(calculator())
            .method(sum)
            .method(reset())
            .build()
    }

    #[test]
    fn test_pass_through_matches_direct_call() {
        let proxy_type = build_proxy_type(&calculator(), &class(sum())).unwrap();
        assert!(proxy_type.handler_types().is_empty());
        assert!(!proxy_type.is_intercepted("sum").unwrap());

        let instance = proxy_type
            .construct(Arc::new(SimpleCalculator::new()), Vec::new())
            .unwrap();
        let mut args = Args::new().arg(2i32).arg(3i32);
        let result = instance.invoke("sum", &mut args).unwrap().unwrap();
        assert_eq!(result.downcast::<i32>().unwrap(), 5);

        assert!(instance.invoke("Calculator::reset", &mut Args::new()).unwrap().is_none());
    }

    #[test]
    fn test_higher_order_wraps_lower_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let method = sum()
            .intercept(handler_type::<Second>(), 1)
            .intercept(handler_type::<First>(), 0);
        let proxy_type = build_proxy_type(&calculator(), &class(method)).unwrap();

        // 槽位按顺序值发现：先 First(0) 再 Second(1)
        let slots: Vec<_> = proxy_type.handler_types().iter().map(|h| h.name().to_string()).collect();
        assert_eq!(slots, vec!["First", "Second"]);
        let chain: Vec<_> = proxy_type
            .handler_chain("sum")
            .unwrap()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(chain, vec!["First", "Second"]);

        let handlers: Vec<Arc<dyn InterceptionHandler>> =
            vec![Arc::new(First(log.clone())), Arc::new(Second(log.clone()))];
        let target = Arc::new(SimpleCalculator::new());
        let instance = proxy_type.construct(target.clone(), handlers).unwrap();

        let mut args = Args::new().arg(20i32).arg(22i32);
        let result = instance.invoke("sum", &mut args).unwrap().unwrap();
        assert_eq!(result.downcast::<i32>().unwrap(), 42);
        assert_eq!(*log.lock(), vec!["Second", "First"]);
        assert_eq!(*target.calls.lock(), vec!["sum"]);
    }

    #[test]
    fn test_short_circuit_skips_target() {
        let proxy_type =
            build_proxy_type(&calculator(), &class(sum().intercept(handler_type::<Fixed>(), 0))).unwrap();
        let target = Arc::new(SimpleCalculator::new());
        let instance = proxy_type
            .construct(target.clone(), vec![Arc::new(Fixed)])
            .unwrap();

        let result = instance
            .invoke("sum", &mut Args::new().arg(1i32).arg(1i32))
            .unwrap()
            .unwrap();
        assert_eq!(result.downcast::<i32>().unwrap(), 42);
        assert!(target.calls.lock().is_empty());
    }

    #[test]
    fn test_invalid_handler_fails_at_build() {
        let method = sum().intercept(TypeDescriptor::class::<NotAHandler>().build(), 0);
        let err = build_proxy_type(&calculator(), &class(method)).unwrap_err();

        assert!(matches!(
            err.as_configuration(),
            Some(ConfigurationError::InvalidHandler { method, .. }) if method == "Calculator::sum"
        ));
    }

    #[test]
    fn test_construct_checks_target_and_handlers() {
        let proxy_type =
            build_proxy_type(&calculator(), &class(sum().intercept(handler_type::<Fixed>(), 0))).unwrap();

        let err = proxy_type
            .construct(Arc::new(String::from("calc")), vec![Arc::new(Fixed)])
            .unwrap_err();
        assert!(matches!(err, ProxyError::InstanceMismatch { .. }));

        let err = proxy_type
            .construct(Arc::new(SimpleCalculator::new()), Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::HandlerCountMismatch {
                expected: 1,
                found: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_construct_checks_handler_slot_types() {
        let log = Log::default();
        let method = sum()
            .intercept(handler_type::<First>(), 0)
            .intercept(handler_type::<Second>(), 1);
        let proxy_type = build_proxy_type(&calculator(), &class(method)).unwrap();

        let swapped: Vec<Arc<dyn InterceptionHandler>> =
            vec![Arc::new(Second(log.clone())), Arc::new(First(log.clone()))];
        let err = proxy_type
            .construct(Arc::new(SimpleCalculator::new()), swapped)
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::HandlerMismatch { slot: 0, ref expected, .. } if expected == "First"
        ));

        let unrelated: Vec<Arc<dyn InterceptionHandler>> = vec![Arc::new(First(log.clone())), Arc::new(Fixed)];
        assert!(matches!(
            proxy_type.construct(Arc::new(SimpleCalculator::new()), unrelated),
            Err(ProxyError::HandlerMismatch { slot: 1, .. })
        ));
    }

    #[test]
    fn test_role_slot_accepts_any_implementation() {
        let method = sum().intercept(handler_type::<dyn Auditor>(), 0);
        let proxy_type = build_proxy_type(&calculator(), &class(method)).unwrap();
        assert!(proxy_type.handler_types()[0].is_interface());

        let instance = proxy_type
            .construct(Arc::new(SimpleCalculator::new()), vec![Arc::new(Fixed)])
            .unwrap();
        let result = instance
            .invoke("sum", &mut Args::new().arg(1i32).arg(2i32))
            .unwrap()
            .unwrap();
        assert_eq!(result.downcast::<i32>().unwrap(), 42);
    }

    #[test]
    fn test_call_time_errors() {
        let proxy_type = build_proxy_type(&calculator(), &class(sum())).unwrap();
        let instance = proxy_type
            .construct(Arc::new(SimpleCalculator::new()), Vec::new())
            .unwrap();

        assert!(matches!(
            instance.invoke("product", &mut Args::new()),
            Err(ProxyError::UnknownMethod { .. })
        ));
        assert!(matches!(
            instance.invoke("sum", &mut Args::new().arg(1i32)),
            Err(ProxyError::ArityMismatch {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_closed_method_validation() {
        let signature = MethodSignature::new("wrap")
            .generic("T")
            .with_param("value", TypeRef::open("T"), Passing::Value)
            .param::<u8>("tag")
            .with_return(TypeRef::open("Vec<T>"));

        let closed = ClosedMethod::new()
            .type_arg::<String>()
            .param::<String>()
            .param::<u8>()
            .returns::<Vec<String>>();
        assert!(closed.close("Store::wrap", &signature).is_ok());

        let wrong_tag = ClosedMethod::new()
            .type_arg::<String>()
            .param::<String>()
            .param::<u16>()
            .returns::<Vec<String>>();
        assert!(matches!(
            wrong_tag.close("Store::wrap", &signature),
            Err(ProxyError::GenericMismatch { .. })
        ));

        let missing_arg = ClosedMethod::new().param::<String>().param::<u8>();
        assert!(missing_arg.close("Store::wrap", &signature).is_err());
    }

    #[test]
    fn test_register_name_marks_collisions() {
        let mut index = HashMap::new();
        register_name(&mut index, "get".to_string(), 0);
        register_name(&mut index, "get".to_string(), 0);
        assert!(matches!(index.get("get"), Some(Lookup::Unique(0))));
        register_name(&mut index, "get".to_string(), 3);
        assert!(matches!(index.get("get"), Some(Lookup::Ambiguous)));
    }
}
