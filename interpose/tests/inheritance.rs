use interpose::prelude::*;
use interpose::{build_proxy_type, ConcreteMethod, MethodSignature, ProxyError, TypeDescriptor};

#[interface]
pub trait Named: Send + Sync {
    fn name(&self) -> String;
    fn describe(&self) -> String;
}

#[interface]
pub trait Labeled: Send + Sync {
    fn describe(&self) -> String;
}

#[interface(extends(Named, Labeled))]
pub trait Greeter: Named + Labeled {
    fn greet(&self, whom: String) -> String;
}

pub struct Polite;

#[intercepted]
impl Named for Polite {
    #[interceptor(Upper)]
    fn name(&self) -> String {
        "polite".to_string()
    }

    fn describe(&self) -> String {
        "named".to_string()
    }
}

#[intercepted]
impl Labeled for Polite {
    fn describe(&self) -> String {
        "labeled".to_string()
    }
}

#[intercepted(inherits(Named, Labeled))]
impl Greeter for Polite {
    #[interceptor(Upper)]
    fn greet(&self, whom: String) -> String {
        format!("hello, {}", whom)
    }
}

/// 把字符串结果转为大写
struct Upper;

impl InterceptionHandler for Upper {
    fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
        let text = next.proceed(params)?.downcast::<String>()?;
        Ok(Value::new(text.to_uppercase()))
    }
}

fn greeter() -> Proxy<GreeterInterface, Polite> {
    Proxy::new(Polite, vec![Arc::new(Upper) as Arc<dyn InterceptionHandler>]).unwrap()
}

#[test]
fn test_inherited_methods_are_proxied() {
    let proxy = greeter();

    assert_eq!(proxy.greet("bob".to_string()), "HELLO, BOB");
    assert_eq!(proxy.name(), "POLITE");
    assert_eq!(Named::describe(&proxy), "named");
    assert_eq!(Labeled::describe(&proxy), "labeled");
}

#[test]
fn test_flattened_method_table() {
    let proxy_type = Proxy::<GreeterInterface, Polite>::proxy_type().unwrap();

    assert_eq!(
        proxy_type.method_names(),
        vec!["Greeter::greet", "Named::name", "Named::describe", "Labeled::describe"]
    );
    assert_eq!(proxy_type.handler_types().len(), 1);
}

#[test]
fn test_duplicate_short_name_needs_qualification() {
    let proxy = greeter();

    let err = proxy.instance().invoke("describe", &mut Args::new()).unwrap_err();
    assert!(matches!(err, ProxyError::AmbiguousMethod { .. }));

    let value = proxy
        .instance()
        .invoke("Labeled::describe", &mut Args::new())
        .unwrap()
        .unwrap();
    assert_eq!(value.downcast::<String>().unwrap(), "labeled");
}

#[test]
fn test_parent_interface_alone() {
    let named: Proxy<NamedInterface, Polite> =
        Proxy::new(Polite, vec![Arc::new(Upper) as Arc<dyn InterceptionHandler>]).unwrap();

    assert_eq!(named.name(), "POLITE");
    assert_eq!(Named::describe(&named), "named");
    assert_eq!(named.instance().proxy_type().method_names().len(), 2);
}

struct LegacyApi;

#[test]
fn test_explicit_implementation_with_another_name() {
    let interface = TypeDescriptor::interface::<LegacyApi>()
        .named("LegacyApi")
        .method(MethodSignature::new("compute").param::<i32>("x").returns::<i32>())
        .build();
    let class = TypeDescriptor::class::<Polite>()
        .named("Polite")
        .implements(interface.clone())
        .method(ConcreteMethod::bind::<Polite, _>(
            MethodSignature::new("compute").param::<i32>("x").returns::<i32>(),
            |_, _| Ok(Some(Value::new(-1i32))),
        ))
        .method(
            ConcreteMethod::bind::<Polite, _>(
                MethodSignature::new("LegacyApi.compute").param::<i32>("x").returns::<i32>(),
                |_, args| {
                    let x = args.take::<i32>(0)?;
                    Ok(Some(Value::new(x * 10)))
                },
            )
            .implements(&interface, "compute"),
        )
        .build();

    let proxy_type = build_proxy_type(&interface, &class).unwrap();
    let instance = proxy_type.construct(Arc::new(Polite), Vec::new()).unwrap();

    let mut args = Args::new().arg(4i32);
    let value = instance.invoke("compute", &mut args).unwrap().unwrap();
    assert_eq!(value.downcast::<i32>().unwrap(), 40);
}
