use interpose::prelude::*;
use interpose::{HandlerCatalog, InterceptionConfig, ProxyError};
use std::sync::atomic::{AtomicUsize, Ordering};

#[interface(name = "PricingService")]
pub trait Pricing: Send + Sync {
    fn quote(&self, amount: i64) -> i64;
    fn label(&self, key: String) -> String;
    fn attempt(&self) -> u32;
    fn lookup(&self, key: String, #[out] found: &mut bool) -> i64;
    fn record(&self, entry: String);
}

#[derive(Default)]
pub struct Shop {
    attempts: AtomicUsize,
    labels: AtomicUsize,
}

#[intercepted]
impl Pricing for Shop {
    #[interceptor(Discount, order = 10)]
    fn quote(&self, amount: i64) -> i64 {
        amount * 2
    }

    #[interceptor(Cached)]
    fn label(&self, key: String) -> String {
        self.labels.fetch_add(1, Ordering::SeqCst);
        format!("fresh:{}", key)
    }

    #[interceptor(Retry)]
    fn attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::SeqCst) as u32
    }

    #[interceptor(Fallback)]
    fn lookup(&self, key: String, #[out] found: &mut bool) -> i64 {
        *found = key == "apple";
        if *found {
            5
        } else {
            0
        }
    }

    #[interceptor(Deny)]
    fn record(&self, _entry: String) {}
}

/// 调用前把金额减 10
struct Discount;

impl InterceptionHandler for Discount {
    fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
        let amount = *params[0].get::<i64>()?;
        params[0].set(amount - 10)?;
        next.proceed(params)
    }
}

/// 不调用续延，直接给出结果
struct Cached;

impl InterceptionHandler for Cached {
    fn intercept_value(&self, _next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
        let key = params[0].get::<String>()?;
        Ok(Value::new(format!("cached:{}", key)))
    }
}

/// 结果小于 2 时重试
struct Retry;

impl InterceptionHandler for Retry {
    fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
        loop {
            let value = next.proceed(params)?;
            if *value.downcast_ref::<u32>()? >= 2 {
                return Ok(value);
            }
        }
    }
}

/// 未找到时填写输出参数并替换返回值
struct Fallback;

impl InterceptionHandler for Fallback {
    fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
        assert!(params[1].is_out());
        assert!(params[1].is_by_ref());
        assert!(!params[1].has_value());

        let value = next.proceed(params)?;
        if *params[1].get::<bool>()? {
            return Ok(value);
        }
        params[1].set(true)?;
        Ok(Value::new(-1i64))
    }
}

struct Deny;

impl InterceptionHandler for Deny {
    fn intercept_void(&self, next: VoidContinuation<'_>, _params: &mut [ParamInfo]) -> ProxyResult<()> {
        Err(ProxyError::handler(anyhow::anyhow!("{} is read-only", next.method())))
    }
}

fn handler_named(name: &str) -> Arc<dyn InterceptionHandler> {
    match name {
        "Discount" => Arc::new(Discount),
        "Cached" => Arc::new(Cached),
        "Retry" => Arc::new(Retry),
        "Fallback" => Arc::new(Fallback),
        "Deny" => Arc::new(Deny),
        other => panic!("unexpected handler {}", other),
    }
}

fn shop() -> Proxy<PricingInterface, Shop> {
    let proxy_type = Proxy::<PricingInterface, Shop>::proxy_type().unwrap();
    let handlers = proxy_type
        .handler_types()
        .iter()
        .map(|handler| handler_named(handler.name()))
        .collect();
    Proxy::new(Shop::default(), handlers).unwrap()
}

#[test]
fn test_handler_modifies_argument_before_target() {
    assert_eq!(shop().quote(25), 30);
}

#[test]
fn test_short_circuit_skips_target() {
    let shop = shop();
    assert_eq!(shop.label("pear".to_string()), "cached:pear");
    assert_eq!(shop.target().labels.load(Ordering::SeqCst), 0);
}

#[test]
fn test_continuation_may_run_repeatedly() {
    let shop = shop();
    assert_eq!(shop.attempt(), 2);
    assert_eq!(shop.target().attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn test_handler_writes_out_parameter() {
    let shop = shop();

    let mut found = false;
    assert_eq!(shop.lookup("apple".to_string(), &mut found), 5);
    assert!(found);

    let mut found = false;
    assert_eq!(shop.lookup("plum".to_string(), &mut found), -1);
    assert!(found);
}

#[test]
fn test_handler_error_reaches_caller() {
    let shop = shop();

    let mut args = Args::new().arg("entry".to_string());
    let err = shop.instance().invoke("record", &mut args).unwrap_err();
    assert!(matches!(err, ProxyError::Handler(_)));
    assert!(err.to_string().contains("PricingService::record is read-only"));
}

#[test]
#[should_panic(expected = "PricingService::record")]
fn test_typed_call_panics_on_handler_error() {
    shop().record("entry".to_string());
}

/// 可以由任意处理器扮演的定价角色
trait Pricer: InterceptionHandler {}

#[test]
fn test_wrong_return_type_from_handler_is_rejected() {
    struct Liar;

    impl InterceptionHandler for Liar {
        fn intercept_value(&self, _next: Continuation<'_>, _params: &mut [ParamInfo]) -> ProxyResult<Value> {
            Ok(Value::new("not a number"))
        }
    }

    impl Pricer for Liar {}

    let mut catalog = HandlerCatalog::new();
    catalog.register_type::<dyn Pricer>("pricer");
    let config = InterceptionConfig::from_toml_str(
        r#"
[[interceptor]]
implementation = "Shop"
method = "quote"
handler = "pricer"
order = 20
"#,
    )
    .unwrap();

    let proxy_type = config.proxy_type::<PricingInterface, Shop>(&catalog).unwrap();
    let handlers = proxy_type
        .handler_types()
        .iter()
        .map(|handler| match handler.name() {
            "Pricer" => Arc::new(Liar) as Arc<dyn InterceptionHandler>,
            other => handler_named(other),
        })
        .collect();
    let shop = Proxy::<PricingInterface, Shop>::with_type(&proxy_type, Arc::new(Shop::default()), handlers).unwrap();

    let mut args = Args::new().arg(1i64);
    let err = shop.instance().invoke("quote", &mut args).unwrap_err();
    assert!(matches!(err, ProxyError::TypeMismatch { .. }));
}

#[test]
fn test_handler_of_wrong_type_is_rejected() {
    let proxy_type = Proxy::<PricingInterface, Shop>::proxy_type().unwrap();
    let mut handlers: Vec<Arc<dyn InterceptionHandler>> = proxy_type
        .handler_types()
        .iter()
        .map(|handler| handler_named(handler.name()))
        .collect();
    handlers.reverse();

    let result = Proxy::<PricingInterface, Shop>::new(Shop::default(), handlers);
    assert!(matches!(result, Err(ProxyError::HandlerMismatch { slot: 0, .. })));
}
