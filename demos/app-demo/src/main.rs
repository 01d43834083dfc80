use interpose::prelude::*;
use interpose::{HandlerCatalog, InterceptionConfig, LoggingConfig, LogLevel};
use parking_lot::Mutex;
use std::time::Duration;

// ==================== 接口定义 ====================

#[interface]
pub trait Calculator: Send + Sync {
    fn sum(&self, a: i32, b: i32) -> i32;
    fn divide(&self, a: i32, b: i32, #[out] remainder: &mut i32) -> i32;
    fn clear(&self);
}

#[interface]
pub trait Repository<T: Clone + Send + Sync + 'static>: Send + Sync {
    fn save(&self, item: T) -> usize;
    fn find<K: Clone + Send + 'static>(&self, key: K) -> Option<T>;
}

// ==================== 实现 ====================

pub struct SimpleCalculator;

#[intercepted]
impl Calculator for SimpleCalculator {
    #[interceptor(TracingHandler, order = 10)]
    #[interceptor(Guard, order = 1)]
    fn sum(&self, a: i32, b: i32) -> i32 {
        a + b
    }

    #[interceptor(Guard)]
    fn divide(&self, a: i32, b: i32, #[out] remainder: &mut i32) -> i32 {
        *remainder = a % b;
        a / b
    }

    fn clear(&self) {
        println!("   🧹 cleared");
    }
}

pub struct VecRepository<T> {
    items: Mutex<Vec<T>>,
}

#[intercepted]
impl<T: Clone + Send + Sync + 'static> Repository<T> for VecRepository<T> {
    #[interceptor(TimingHandler)]
    fn save(&self, item: T) -> usize {
        let mut items = self.items.lock();
        items.push(item);
        items.len()
    }

    #[interceptor(TracingHandler)]
    fn find<K: Clone + Send + 'static>(&self, _key: K) -> Option<T> {
        let items = self.items.lock();
        items.last().cloned()
    }
}

// ==================== 处理器 ====================

/// 拒绝除数为 0 的调用，并把负数参数归零
struct Guard;

impl InterceptionHandler for Guard {
    fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
        for param in params.iter_mut().filter(|param| !param.is_out()) {
            if *param.get::<i32>()? < 0 {
                param.set(0i32)?;
            }
        }
        if next.method().ends_with("divide") && *params[1].get::<i32>()? == 0 {
            tracing::warn!("Refusing {} by zero", next.method());
            params[2].set(0i32)?;
            return Ok(Value::new(0i32));
        }
        next.proceed(params)
    }
}

interpose::register_handler!(Guard, "guard");

const RULES: &str = r#"
[[interceptor]]
implementation = "SimpleCalculator"
method = "clear"
handler = "tracing"
order = 0
"#;

fn handlers_for(proxy_type: &interpose::ProxyType) -> Vec<Arc<dyn InterceptionHandler>> {
    proxy_type
        .handler_types()
        .iter()
        .map(|handler| -> Arc<dyn InterceptionHandler> {
            match handler.name() {
                "Guard" => Arc::new(Guard),
                "TimingHandler" => Arc::new(TimingHandler::new(Duration::from_millis(5))),
                _ => Arc::new(TracingHandler::new().with_params()),
            }
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    LoggingConfig::from_env().level(LogLevel::Debug).init()?;

    println!("🚀 Interpose demo\n");

    // ==================== 声明式拦截 ====================
    let proxy_type = Proxy::<CalculatorInterface, SimpleCalculator>::proxy_type()?;
    println!("📦 {}", proxy_type.name());
    for method in proxy_type.method_names() {
        let chain: Vec<_> = proxy_type
            .handler_chain(method)?
            .iter()
            .map(|handler| handler.name().to_string())
            .collect();
        println!("   {} -> {:?}", method, chain);
    }

    let calc = Proxy::<CalculatorInterface, SimpleCalculator>::new(SimpleCalculator, handlers_for(&proxy_type))?;
    println!("\n➕ sum(2, 3) = {}", calc.sum(2, 3));
    println!("➕ sum(-4, 3) = {}", calc.sum(-4, 3));

    let mut remainder = 0;
    let quotient = calc.divide(17, 5, &mut remainder);
    println!("➗ divide(17, 5) = {} remainder {}", quotient, remainder);
    let quotient = calc.divide(1, 0, &mut remainder);
    println!("➗ divide(1, 0) = {} remainder {}", quotient, remainder);

    // ==================== 配置追加拦截 ====================
    let config = InterceptionConfig::from_toml_str(RULES)?;
    let catalog = HandlerCatalog::from_inventory();
    let configured = config.proxy_type::<CalculatorInterface, SimpleCalculator>(&catalog)?;
    let calc = Proxy::<CalculatorInterface, SimpleCalculator>::with_type(
        &configured,
        Arc::new(SimpleCalculator),
        handlers_for(&configured),
    )?;
    println!("\n⚙️  clear() with configured tracing:");
    calc.clear();

    // ==================== 泛型接口 ====================
    let repository = Proxy::<RepositoryInterface<String>, VecRepository<String>>::proxy_type()?;
    let names = Proxy::<RepositoryInterface<String>, VecRepository<String>>::new(
        VecRepository {
            items: Mutex::new(Vec::new()),
        },
        handlers_for(&repository),
    )?;
    names.save("alice".to_string());
    let count = names.save("bob".to_string());
    println!("\n🗂️  saved {} name(s), last = {:?}", count, names.find(42u32));

    println!("\n✅ Done");
    Ok(())
}
