//! Interpose - 接口拦截代理
//!
//! 为一个接口与它的实现类型构建代理：每个接口方法要么直接转发给实现，
//! 要么经过按顺序值排列的拦截处理器链。支持：
//! - 按值、按引用与输出参数，处理器可以查看并修改参数
//! - 处理器可以调用续延零次、一次或多次，也可以替换返回值
//! - 泛型接口与在调用点闭合的泛型方法
//! - 显式实现（实现方法名与接口方法名不同）与接口继承
//! - 按（接口，实现）缓存代理类型，并发首次使用时只构建一次
//!
//! ```ignore
//! use interpose::prelude::*;
//!
//! #[interface]
//! pub trait Calculator {
//!     fn sum(&self, a: i32, b: i32) -> i32;
//! }
//!
//! pub struct SimpleCalculator;
//!
//! #[intercepted]
//! impl Calculator for SimpleCalculator {
//!     #[interceptor(TracingHandler, order = 0)]
//!     fn sum(&self, a: i32, b: i32) -> i32 {
//!         a + b
//!     }
//! }
//!
//! let calc = Proxy::<CalculatorInterface, SimpleCalculator>::new(
//!     SimpleCalculator,
//!     vec![Arc::new(TracingHandler::new())],
//! )?;
//! assert_eq!(calc.sum(1, 2), 3);
//! ```

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod factory;
pub mod handler;
pub mod handlers;
pub mod logging;
pub mod param;
pub mod proxy;
pub mod resolution;
pub mod value;

// 重新导出核心类型
pub use cache::{get_or_build_proxy_type, global_cache, ProxyTypeCache};
pub use config::{InterceptionConfig, InterceptorRule};
pub use descriptor::{
    ClassBuilder, ConcreteMethod, InterceptorDirective, InterfaceBuilder, Invoker, MethodKey,
    MethodSignature, ParamSignature, TypeDescriptor, TypeKind, TypeRef,
};
pub use error::{ConfigurationError, ProxyError, ProxyResult};
pub use factory::{build_proxy_type, ClosedMethod, ProxyInstance, ProxyType, Terminal};
pub use handler::{
    get_all_handler_registrations, handler_capability, handler_type, Continuation, HandlerCatalog,
    HandlerRegistration, InterceptionHandler, VoidContinuation,
};
pub use handlers::{TimingHandler, TracingHandler};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use param::{ParamInfo, Passing};
pub use proxy::{implementation_descriptor, Extends, ImplementationOf, Interface, Proxy};
pub use resolution::{resolve, MethodPair};
pub use value::{Args, TypeInfo, Value};

// 重新导出宏
pub use interpose_macros::{intercepted, interface};

// 导出 inventory 供宏使用
pub use inventory;

#[doc(hidden)]
pub use proxy::__private;

/// 预导入模块
pub mod prelude {
    pub use crate::error::{ConfigurationError, ProxyError, ProxyResult};
    pub use crate::factory::{build_proxy_type, ProxyInstance, ProxyType};
    pub use crate::cache::get_or_build_proxy_type;
    pub use crate::handler::{handler_type, Continuation, InterceptionHandler, VoidContinuation};
    pub use crate::handlers::{TimingHandler, TracingHandler};
    pub use crate::param::ParamInfo;
    pub use crate::proxy::{Extends, ImplementationOf, Interface, Proxy};
    pub use crate::value::{Args, Value};
    pub use crate::{intercepted, interface, register_handler};
    pub use std::sync::Arc;
}
