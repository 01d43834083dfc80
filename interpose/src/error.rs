//! 错误类型
//!
//! 构建期错误（配置错误）与调用期错误统一在 [`ProxyError`] 中，
//! 配置错误单独归类到 [`ConfigurationError`]，便于调用方精确匹配。

use thiserror::Error;

/// 代理构建期的配置错误
///
/// 只会在 `build_proxy_type` / `get_or_build_proxy_type` 时同步返回，
/// 不会延迟到通过代理调用方法时
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// 传入的接口类型不是接口
    #[error("{name} is not an interface")]
    NotAnInterface { name: String },

    /// 实现类型不满足接口
    #[error("{interface} is not assignable from {implementation}: {reason}")]
    NotAssignable {
        interface: String,
        implementation: String,
        reason: String,
    },

    /// 声明的拦截处理器类型未实现 InterceptionHandler 能力
    #[error("interception handler type {handler} declared on {method} does not implement InterceptionHandler")]
    InvalidHandler { handler: String, method: String },
}

/// 代理引擎错误
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 构建期配置错误
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// 构造代理实例时传入的目标对象类型与实现类型不一致
    #[error("proxy {proxy} expects an instance of {expected}, got {found}")]
    InstanceMismatch {
        proxy: String,
        expected: String,
        found: String,
    },

    /// 构造代理实例时传入的处理器数量不匹配
    #[error("proxy {proxy} expects {expected} interception handler(s), got {found}")]
    HandlerCountMismatch {
        proxy: String,
        expected: usize,
        found: usize,
    },

    /// 构造代理实例时处理器实例的类型与槽位不一致
    #[error("proxy {proxy} expects a {expected} in handler slot {slot}, got {found}")]
    HandlerMismatch {
        proxy: String,
        slot: usize,
        expected: String,
        found: String,
    },

    /// 代理类型与请求的接口/实现组合不一致
    #[error("proxy type {proxy} was built for {built}, not {requested}")]
    ProxyTypeMismatch {
        proxy: String,
        built: String,
        requested: String,
    },

    /// 接口中不存在该方法
    #[error("method {method} is not part of {interface}")]
    UnknownMethod { interface: String, method: String },

    /// 方法名在继承的多个接口中重复，需要使用 `Interface::method` 形式
    #[error("method name {method} is ambiguous in {interface}, qualify it as Interface::{method}")]
    AmbiguousMethod { interface: String, method: String },

    /// 参数个数不匹配
    #[error("method {method} expects {expected} argument(s), got {found}")]
    ArityMismatch {
        method: String,
        expected: usize,
        found: usize,
    },

    /// 类型擦除值的类型不匹配
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// 参数槽位没有值
    #[error("missing value for {0}")]
    MissingValue(String),

    /// 有返回值的方法没有产生返回值
    #[error("method {0} produced no return value")]
    MissingReturn(String),

    /// 参数下标越界
    #[error("argument index {index} is out of range ({len} argument(s))")]
    ArgumentOutOfRange { index: usize, len: usize },

    /// 泛型方法的闭合方式与声明不一致
    #[error("generic method {method}: {reason}")]
    GenericMismatch { method: String, reason: String },

    /// 配置文件或处理器目录错误
    #[error("interception config error: {0}")]
    Config(String),

    /// 拦截处理器自身的失败
    #[error("interception handler failed: {0}")]
    Handler(#[source] anyhow::Error),
}

impl ProxyError {
    /// 由处理器返回的失败
    pub fn handler(error: impl Into<anyhow::Error>) -> Self {
        ProxyError::Handler(error.into())
    }

    /// 类型不匹配
    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        ProxyError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// 是否为构建期配置错误
    pub fn is_configuration(&self) -> bool {
        matches!(self, ProxyError::Configuration(_))
    }

    /// 获取配置错误详情
    pub fn as_configuration(&self) -> Option<&ConfigurationError> {
        match self {
            ProxyError::Configuration(err) => Some(err),
            _ => None,
        }
    }
}

/// 代理引擎结果类型
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_is_classified() {
        let err: ProxyError = ConfigurationError::NotAnInterface {
            name: "Calculator".to_string(),
        }
        .into();

        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "Calculator is not an interface");
        assert!(matches!(
            err.as_configuration(),
            Some(ConfigurationError::NotAnInterface { .. })
        ));
    }

    #[test]
    fn test_handler_error_keeps_source() {
        let err = ProxyError::handler(anyhow::anyhow!("quota exceeded"));

        assert!(!err.is_configuration());
        assert_eq!(err.to_string(), "interception handler failed: quota exceeded");
        assert!(std::error::Error::source(&err).is_some());
    }
}
