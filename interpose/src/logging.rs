//! 日志初始化
//!
//! 引擎本身只通过 `tracing` 发出事件；应用可以用 [`LoggingConfig`] 安装订阅者，
//! 也可以使用自己的订阅者。

use crate::error::{ProxyError, ProxyResult};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{fmt as subscriber, EnvFilter};

/// 过滤规则的环境变量，语法同 `RUST_LOG`
pub const LOG_ENV: &str = "INTERPOSE_LOG";

/// 日志格式的环境变量
pub const LOG_FORMAT_ENV: &str = "INTERPOSE_LOG_FORMAT";

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 紧凑格式（默认）
    Compact,
    /// 美化格式（适合开发）
    Pretty,
    /// JSON 格式
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 默认级别（默认：Info）
    pub level: LogLevel,

    pub format: LogFormat,

    /// 自定义过滤器，例如 "interpose=trace,app=info"；设置后优先于 `level`
    pub filter: Option<String>,

    /// 是否显示目标（模块路径）（默认：false）
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            filter: None,
            show_target: false,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    /// 从 `INTERPOSE_LOG` / `INTERPOSE_LOG_FORMAT` 读取配置，无法解析的值被忽略
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(filter) = lookup(LOG_ENV).filter(|f| !f.trim().is_empty()) {
            config.filter = Some(filter);
        }
        if let Some(Ok(format)) = lookup(LOG_FORMAT_ENV).map(|f| f.parse::<LogFormat>()) {
            config.format = format;
        }
        config
    }

    /// 实际使用的过滤规则
    pub fn directive(&self) -> String {
        self.filter
            .clone()
            .unwrap_or_else(|| self.level.to_string())
    }

    /// 安装全局订阅者；已安装过订阅者时返回错误
    pub fn init(self) -> ProxyResult<()> {
        let env_filter = EnvFilter::try_new(self.directive())
            .map_err(|e| ProxyError::Config(format!("Invalid log filter '{}': {}", self.directive(), e)))?;

        let installed = match self.format {
            LogFormat::Compact => subscriber()
                .with_env_filter(env_filter)
                .compact()
                .with_target(self.show_target)
                .try_init(),
            LogFormat::Pretty => subscriber()
                .with_env_filter(env_filter)
                .pretty()
                .with_target(self.show_target)
                .try_init(),
            LogFormat::Json => subscriber()
                .with_env_filter(env_filter)
                .json()
                .with_target(self.show_target)
                .try_init(),
        };
        installed.map_err(|e| ProxyError::Config(format!("Failed to initialise logging: {}", e)))
    }
}
