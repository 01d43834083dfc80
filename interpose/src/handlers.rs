// ============================================================================
// 预定义的常用拦截处理器
// ============================================================================

use crate::error::ProxyResult;
use crate::handler::{Continuation, InterceptionHandler, VoidContinuation};
use crate::param::ParamInfo;
use crate::value::Value;
use std::time::{Duration, Instant};

/// 日志处理器 - 记录方法调用的进入与退出
#[derive(Debug, Clone, Default)]
pub struct TracingHandler {
    log_params: bool,
}

impl TracingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时记录参数信息
    pub fn with_params(mut self) -> Self {
        self.log_params = true;
        self
    }

    fn enter(&self, method: &str, params: &[ParamInfo]) {
        if self.log_params {
            let described: Vec<String> = params.iter().map(describe_param).collect();
            tracing::info!("→ Entering: {}({})", method, described.join(", "));
        } else {
            tracing::info!("→ Entering: {}", method);
        }
    }
}

fn describe_param(param: &ParamInfo) -> String {
    let mode = if param.is_out() {
        "out "
    } else if param.is_by_ref() {
        "ref "
    } else {
        ""
    };
    let state = if param.has_value() { "" } else { " = <unset>" };
    format!("{}{}: {}{}", mode, param.name(), param.param_type(), state)
}

impl InterceptionHandler for TracingHandler {
    fn name(&self) -> &str {
        "TracingHandler"
    }

    fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
        self.enter(next.method(), params);
        let started = Instant::now();
        let result = next.proceed(params);
        match &result {
            Ok(value) => tracing::info!(
                "← Exiting: {} -> {} (took {:?})",
                next.method(),
                value.type_info(),
                started.elapsed()
            ),
            Err(error) => tracing::error!("❌ Error in {}: {}", next.method(), error),
        }
        result
    }

    fn intercept_void(&self, next: VoidContinuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<()> {
        self.enter(next.method(), params);
        let started = Instant::now();
        let result = next.proceed(params);
        match &result {
            Ok(()) => tracing::info!("← Exiting: {} (took {:?})", next.method(), started.elapsed()),
            Err(error) => tracing::error!("❌ Error in {}: {}", next.method(), error),
        }
        result
    }
}

/// 性能监控处理器 - 调用耗时超过阈值时告警
#[derive(Debug, Clone)]
pub struct TimingHandler {
    threshold: Duration,
}

impl TimingHandler {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    fn report(&self, method: &str, elapsed: Duration) -> bool {
        if elapsed > self.threshold {
            tracing::warn!(
                "⚠️ Slow method detected: {} took {:?} (threshold: {:?})",
                method,
                elapsed,
                self.threshold
            );
            true
        } else {
            tracing::trace!("{} took {:?}", method, elapsed);
            false
        }
    }
}

impl Default for TimingHandler {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl InterceptionHandler for TimingHandler {
    fn name(&self) -> &str {
        "TimingHandler"
    }

    fn intercept_value(&self, next: Continuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<Value> {
        let started = Instant::now();
        let result = next.proceed(params);
        self.report(next.method(), started.elapsed());
        result
    }

    fn intercept_void(&self, next: VoidContinuation<'_>, params: &mut [ParamInfo]) -> ProxyResult<()> {
        let started = Instant::now();
        let result = next.proceed(params);
        self.report(next.method(), started.elapsed());
        result
    }
}

crate::register_handler!(TracingHandler, "tracing");
crate::register_handler!(TimingHandler, "timing");
