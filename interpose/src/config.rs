//! 拦截配置
//!
//! 除了在代码中声明 `#[interceptor]`，也可以用 TOML 文件按名称追加拦截处理器：
//!
//! ```toml
//! [[interceptor]]
//! implementation = "*Calculator"
//! method = "sum"
//! handler = "audit"
//! order = 5
//! ```
//!
//! 处理器名称在 [`HandlerCatalog`] 中解析。

use crate::cache::get_or_build_proxy_type;
use crate::descriptor::{ClassBuilder, TypeDescriptor};
use crate::error::{ProxyError, ProxyResult};
use crate::factory::ProxyType;
use crate::handler::HandlerCatalog;
use crate::proxy::{implementation_descriptor, ImplementationOf, Interface};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// 一条拦截规则
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterceptorRule {
    /// 实现类型名的通配模式
    #[serde(default = "match_all")]
    pub implementation: String,

    /// 方法名的通配模式
    pub method: String,

    /// 处理器在目录中的名称
    pub handler: String,

    #[serde(default)]
    pub order: i32,
}

fn match_all() -> String {
    "*".to_string()
}

/// 拦截配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InterceptionConfig {
    #[serde(rename = "interceptor", default)]
    pub rules: Vec<InterceptorRule>,
}

impl InterceptionConfig {
    /// 从字符串解析 TOML 配置
    pub fn from_toml_str(content: &str) -> ProxyResult<Self> {
        toml::from_str(content).map_err(|e| ProxyError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// 从文件加载 TOML 配置
    pub fn load(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Failed to read config file {:?}: {}", path, e)))?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            "Loaded {} interceptor rule(s) from {}",
            config.rules.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 把匹配的规则作为拦截指令追加到类型描述上
    ///
    /// 规则按文件中的顺序追加，排在代码声明的指令之后
    pub fn apply(&self, mut class: ClassBuilder, catalog: &HandlerCatalog) -> ProxyResult<ClassBuilder> {
        for rule in &self.rules {
            if !pattern_matches(&rule.implementation, class.name())? {
                continue;
            }
            let handler = catalog.resolve(&rule.handler)?;
            for method in class.method_names() {
                if !pattern_matches(&rule.method, &method)? {
                    continue;
                }
                class.intercept_method(&method, &handler, rule.order);
                tracing::debug!(
                    "  ├─ {}::{} intercepted by '{}' (order {})",
                    class.name(),
                    method,
                    rule.handler,
                    rule.order
                );
            }
        }
        Ok(class)
    }

    /// 生成实现类型 `C` 的描述，并追加本配置中的规则
    pub fn describe<M, C>(&self, catalog: &HandlerCatalog) -> ProxyResult<Arc<TypeDescriptor>>
    where
        M: Interface,
        C: ImplementationOf<M>,
    {
        let declared = implementation_descriptor::<M, C>();
        let mut class = TypeDescriptor::class::<C>().named(declared.name().to_string());
        for interface in declared.extends() {
            class = class.implements(interface.clone());
        }
        for method in declared.methods() {
            class = class.method(method.clone());
        }
        Ok(self.apply(class, catalog)?.build())
    }

    /// 经过全局缓存获取追加了本配置规则的代理类型
    ///
    /// 规则改变了拦截指令时，结果与 `Proxy::<M, C>::proxy_type()` 是不同的类型
    pub fn proxy_type<M, C>(&self, catalog: &HandlerCatalog) -> ProxyResult<Arc<ProxyType>>
    where
        M: Interface,
        C: ImplementationOf<M>,
    {
        get_or_build_proxy_type(&M::descriptor(), &self.describe::<M, C>(catalog)?)
    }
}

/// 通配符匹配
///
/// - `*` - 匹配所有
/// - `*Service` - 以 Service 结尾
/// - `User*` - 以 User 开头
fn pattern_matches(pattern: &str, target: &str) -> ProxyResult<bool> {
    if pattern == "*" {
        return Ok(true);
    }
    if !pattern.contains('*') {
        return Ok(pattern == target);
    }

    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    let regex = Regex::new(&format!("^{}$", escaped.join(".*")))
        .map_err(|e| ProxyError::Config(format!("Invalid pattern '{}': {}", pattern, e)))?;
    Ok(regex.is_match(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ConcreteMethod, MethodSignature};
    use crate::handler::InterceptionHandler;
    use std::io::Write;

    struct Audit;

    impl InterceptionHandler for Audit {}

    struct SimpleCalculator;

    const RULES: &str = r#"
[[interceptor]]
implementation = "*Calculator"
method = "s*"
handler = "audit"
order = 5

[[interceptor]]
method = "reset"
handler = "audit"
"#;

    fn class() -> ClassBuilder {
        TypeDescriptor::class::<SimpleCalculator>()
            .named("SimpleCalculator")
            .method(ConcreteMethod::open(MethodSignature::new("sum")))
            .method(ConcreteMethod::open(MethodSignature::new("subtract")))
            .method(ConcreteMethod::open(MethodSignature::new("reset")))
            .method(ConcreteMethod::open(MethodSignature::new("product")))
    }

    fn catalog() -> HandlerCatalog {
        let mut catalog = HandlerCatalog::new();
        catalog.register_type::<Audit>("audit");
        catalog
    }

    #[test]
    fn test_parse_rules_with_defaults() {
        let config = InterceptionConfig::from_toml_str(RULES).unwrap();

        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].order, 5);
        assert_eq!(config.rules[1].implementation, "*");
        assert_eq!(config.rules[1].order, 0);
        assert!(InterceptionConfig::from_toml_str("").unwrap().is_empty());
    }

    #[test]
    fn test_apply_matches_type_and_method() {
        let config = InterceptionConfig::from_toml_str(RULES).unwrap();
        let class = config.apply(class(), &catalog()).unwrap().build();

        let counts: Vec<_> = class.methods().iter().map(|m| m.interceptors().len()).collect();
        assert_eq!(counts, vec![1, 1, 1, 0]);
        assert_eq!(class.methods()[0].interceptors()[0].order(), 5);
    }

    #[test]
    fn test_unknown_handler_is_config_error() {
        let config = InterceptionConfig::from_toml_str(
            "[[interceptor]]\nmethod = \"sum\"\nhandler = \"missing\"\n",
        )
        .unwrap();

        let err = config.apply(class(), &catalog()).unwrap_err();
        assert!(matches!(err, ProxyError::Config(message) if message.contains("missing")));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RULES.as_bytes()).unwrap();

        let config = InterceptionConfig::load(file.path()).unwrap();
        assert_eq!(config.rules[0].handler, "audit");

        assert!(matches!(
            InterceptionConfig::load(file.path().with_extension("absent")),
            Err(ProxyError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            InterceptionConfig::from_toml_str("[[interceptor]]\nmethod = 3"),
            Err(ProxyError::Config(_))
        ));
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("*", "anything").unwrap());
        assert!(pattern_matches("*Service", "UserService").unwrap());
        assert!(pattern_matches("User*", "UserService").unwrap());
        assert!(pattern_matches("*ser*", "UserService").unwrap());
        assert!(!pattern_matches("User", "UserService").unwrap());
        // 其余字符按字面匹配
        assert!(pattern_matches("Store<*>", "Store<i32>").unwrap());
        assert!(!pattern_matches("a.c*", "abcd").unwrap());
    }
}
