//! 代理类型缓存
//!
//! 每个（接口，实现，拦截指令）组合最多构建一次代理类型，条目在进程生命周期内不会淘汰。
//! 同一对类型在追加了配置规则后拥有不同的拦截指令，因而得到不同的代理类型。

use crate::descriptor::{MethodKey, TypeDescriptor};
use crate::error::ProxyResult;
use crate::factory::{build_proxy_type, ProxyType};
use crate::value::TypeInfo;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Cell = Arc<OnceCell<Arc<ProxyType>>>;

/// 一个具体方法的拦截指令：方法名、显式实现的接口方法、（处理器类型，顺序值）
type MethodDirectives = (String, Option<MethodKey>, Vec<(TypeInfo, i32)>);

/// 实现描述中全部拦截指令的规范形式
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Directives(Vec<MethodDirectives>);

impl Directives {
    fn of(implementation: &TypeDescriptor) -> Self {
        Self(
            implementation
                .methods()
                .iter()
                .filter(|method| !method.interceptors().is_empty())
                .map(|method| {
                    let handlers = method
                        .interceptors()
                        .iter()
                        .map(|directive| (directive.handler().key(), directive.order()))
                        .collect();
                    (method.name().to_string(), method.explicit_target().cloned(), handlers)
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    interface: TypeInfo,
    implementation: TypeInfo,
    directives: Directives,
}

impl CacheKey {
    fn of(interface: &TypeDescriptor, implementation: &TypeDescriptor) -> Self {
        Self {
            interface: interface.key(),
            implementation: implementation.key(),
            directives: Directives::of(implementation),
        }
    }
}

/// 全局代理类型缓存
static GLOBAL_PROXY_CACHE: Lazy<ProxyTypeCache> = Lazy::new(ProxyTypeCache::new);

/// 获取全局代理类型缓存
pub fn global_cache() -> &'static ProxyTypeCache {
    &GLOBAL_PROXY_CACHE
}

/// 经过全局缓存获取（或构建）代理类型
pub fn get_or_build_proxy_type(
    interface: &Arc<TypeDescriptor>,
    implementation: &Arc<TypeDescriptor>,
) -> ProxyResult<Arc<ProxyType>> {
    global_cache().get_or_build(interface, implementation)
}

/// 代理类型缓存
///
/// 每个键对应一个只初始化一次的单元，并发的首次请求中只有一个会真正构建，
/// 其余等待同一结果。构建在单元内进行，不持有表锁；
/// 读路径使用 `read_recursive`，不会排在等待插入新键的写者之后。
#[derive(Default)]
pub struct ProxyTypeCache {
    entries: RwLock<HashMap<CacheKey, Cell>>,
    /// 类型标识到其声明描述对应条目的捷径，命中时无需生成描述
    declared: RwLock<HashMap<(TypeInfo, TypeInfo), Cell>>,
    builds: AtomicUsize,
}

impl ProxyTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按接口、实现及实现上的全部拦截指令查找，未命中时构建
    pub fn get_or_build(
        &self,
        interface: &Arc<TypeDescriptor>,
        implementation: &Arc<TypeDescriptor>,
    ) -> ProxyResult<Arc<ProxyType>> {
        let cell = cell_in(&self.entries, CacheKey::of(interface, implementation));
        if let Some(proxy) = cell.get() {
            tracing::trace!("Proxy type cache hit: {}", proxy.name());
            return Ok(proxy.clone());
        }

        let proxy = cell.get_or_try_init(|| {
            let proxy = build_proxy_type(interface, implementation)?;
            self.builds.fetch_add(1, Ordering::SeqCst);
            tracing::info!("Cached proxy type {}", proxy.name());
            Ok::<_, crate::error::ProxyError>(proxy)
        })?;
        Ok(proxy.clone())
    }

    /// 按类型标识查找声明描述对应的代理类型，未命中时才调用 `describe`
    ///
    /// `describe` 必须返回这对类型的声明描述（例如由宏生成的描述），
    /// 生成可能比较昂贵，命中时不会调用。结果与用同一描述调用
    /// [`ProxyTypeCache::get_or_build`] 得到的是同一个代理类型
    pub fn get_or_build_with<F>(
        &self,
        interface: TypeInfo,
        implementation: TypeInfo,
        describe: F,
    ) -> ProxyResult<Arc<ProxyType>>
    where
        F: FnOnce() -> (Arc<TypeDescriptor>, Arc<TypeDescriptor>),
    {
        let cell = cell_in(&self.declared, (interface, implementation));
        if let Some(proxy) = cell.get() {
            tracing::trace!("Proxy type cache hit: {}", proxy.name());
            return Ok(proxy.clone());
        }

        let proxy = cell.get_or_try_init(|| {
            let (interface, implementation) = describe();
            self.get_or_build(&interface, &implementation)
        })?;
        Ok(proxy.clone())
    }

    /// 只查找，不构建
    pub fn get(
        &self,
        interface: &TypeDescriptor,
        implementation: &TypeDescriptor,
    ) -> Option<Arc<ProxyType>> {
        self.entries
            .read_recursive()
            .get(&CacheKey::of(interface, implementation))
            .and_then(|cell| cell.get().cloned())
    }

    /// 已构建的代理类型数量
    pub fn len(&self) -> usize {
        self.entries
            .read_recursive()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 本缓存实际执行构建的次数
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

/// 取出键对应的单元，不存在时插入一个空单元
///
/// 写锁只覆盖插入空单元，构建在锁外进行
fn cell_in<K: Hash + Eq>(map: &RwLock<HashMap<K, Cell>>, key: K) -> Cell {
    if let Some(cell) = map.read_recursive().get(&key) {
        return cell.clone();
    }
    map.write()
        .entry(key)
        .or_insert_with(|| Arc::new(OnceCell::new()))
        .clone()
}
