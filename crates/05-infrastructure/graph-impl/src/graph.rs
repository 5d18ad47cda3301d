//! 对象图
//!
//! 通过注册表找到提供者，在目标作用域的缓存中获取或创建实例，
//! 依赖按深度优先顺序在工厂执行前解析完毕，释放时级联归还依赖

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tether_common::{
    display_chain, ComponentDescriptor, DisposalError, GraphError, GraphResult, Key, ScopeChain,
    ScopeName,
};
use tether_graph_abstractions::{
    CycleDetector, DefaultCycleDetector, DependencyGraphNode, GraphModule, Provider,
    ReleaseOutcome, ResolutionContext, Resolved, ResolvedDependencies, Resolver, ResolverExt,
};
use tracing::{debug, info, warn};

use crate::cache::{CacheRelease, CacheStore, Eviction, HijackToken, NewInstance, ScopeCache};
use crate::registry::ProviderRegistry;

/// 对象图设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSettings {
    /// 根作用域名称，作用域链为空时的解析目标
    pub root_scope: ScopeName,
    /// 最大解析深度
    pub max_resolution_depth: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            root_scope: ScopeName::root(),
            max_resolution_depth: 256,
        }
    }
}

/// 对象图统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// 解析请求次数（包含依赖）
    pub resolutions: u64,
    /// 实例创建次数
    pub constructions: u64,
    /// 释放请求次数
    pub releases: u64,
    /// 移出缓存的实例数
    pub evictions: u64,
    /// 销毁钩子失败次数
    pub disposal_failures: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    resolutions: AtomicU64,
    constructions: AtomicU64,
    releases: AtomicU64,
    evictions: AtomicU64,
    disposal_failures: AtomicU64,
}

/// 对象图
///
/// 唯一持有所有作用域缓存；可以并发解析和释放
pub struct Graph {
    registry: RwLock<ProviderRegistry>,
    scopes: DashMap<ScopeName, Arc<ScopeCache>>,
    settings: GraphSettings,
    detector: DefaultCycleDetector,
    acyclic: Mutex<HashSet<Key>>,
    disposal_errors: Mutex<Vec<DisposalError>>,
    stats: StatsCounters,
}

impl Graph {
    /// 使用注册表和设置创建对象图，同时创建根作用域
    pub fn new(registry: ProviderRegistry, settings: GraphSettings) -> Self {
        let graph = Self {
            registry: RwLock::new(registry),
            scopes: DashMap::new(),
            settings,
            detector: DefaultCycleDetector,
            acyclic: Mutex::new(HashSet::new()),
            disposal_errors: Mutex::new(Vec::new()),
            stats: StatsCounters::default(),
        };
        graph.create_scope(graph.settings.root_scope.clone());
        graph
    }

    /// 使用默认设置创建对象图
    pub fn with_registry(registry: ProviderRegistry) -> Self {
        Self::new(registry, GraphSettings::default())
    }

    /// 设置
    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// 根作用域名称
    pub fn root_scope(&self) -> &ScopeName {
        &self.settings.root_scope
    }

    /// 动态注册提供者
    pub fn register(&self, provider: impl Into<Provider>) -> GraphResult<()> {
        self.registry.write().register(provider)?;
        self.acyclic.lock().clear();
        Ok(())
    }

    /// 动态注册模块
    pub fn register_module(&self, module: &dyn GraphModule) -> GraphResult<usize> {
        let count = self.registry.write().register_module(module)?;
        self.acyclic.lock().clear();
        Ok(count)
    }

    /// 是否存在可用的提供者
    pub fn can_resolve(&self, key: &Key) -> bool {
        self.registry.read().contains(key)
    }

    /// 所有显式绑定的描述符
    pub fn descriptors(&self) -> Vec<ComponentDescriptor> {
        self.registry.read().descriptors()
    }

    /// 创建作用域，已存在时返回现有作用域
    pub fn create_scope(&self, name: impl Into<ScopeName>) -> Arc<ScopeCache> {
        let name = name.into();
        self.scopes
            .entry(name.clone())
            .or_insert_with(|| {
                info!("创建作用域: {}", name);
                Arc::new(ScopeCache::new(name.clone()))
            })
            .clone()
    }

    /// 查找作用域
    pub fn scope(&self, name: &ScopeName) -> Option<Arc<ScopeCache>> {
        self.scopes.get(name).map(|entry| entry.value().clone())
    }

    /// 所有作用域名称，按名称排序
    pub fn scope_names(&self) -> Vec<ScopeName> {
        let mut names: Vec<ScopeName> = self.scopes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// 销毁作用域
    ///
    /// 作用域内剩余的实例按创建顺序倒序销毁，为它们获取的其他作用域中的依赖被级联释放。
    /// 返回移出的实例数量。
    pub async fn destroy_scope(&self, name: &ScopeName) -> GraphResult<usize> {
        let (_, cache) = self
            .scopes
            .remove(name)
            .ok_or_else(|| GraphError::scope_not_found(name))?;

        let evictions = cache.drain().await;
        let count = evictions.len();
        let mut pending = VecDeque::new();
        for eviction in evictions {
            pending.extend(self.record_eviction(eviction));
        }
        self.cascade(pending).await;

        info!("销毁作用域: {} ({} 个实例)", name, count);
        Ok(count)
    }

    /// 解析并向下转型
    pub async fn resolve<T>(&self, key: &Key, chain: &ScopeChain) -> GraphResult<Resolved<T>>
    where
        T: Send + Sync + 'static,
    {
        self.resolve_as::<T>(key, chain).await
    }

    /// 解析实例（类型擦除）
    pub async fn resolve_instance(&self, key: &Key, chain: &ScopeChain) -> GraphResult<Resolved> {
        self.check_cycles(key)?;
        let mut context = ResolutionContext::new(self.settings.max_resolution_depth);
        self.resolve_node(key, chain, &mut context).await
    }

    /// 释放实例
    ///
    /// 引用计数归零时级联释放为它获取的依赖；未持有或作用域已销毁时为空操作
    pub async fn release(&self, key: &Key, scope: &ScopeName) -> GraphResult<ReleaseOutcome> {
        self.stats.releases.fetch_add(1, Ordering::Relaxed);

        let Some(cache) = self.scope(scope) else {
            debug!("释放时作用域已不存在: {} (作用域 {})", key, scope);
            return Ok(ReleaseOutcome::NotHeld);
        };

        let eviction = match cache.release(key).await {
            CacheRelease::NotHeld => {
                debug!("释放未持有的实例: {} (作用域 {})", key, scope);
                return Ok(ReleaseOutcome::NotHeld);
            }
            CacheRelease::Retained { remaining } => {
                return Ok(ReleaseOutcome::Retained { remaining });
            }
            CacheRelease::Evicted(eviction) => eviction,
        };

        let pending = self.record_eviction(eviction);
        self.cascade(pending.into()).await;
        Ok(ReleaseOutcome::Disposed)
    }

    /// 劫持作用域缓存
    pub fn hijack(&self, scope: &ScopeName, replacement: CacheStore) -> GraphResult<HijackToken> {
        let cache = self
            .scope(scope)
            .ok_or_else(|| GraphError::scope_not_found(scope))?;
        cache.hijack(Arc::new(replacement))
    }

    /// 结束劫持，返回替换用的存储
    pub fn unhijack(&self, token: HijackToken) -> GraphResult<Arc<CacheStore>> {
        let cache = self
            .scope(token.scope())
            .ok_or_else(|| GraphError::scope_not_found(token.scope()))?;
        cache.unhijack(token)
    }

    /// 验证所有绑定
    ///
    /// 返回全部无法解析的依赖和循环依赖
    pub fn validate(&self) -> Result<(), Vec<GraphError>> {
        let registry = self.registry.read();
        let mut errors = Vec::new();

        for provider in registry.providers() {
            for dependency in provider.dependencies() {
                if !registry.contains(dependency) {
                    errors.push(GraphError::unresolved(
                        dependency,
                        display_chain([provider.key(), dependency]),
                    ));
                }
            }
        }

        let nodes: Vec<DependencyGraphNode> = registry
            .providers()
            .into_iter()
            .map(|provider| DependencyGraphNode {
                key: provider.key().clone(),
                dependencies: provider.dependencies().to_vec(),
            })
            .collect();
        for cycle in self.detector.find_all_cycles(&nodes) {
            errors.push(GraphError::cyclic(display_chain(&cycle)));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            warn!("对象图验证失败: {} 个问题", errors.len());
            Err(errors)
        }
    }

    /// 取出已上报的销毁错误
    pub fn take_disposal_errors(&self) -> Vec<DisposalError> {
        std::mem::take(&mut *self.disposal_errors.lock())
    }

    /// 统计信息
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            resolutions: self.stats.resolutions.load(Ordering::Relaxed),
            constructions: self.stats.constructions.load(Ordering::Relaxed),
            releases: self.stats.releases.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            disposal_failures: self.stats.disposal_failures.load(Ordering::Relaxed),
        }
    }

    fn check_cycles(&self, key: &Key) -> GraphResult<()> {
        if self.acyclic.lock().contains(key) {
            return Ok(());
        }

        let registry = self.registry.read();
        let dependencies_of = |key: &Key| {
            registry
                .lookup(key)
                .map(|provider| provider.dependencies().to_vec())
                .unwrap_or_default()
        };
        if let Some(cycle) = self.detector.find_cycle_from(key, &dependencies_of) {
            return Err(GraphError::cyclic(display_chain(&cycle)));
        }
        drop(registry);

        self.acyclic.lock().insert(key.clone());
        Ok(())
    }

    fn target_scope(&self, provider: &Provider, chain: &ScopeChain) -> ScopeName {
        provider
            .scope()
            .or_else(|| chain.innermost())
            .unwrap_or(&self.settings.root_scope)
            .clone()
    }

    fn resolve_node<'a>(
        &'a self,
        key: &'a Key,
        chain: &'a ScopeChain,
        context: &'a mut ResolutionContext,
    ) -> BoxFuture<'a, GraphResult<Resolved>> {
        Box::pin(async move {
            context.push(key)?;
            let result = self.acquire_node(key, chain, context).await;
            context.pop();
            result
        })
    }

    async fn acquire_node(
        &self,
        key: &Key,
        chain: &ScopeChain,
        context: &mut ResolutionContext,
    ) -> GraphResult<Resolved> {
        self.stats.resolutions.fetch_add(1, Ordering::Relaxed);

        let provider = self
            .registry
            .read()
            .lookup(key)
            .ok_or_else(|| GraphError::unresolved(key, context.describe()))?;
        let scope = self.target_scope(&provider, chain);
        let cache = self
            .scope(&scope)
            .ok_or_else(|| GraphError::scope_not_found(&scope))?;
        let dependency_chain = chain.up_to(&scope);

        let acquired = cache
            .acquire(
                key,
                self.construct(key, &provider, &dependency_chain, context),
            )
            .await?;

        debug!(
            "解析: {} (作用域 {}, 引用计数 {})",
            key, scope, acquired.ref_count
        );
        Ok(Resolved {
            value: acquired.value,
            scope,
            created: acquired.created,
        })
    }

    async fn construct(
        &self,
        key: &Key,
        provider: &Provider,
        chain: &ScopeChain,
        context: &mut ResolutionContext,
    ) -> GraphResult<NewInstance> {
        let mut dependencies = ResolvedDependencies::new();
        let mut acquired: Vec<(Key, ScopeName)> = Vec::new();

        for dependency in provider.dependencies() {
            match self.resolve_node(dependency, chain, context).await {
                Ok(resolved) => {
                    dependencies.insert(dependency.clone(), resolved.value);
                    acquired.push((dependency.clone(), resolved.scope));
                }
                Err(err) => {
                    self.rollback(acquired).await;
                    return Err(err);
                }
            }
        }

        match provider.create(&dependencies) {
            Ok(value) => {
                self.stats.constructions.fetch_add(1, Ordering::Relaxed);
                debug!("创建实例: {} ({})", key, provider.type_name());
                Ok(NewInstance {
                    value,
                    disposer: provider.disposer().cloned(),
                    dependencies: acquired,
                })
            }
            Err(source) => {
                self.rollback(acquired).await;
                Err(GraphError::FactoryFailed {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    async fn rollback(&self, acquired: Vec<(Key, ScopeName)>) {
        if !acquired.is_empty() {
            debug!("回滚已获取的依赖: {} 个", acquired.len());
        }
        self.cascade(acquired.into_iter().rev().collect()).await;
    }

    fn record_eviction(&self, eviction: Eviction) -> Vec<(Key, ScopeName)> {
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = eviction.disposal_error {
            self.stats.disposal_failures.fetch_add(1, Ordering::Relaxed);
            self.disposal_errors.lock().push(err);
        }
        eviction.dependencies
    }

    async fn cascade(&self, mut pending: VecDeque<(Key, ScopeName)>) {
        while let Some((key, scope)) = pending.pop_front() {
            let Some(cache) = self.scope(&scope) else {
                continue;
            };
            if let CacheRelease::Evicted(eviction) = cache.release(&key).await {
                pending.extend(self.record_eviction(eviction));
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::with_registry(ProviderRegistry::new())
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("settings", &self.settings)
            .field("bindings", &self.registry.read().len())
            .field("scopes", &self.scope_names())
            .finish()
    }
}

#[async_trait]
impl Resolver for Graph {
    async fn resolve_instance(
        &self,
        key: &Key,
        chain: &ScopeChain,
    ) -> GraphResult<Resolved<dyn Any + Send + Sync>> {
        Graph::resolve_instance(self, key, chain).await
    }

    async fn release(&self, key: &Key, scope: &ScopeName) -> GraphResult<ReleaseOutcome> {
        Graph::release(self, key, scope).await
    }

    fn can_resolve(&self, key: &Key) -> bool {
        Graph::can_resolve(self, key)
    }
}
