//! MVC 运行时
//!
//! 接收外部驱动的作用域生命周期信号，按作用域解析组件，
//! 在为重建而销毁作用域前保存模型，在重建后解析组件时恢复模型

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tether_common::{
    GraphResult, Key, RuntimeError, RuntimeResult, ScopeChain, ScopeName, ScopeState, StateError,
    StateResult,
};
use tether_graph::{Graph, ReleaseOutcome};
use tracing::{debug, info, warn};

use crate::component::Component;
use crate::state_keeper::StateKeeper;

/// 运行时持有的组件，类型擦除
#[async_trait]
trait HeldComponent: Send + Sync {
    fn key(&self) -> &Key;

    fn is_released(&self) -> bool;

    fn save_state(&self, keeper: &StateKeeper) -> StateResult<()>;

    async fn release(&self) -> GraphResult<ReleaseOutcome>;
}

struct LeaseInner<C> {
    component: Arc<C>,
    key: Key,
    scope: ScopeName,
    graph: Arc<Graph>,
    released: AtomicBool,
}

#[async_trait]
impl<C: Component> HeldComponent for LeaseInner<C> {
    fn key(&self) -> &Key {
        &self.key
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn save_state(&self, keeper: &StateKeeper) -> StateResult<()> {
        let model = self.component.model().read();
        keeper.save(self.component.model_key(), &*model)
    }

    async fn release(&self) -> GraphResult<ReleaseOutcome> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(ReleaseOutcome::NotHeld);
        }
        let outcome = self.graph.release(&self.key, &self.scope).await?;
        if outcome == ReleaseOutcome::Disposed {
            self.component.on_released();
        }
        Ok(outcome)
    }
}

/// 组件租约
///
/// 代表对象图中的一次获取，释放是幂等的
pub struct ComponentLease<C: Component> {
    inner: Arc<LeaseInner<C>>,
}

impl<C: Component> ComponentLease<C> {
    /// 组件
    pub fn component(&self) -> &Arc<C> {
        &self.inner.component
    }

    /// 组件键
    pub fn key(&self) -> &Key {
        &self.inner.key
    }

    /// 组件所在作用域
    pub fn scope(&self) -> &ScopeName {
        &self.inner.scope
    }

    /// 是否已释放
    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    /// 释放组件，重复释放为空操作
    pub async fn release(&self) -> RuntimeResult<ReleaseOutcome> {
        Ok(self.inner.release().await?)
    }
}

impl<C: Component> Deref for ComponentLease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner.component
    }
}

impl<C: Component> std::fmt::Debug for ComponentLease<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentLease")
            .field("key", &self.inner.key)
            .field("scope", &self.inner.scope)
            .field("released", &self.inner.is_released())
            .finish()
    }
}

struct ScopeRecord {
    chain: ScopeChain,
    state: ScopeState,
    holdings: Vec<Arc<dyn HeldComponent>>,
}

/// 清理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// 销毁的作用域数
    pub scopes_destroyed: usize,
    /// 丢弃的未恢复状态数
    pub states_discarded: usize,
}

/// MVC 运行时
pub struct MvcRuntime {
    graph: Arc<Graph>,
    state_keeper: Arc<StateKeeper>,
    scopes: DashMap<ScopeName, ScopeRecord>,
    warn_on_dropped: bool,
}

impl MvcRuntime {
    /// 创建运行时，根作用域立即处于活跃状态
    pub fn new(graph: Arc<Graph>, state_keeper: Arc<StateKeeper>) -> Self {
        let root = graph.root_scope().clone();
        let scopes = DashMap::new();
        scopes.insert(
            root.clone(),
            ScopeRecord {
                chain: ScopeChain::single(root),
                state: ScopeState::Active,
                holdings: Vec::new(),
            },
        );
        Self {
            graph,
            state_keeper,
            scopes,
            warn_on_dropped: false,
        }
    }

    /// 新建组件的事件通道在没有监听器时是否警告
    #[must_use]
    pub fn with_warn_on_dropped(mut self, enabled: bool) -> Self {
        self.warn_on_dropped = enabled;
        self
    }

    /// 对象图
    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// 状态保存器
    pub fn state_keeper(&self) -> &Arc<StateKeeper> {
        &self.state_keeper
    }

    /// 作用域状态
    pub fn scope_state(&self, name: &ScopeName) -> Option<ScopeState> {
        self.scopes.get(name).map(|record| record.state)
    }

    /// 作用域链
    pub fn scope_chain(&self, name: &ScopeName) -> Option<ScopeChain> {
        self.scopes.get(name).map(|record| record.chain.clone())
    }

    /// 作用域创建信号
    ///
    /// 未指定父作用域时挂在根作用域下；作用域已活跃时直接返回它的链
    pub fn on_scope_create(
        &self,
        name: impl Into<ScopeName>,
        parent: Option<&ScopeName>,
    ) -> RuntimeResult<ScopeChain> {
        let name = name.into();
        if let Some(record) = self.scopes.get(&name) {
            if record.state == ScopeState::Active {
                return Ok(record.chain.clone());
            }
            return Err(not_active(&name));
        }

        let parent = parent.unwrap_or_else(|| self.graph.root_scope());
        let parent_chain = match self.scopes.get(parent) {
            Some(record) if record.state == ScopeState::Active => record.chain.clone(),
            _ => return Err(not_active(parent)),
        };

        let chain = parent_chain.child(name.clone());
        self.graph.create_scope(name.clone());
        self.scopes.insert(
            name.clone(),
            ScopeRecord {
                chain: chain.clone(),
                state: ScopeState::Active,
                holdings: Vec::new(),
            },
        );
        info!("作用域已创建: {} {}", name, chain);
        Ok(chain)
    }

    /// 作用域即将销毁信号
    ///
    /// 为重建而销毁时保存作用域内所有组件的模型，返回保存数量。
    /// 个别模型保存失败不影响其余模型，失败在全部保存之后汇总返回
    pub fn on_scope_will_destroy(
        &self,
        name: &ScopeName,
        for_recreation: bool,
    ) -> RuntimeResult<usize> {
        let holdings = {
            let mut record = self.scopes.get_mut(name).ok_or_else(|| not_active(name))?;
            if record.state == ScopeState::Destroyed {
                return Err(not_active(name));
            }
            record.state = ScopeState::WillDestroy { for_recreation };
            record.holdings.clone()
        };

        if !for_recreation {
            debug!("作用域即将销毁: {}", name);
            return Ok(0);
        }

        let mut saved = 0;
        let mut failures = Vec::new();
        for holding in holdings.iter().filter(|holding| !holding.is_released()) {
            match holding.save_state(&self.state_keeper) {
                Ok(()) => saved += 1,
                Err(err) => {
                    warn!("保存模型失败: {} (作用域 {}): {}", holding.key(), name, err);
                    failures.push(err);
                }
            }
        }
        info!("作用域即将为重建而销毁: {} (保存 {} 个模型)", name, saved);

        if failures.len() == 1 {
            if let Some(err) = failures.pop() {
                return Err(err.into());
            }
        }
        if !failures.is_empty() {
            let messages: Vec<String> = failures.iter().map(StateError::to_string).collect();
            return Err(StateError::SaveFailed {
                scope: name.to_string(),
                failed: failures.len(),
                message: messages.join("; "),
            }
            .into());
        }
        Ok(saved)
    }

    /// 作用域已销毁信号
    ///
    /// 释放作用域内的组件并销毁对应的缓存，返回被销毁的实例数
    pub async fn on_scope_destroyed(&self, name: &ScopeName) -> RuntimeResult<usize> {
        let (_, record) = self.scopes.remove(name).ok_or_else(|| not_active(name))?;

        for holding in &record.holdings {
            if let Err(err) = holding.release().await {
                warn!("释放组件失败: {} (作用域 {}): {}", holding.key(), name, err);
            }
        }

        let disposed = match self.graph.destroy_scope(name).await {
            Ok(count) => count,
            Err(err) => {
                debug!("对象图中作用域已不存在: {} ({})", name, err);
                0
            }
        };
        info!("作用域已销毁: {}", name);
        Ok(disposed)
    }

    /// 在作用域内解析组件
    ///
    /// 组件是新构造的且存在保存的模型时，覆盖新模型并调用 [`Component::on_restored`]
    pub async fn resolve<C: Component>(
        &self,
        scope: &ScopeName,
        key: &Key,
    ) -> RuntimeResult<ComponentLease<C>> {
        let chain = match self.scopes.get(scope) {
            Some(record) if record.state == ScopeState::Active => record.chain.clone(),
            _ => return Err(not_active(scope)),
        };

        let resolved = self.graph.resolve::<C>(key, &chain).await?;
        let inner = Arc::new(LeaseInner {
            component: resolved.value,
            key: key.clone(),
            scope: resolved.scope,
            graph: self.graph.clone(),
            released: AtomicBool::new(false),
        });

        // 只有刚构造的组件才接收保存的状态，已存活的实例只增加引用计数
        if resolved.created {
            inner.component.events().set_warn_on_dropped(self.warn_on_dropped);
            if let Err(err) = self.restore(inner.component.as_ref()) {
                inner.release().await?;
                return Err(err.into());
            }
        }

        let holder = if self.scopes.contains_key(&inner.scope) {
            inner.scope.clone()
        } else {
            scope.clone()
        };
        if let Some(mut record) = self.scopes.get_mut(&holder) {
            record.holdings.retain(|holding| !holding.is_released());
            record.holdings.push(inner.clone());
        }

        debug!("解析组件: {} ({}, 作用域 {})", key, C::KIND, inner.scope);
        Ok(ComponentLease { inner })
    }

    fn restore<C: Component>(&self, component: &C) -> StateResult<()> {
        let model_key = component.model_key();
        let Some(value) = self.state_keeper.take_value(&model_key) else {
            return Ok(());
        };
        component
            .model()
            .restore_from(value)
            .map_err(|source| StateError::Deserialize {
                key: model_key.to_string(),
                source,
            })?;
        info!("模型已恢复: {}", model_key);
        component.on_restored();
        Ok(())
    }

    /// 进程级清理
    ///
    /// 由内到外销毁所有作用域，丢弃未恢复的状态
    pub async fn teardown(&self) -> RuntimeResult<TeardownReport> {
        let mut names: Vec<(usize, ScopeName)> = self
            .scopes
            .iter()
            .map(|record| (record.chain.len(), record.key().clone()))
            .collect();
        names.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut report = TeardownReport::default();
        for (_, name) in names {
            self.on_scope_destroyed(&name).await?;
            report.scopes_destroyed += 1;
        }
        report.states_discarded = self.state_keeper.teardown();

        let disposal_errors = self.graph.take_disposal_errors();
        if !disposal_errors.is_empty() {
            warn!("清理期间有 {} 个销毁钩子失败", disposal_errors.len());
        }
        info!(
            "运行时已清理: {} 个作用域, 丢弃 {} 个状态",
            report.scopes_destroyed, report.states_discarded
        );
        Ok(report)
    }
}

impl std::fmt::Debug for MvcRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut scopes: Vec<ScopeName> = self.scopes.iter().map(|r| r.key().clone()).collect();
        scopes.sort();
        f.debug_struct("MvcRuntime")
            .field("scopes", &scopes)
            .field("pending_states", &self.state_keeper.len())
            .finish()
    }
}

fn not_active(scope: &ScopeName) -> RuntimeError {
    RuntimeError::ScopeNotActive {
        scope: scope.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{component_provider, model_provider, ComponentBase};
    use crate::events::EventSender;
    use crate::model::{model_key, StateCell};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicUsize;
    use tether_common::ComponentKind;
    use tether_graph::ProviderRegistry;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct CounterModel {
        value: u32,
    }

    struct CounterController {
        base: ComponentBase<CounterModel, u32>,
        restored: AtomicUsize,
        released: Arc<AtomicUsize>,
    }

    impl CounterController {
        fn increment(&self) {
            let value = self.base.model().update(|model| {
                model.value += 1;
                model.value
            });
            self.base.post(value);
        }
    }

    impl Component for CounterController {
        type Model = CounterModel;
        type Event = u32;
        const KIND: ComponentKind = ComponentKind::Controller;

        fn model_key(&self) -> Key {
            self.base.model_key().clone()
        }

        fn model(&self) -> &StateCell<CounterModel> {
            self.base.model()
        }

        fn events(&self) -> &crate::events::EventChannel<u32> {
            self.base.events()
        }

        fn on_restored(&self) {
            self.restored.fetch_add(1, Ordering::SeqCst);
        }

        fn on_released(&self) {
            self.base.mark_released();
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug, Default, Deserialize)]
    struct BrokenModel;

    impl Serialize for BrokenModel {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("不可序列化"))
        }
    }

    struct BrokenController {
        base: ComponentBase<BrokenModel, ()>,
    }

    impl Component for BrokenController {
        type Model = BrokenModel;
        type Event = ();
        const KIND: ComponentKind = ComponentKind::Controller;

        fn model_key(&self) -> Key {
            self.base.model_key().clone()
        }

        fn model(&self) -> &StateCell<BrokenModel> {
            self.base.model()
        }

        fn events(&self) -> &crate::events::EventChannel<()> {
            self.base.events()
        }
    }

    fn runtime(released: Arc<AtomicUsize>) -> MvcRuntime {
        let mut registry = ProviderRegistry::new();
        registry.register(model_provider::<CounterModel>(None)).unwrap();
        registry.register(model_provider::<BrokenModel>(None)).unwrap();
        registry
            .register(component_provider::<BrokenController, _>(
                model_key::<BrokenModel>(None),
                |model, _| {
                    Ok(BrokenController {
                        base: ComponentBase::new(
                            EventSender::of::<BrokenController>(),
                            model_key::<BrokenModel>(None),
                            model,
                        ),
                    })
                },
            ))
            .unwrap();
        registry
            .register(component_provider::<CounterController, _>(
                model_key::<CounterModel>(None),
                move |model, _| {
                    Ok(CounterController {
                        base: ComponentBase::new(
                            EventSender::of::<CounterController>(),
                            model_key::<CounterModel>(None),
                            model,
                        ),
                        restored: AtomicUsize::new(0),
                        released: released.clone(),
                    })
                },
            ))
            .unwrap();
        MvcRuntime::new(
            Arc::new(Graph::with_registry(registry)),
            Arc::new(StateKeeper::new()),
        )
    }

    fn controller_key() -> Key {
        Key::of::<CounterController>()
    }

    #[tokio::test]
    async fn test_state_survives_recreation() {
        let runtime = runtime(Arc::new(AtomicUsize::new(0)));
        let screen = ScopeName::new("screen");
        runtime.on_scope_create(screen.clone(), None).unwrap();

        let before = runtime
            .resolve::<CounterController>(&screen, &controller_key())
            .await
            .unwrap();
        before.increment();
        before.increment();

        assert_eq!(runtime.on_scope_will_destroy(&screen, true).unwrap(), 1);
        runtime.on_scope_destroyed(&screen).await.unwrap();
        assert!(before.is_released());

        runtime.on_scope_create(screen.clone(), None).unwrap();
        let after = runtime
            .resolve::<CounterController>(&screen, &controller_key())
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(before.component(), after.component()));
        assert_eq!(after.model().read().value, 2);
        assert_eq!(after.restored.load(Ordering::SeqCst), 1);
        assert!(runtime.state_keeper().is_empty());
    }

    #[tokio::test]
    async fn test_saved_state_goes_to_recreated_scope_not_live_sibling() {
        let runtime = runtime(Arc::new(AtomicUsize::new(0)));
        let first = ScopeName::new("first");
        let second = ScopeName::new("second");
        runtime.on_scope_create(first.clone(), None).unwrap();
        runtime.on_scope_create(second.clone(), None).unwrap();

        let in_first = runtime
            .resolve::<CounterController>(&first, &controller_key())
            .await
            .unwrap();
        in_first.increment();
        in_first.increment();
        let in_second = runtime
            .resolve::<CounterController>(&second, &controller_key())
            .await
            .unwrap();
        in_second.increment();

        assert_eq!(runtime.on_scope_will_destroy(&first, true).unwrap(), 1);
        let again = runtime
            .resolve::<CounterController>(&second, &controller_key())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(in_second.component(), again.component()));
        assert_eq!(again.model().read().value, 1);
        assert_eq!(again.restored.load(Ordering::SeqCst), 0);
        assert!(runtime.state_keeper().contains(&model_key::<CounterModel>(None)));

        runtime.on_scope_destroyed(&first).await.unwrap();
        runtime.on_scope_create(first.clone(), None).unwrap();
        let recreated = runtime
            .resolve::<CounterController>(&first, &controller_key())
            .await
            .unwrap();
        assert_eq!(recreated.model().read().value, 2);
        assert_eq!(recreated.restored.load(Ordering::SeqCst), 1);
        assert!(runtime.state_keeper().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_does_not_skip_other_models() {
        let runtime = runtime(Arc::new(AtomicUsize::new(0)));
        let screen = ScopeName::new("screen");
        runtime.on_scope_create(screen.clone(), None).unwrap();

        runtime
            .resolve::<BrokenController>(&screen, &Key::of::<BrokenController>())
            .await
            .unwrap();
        let counter = runtime
            .resolve::<CounterController>(&screen, &controller_key())
            .await
            .unwrap();
        counter.increment();

        let err = runtime.on_scope_will_destroy(&screen, true).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::State {
                source: StateError::Serialize { .. }
            }
        ));
        assert!(runtime.state_keeper().contains(&model_key::<CounterModel>(None)));
        assert!(!runtime.state_keeper().contains(&model_key::<BrokenModel>(None)));
        assert_eq!(
            runtime.scope_state(&screen),
            Some(ScopeState::WillDestroy {
                for_recreation: true
            })
        );
    }

    #[tokio::test]
    async fn test_warn_on_dropped_applies_to_own_runtime_only() {
        let loud = runtime(Arc::new(AtomicUsize::new(0))).with_warn_on_dropped(true);
        let quiet = runtime(Arc::new(AtomicUsize::new(0)));
        let root = ScopeName::root();

        let from_loud = loud
            .resolve::<CounterController>(&root, &controller_key())
            .await
            .unwrap();
        let from_quiet = quiet
            .resolve::<CounterController>(&root, &controller_key())
            .await
            .unwrap();
        assert!(from_loud.events().warns_on_dropped());
        assert!(!from_quiet.events().warns_on_dropped());
    }

    #[tokio::test]
    async fn test_destroy_without_recreation_drops_state() {
        let runtime = runtime(Arc::new(AtomicUsize::new(0)));
        let screen = ScopeName::new("screen");
        runtime.on_scope_create(screen.clone(), None).unwrap();

        let lease = runtime
            .resolve::<CounterController>(&screen, &controller_key())
            .await
            .unwrap();
        lease.increment();

        assert_eq!(runtime.on_scope_will_destroy(&screen, false).unwrap(), 0);
        runtime.on_scope_destroyed(&screen).await.unwrap();

        runtime.on_scope_create(screen.clone(), None).unwrap();
        let fresh = runtime
            .resolve::<CounterController>(&screen, &controller_key())
            .await
            .unwrap();
        assert_eq!(fresh.model().read().value, 0);
    }

    #[tokio::test]
    async fn test_lease_release_is_idempotent() {
        let released = Arc::new(AtomicUsize::new(0));
        let runtime = runtime(released.clone());
        let root = ScopeName::root();

        let lease = runtime
            .resolve::<CounterController>(&root, &controller_key())
            .await
            .unwrap();
        assert_eq!(lease.release().await.unwrap(), ReleaseOutcome::Disposed);
        assert_eq!(lease.release().await.unwrap(), ReleaseOutcome::NotHeld);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(lease.base.is_released());
    }

    #[tokio::test]
    async fn test_resolve_in_unknown_scope_fails() {
        let runtime = runtime(Arc::new(AtomicUsize::new(0)));
        let err = runtime
            .resolve::<CounterController>(&ScopeName::new("missing"), &controller_key())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ScopeNotActive { .. }));
    }

    #[tokio::test]
    async fn test_teardown_discards_unconsumed_state() {
        let runtime = runtime(Arc::new(AtomicUsize::new(0)));
        let screen = ScopeName::new("screen");
        runtime.on_scope_create(screen.clone(), None).unwrap();
        let lease = runtime
            .resolve::<CounterController>(&screen, &controller_key())
            .await
            .unwrap();
        lease.increment();
        runtime.on_scope_will_destroy(&screen, true).unwrap();

        let report = runtime.teardown().await.unwrap();
        assert_eq!(report.scopes_destroyed, 2);
        assert_eq!(report.states_discarded, 1);
        assert!(runtime.scope_state(&ScopeName::root()).is_none());
    }
}
