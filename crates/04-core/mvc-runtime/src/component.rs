//! 控制器与管理器的组件基础
//!
//! 组件从对象图取得它独占的模型，通过公开操作修改模型并发布事件。
//! 组件自己从不构造模型。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tether_common::{ComponentKind, GraphResult, Key};
use tether_graph_abstractions::{Provider, ProviderBuilder, ResolvedDependencies};

use crate::events::{EventChannel, EventSender, PostReport};
use crate::model::{model_key, StateCell};

/// 组件 trait
pub trait Component: Send + Sync + 'static {
    /// 模型类型
    type Model: Serialize + DeserializeOwned + Send + Sync + 'static;
    /// 事件类型
    type Event: Send + Sync + 'static;

    /// 组件角色
    const KIND: ComponentKind;

    /// 模型在对象图中的键
    fn model_key(&self) -> Key;

    /// 模型
    fn model(&self) -> &StateCell<Self::Model>;

    /// 事件通道
    fn events(&self) -> &EventChannel<Self::Event>;

    /// 从保存的状态恢复模型之后调用
    fn on_restored(&self) {}

    /// 引用计数归零、被移出缓存时调用
    fn on_released(&self) {}
}

/// 组件基础实现
///
/// 持有模型、事件通道和释放标记，具体组件通过组合使用
pub struct ComponentBase<M, E> {
    model_key: Key,
    model: Arc<StateCell<M>>,
    events: EventChannel<E>,
    released: AtomicBool,
}

impl<M, E> ComponentBase<M, E>
where
    M: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// 创建组件基础
    pub fn new(sender: EventSender, model_key: Key, model: Arc<StateCell<M>>) -> Self {
        Self {
            model_key,
            model,
            events: EventChannel::new(sender),
            released: AtomicBool::new(false),
        }
    }

    /// 从已解析的依赖中取出模型
    pub fn from_dependencies<C: 'static>(
        dependencies: &ResolvedDependencies,
        model_key: Key,
    ) -> GraphResult<Self> {
        let model = dependencies.get::<StateCell<M>>(&model_key)?;
        Ok(Self::new(EventSender::of::<C>(), model_key, model))
    }

    /// 模型键
    pub fn model_key(&self) -> &Key {
        &self.model_key
    }

    /// 模型
    pub fn model(&self) -> &StateCell<M> {
        &self.model
    }

    /// 共享的模型引用
    pub fn model_handle(&self) -> Arc<StateCell<M>> {
        self.model.clone()
    }

    /// 事件通道
    pub fn events(&self) -> &EventChannel<E> {
        &self.events
    }

    /// 发布事件
    pub fn post(&self, payload: E) -> PostReport {
        self.events.post(payload)
    }

    /// 标记为已释放，只有第一次调用返回 `true`
    pub fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }

    /// 是否已释放
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl<M, E> std::fmt::Debug for ComponentBase<M, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentBase")
            .field("model_key", &self.model_key)
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}

/// 模型提供者，使用 [`Default`] 构造
pub fn model_provider<M>(qualifier: Option<&str>) -> ProviderBuilder<StateCell<M>>
where
    M: Default + Send + Sync + 'static,
{
    let builder = Provider::default_of::<StateCell<M>>();
    match qualifier {
        Some(qualifier) => builder.qualified(qualifier),
        None => builder,
    }
}

/// 组件提供者
///
/// 声明对模型的依赖，工厂收到已经构造好的模型
pub fn component_provider<C, F>(model_key: Key, factory: F) -> ProviderBuilder<C>
where
    C: Component,
    F: Fn(Arc<StateCell<C::Model>>, &ResolvedDependencies) -> GraphResult<C>
        + Send
        + Sync
        + 'static,
{
    let dependency = model_key.clone();
    Provider::of(move |dependencies: &ResolvedDependencies| {
        let model = dependencies.get::<StateCell<C::Model>>(&model_key)?;
        Ok(factory(model, dependencies)?)
    })
    .depends_on(dependency)
}

/// 模型键的简写
pub fn model_key_of<C: Component>(qualifier: Option<&str>) -> Key {
    model_key::<C::Model>(qualifier)
}
