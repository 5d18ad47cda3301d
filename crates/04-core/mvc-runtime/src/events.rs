//! 事件通道
//!
//! 组件向它的视图发布类型化事件。`post` 先对监听器列表做快照再逐个分发，
//! 分发期间注册或注销监听器不影响本次投递。

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tether_common::TypeTag;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatch::{DispatchContext, DispatchHandle};

/// 事件发送方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventSender {
    component: TypeTag,
    instance: Uuid,
}

impl EventSender {
    /// 为组件类型的一个新实例创建发送方
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            component: TypeTag::of::<C>(),
            instance: Uuid::new_v4(),
        }
    }

    /// 组件类型
    pub fn component(&self) -> TypeTag {
        self.component
    }

    /// 实例标识
    pub fn instance_id(&self) -> Uuid {
        self.instance
    }
}

impl fmt::Display for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.component, self.instance.simple())
    }
}

/// 事件
#[derive(Debug, Clone)]
pub struct Event<E> {
    sender: EventSender,
    payload: E,
    posted_at: DateTime<Utc>,
}

impl<E> Event<E> {
    /// 创建事件
    pub fn new(sender: EventSender, payload: E) -> Self {
        Self {
            sender,
            payload,
            posted_at: Utc::now(),
        }
    }

    /// 发送方
    pub fn sender(&self) -> &EventSender {
        &self.sender
    }

    /// 事件内容
    pub fn payload(&self) -> &E {
        &self.payload
    }

    /// 发布时间
    pub fn posted_at(&self) -> DateTime<Utc> {
        self.posted_at
    }
}

/// 事件监听器
pub trait EventListener<E>: Send + Sync + 'static {
    /// 收到事件
    fn on_event(&self, event: &Event<E>);
}

impl<E, F> EventListener<E> for F
where
    F: Fn(&Event<E>) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<E>) {
        self(event);
    }
}

/// 监听器标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// 发布结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostReport {
    /// 同步投递的监听器数
    pub delivered: usize,
    /// 排入分发上下文的监听器数
    pub queued: usize,
    /// 分发上下文已停止而未能投递的监听器数
    pub undeliverable: usize,
}

impl PostReport {
    /// 是否没有任何监听器收到事件
    pub fn is_dropped(&self) -> bool {
        self.delivered == 0 && self.queued == 0
    }
}

struct Registration<E> {
    id: ListenerId,
    listener: Arc<dyn EventListener<E>>,
    context: Option<DispatchHandle>,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: self.listener.clone(),
            context: self.context.clone(),
        }
    }
}

/// 事件通道
///
/// 属于一个组件实例，按注册顺序投递
pub struct EventChannel<E> {
    sender: EventSender,
    listeners: RwLock<Vec<Registration<E>>>,
    next_id: AtomicU64,
    warn_on_dropped: AtomicBool,
}

impl<E> EventChannel<E>
where
    E: Send + Sync + 'static,
{
    /// 创建事件通道
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender,
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            warn_on_dropped: AtomicBool::new(false),
        }
    }

    /// 发送方
    pub fn sender(&self) -> &EventSender {
        &self.sender
    }

    /// 设置没有监听器时是否警告被丢弃的事件
    pub fn set_warn_on_dropped(&self, enabled: bool) {
        self.warn_on_dropped.store(enabled, Ordering::Relaxed);
    }

    /// 没有监听器时是否警告
    pub fn warns_on_dropped(&self) -> bool {
        self.warn_on_dropped.load(Ordering::Relaxed)
    }

    /// 注册在发布方上下文同步执行的监听器
    pub fn register(&self, listener: impl EventListener<E>) -> ListenerId {
        self.insert(Arc::new(listener), None)
    }

    /// 注册在指定分发上下文上执行的监听器
    pub fn register_on(
        &self,
        listener: impl EventListener<E>,
        context: &DispatchContext,
    ) -> ListenerId {
        self.insert(Arc::new(listener), Some(context.handle()))
    }

    /// 使用句柄注册在分发上下文上执行的监听器
    pub fn register_on_handle(
        &self,
        listener: impl EventListener<E>,
        handle: DispatchHandle,
    ) -> ListenerId {
        self.insert(Arc::new(listener), Some(handle))
    }

    fn insert(
        &self,
        listener: Arc<dyn EventListener<E>>,
        context: Option<DispatchHandle>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Registration {
            id,
            listener,
            context,
        });
        debug!("注册事件监听器: {} ({:?})", self.sender, id);
        id
    }

    /// 注销监听器，未注册时返回 `false`
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|registration| registration.id != id);
        before != listeners.len()
    }

    /// 监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// 发布事件
    ///
    /// 同步监听器在本次调用内按注册顺序收到事件；分发上下文上的监听器总是排队，
    /// 即使发布方已运行在该上下文上，先前排队的事件也不会被超越
    pub fn post(&self, payload: E) -> PostReport {
        let snapshot: Vec<Registration<E>> = self.listeners.read().clone();
        let mut report = PostReport::default();

        if snapshot.is_empty() {
            if self.warn_on_dropped.load(Ordering::Relaxed) {
                warn!("事件没有监听器，已丢弃: {}", self.sender);
            }
            return report;
        }

        let event = Arc::new(Event::new(self.sender, payload));
        for registration in snapshot {
            match registration.context {
                Some(handle) => {
                    let event = event.clone();
                    let listener = registration.listener;
                    if handle.submit(move || listener.on_event(&event)) {
                        report.queued += 1;
                    } else {
                        warn!(
                            "分发上下文已停止，事件无法投递: {} -> {}",
                            self.sender,
                            handle.name()
                        );
                        report.undeliverable += 1;
                    }
                }
                None => {
                    registration.listener.on_event(&event);
                    report.delivered += 1;
                }
            }
        }
        report
    }
}

impl<E> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("sender", &self.sender)
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
