//! 作用域缓存
//!
//! 每个作用域持有一个 [`CacheStore`]：键到带引用计数实例的映射。
//! 同一个键上的获取与释放由该键的异步互斥锁串行化，不同键之间互不阻塞。
//! 缓存可以被劫持，把底层存储临时替换为测试提供的存储。

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tether_common::{DisposalError, GraphError, GraphResult, Instance, Key, ScopeName};
use tether_graph_abstractions::DisposerFn;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info};
use uuid::Uuid;

/// 新创建的实例
pub struct NewInstance {
    /// 实例
    pub value: Instance,
    /// 销毁钩子
    pub disposer: Option<DisposerFn>,
    /// 为该实例获取的依赖及其所在作用域
    pub dependencies: Vec<(Key, ScopeName)>,
}

struct CachedInstance {
    value: Instance,
    disposer: Option<DisposerFn>,
    dependencies: Vec<(Key, ScopeName)>,
    created_seq: u64,
}

enum EntryState {
    Vacant,
    Live {
        cached: CachedInstance,
        ref_count: usize,
    },
}

type Slot = Arc<AsyncMutex<EntryState>>;

/// 获取结果
#[derive(Clone)]
pub struct Acquired {
    /// 实例
    pub value: Instance,
    /// 获取后的引用计数
    pub ref_count: usize,
    /// 本次获取是否创建了实例
    pub created: bool,
}

/// 被移出缓存的实例
#[derive(Debug, Clone)]
pub struct Eviction {
    /// 键
    pub key: Key,
    /// 需要级联释放的依赖
    pub dependencies: Vec<(Key, ScopeName)>,
    /// 销毁钩子失败信息
    pub disposal_error: Option<DisposalError>,
}

/// 缓存释放结果
#[derive(Debug, Clone)]
pub enum CacheRelease {
    /// 未持有该键
    NotHeld,
    /// 仍被持有
    Retained {
        /// 剩余引用计数
        remaining: usize,
    },
    /// 引用计数归零并已移出
    Evicted(Eviction),
}

/// 缓存存储
///
/// 存储本身不知道所属作用域，可以在作用域之间交换。清空后存储关闭，不再接受获取
#[derive(Default)]
pub struct CacheStore {
    entries: Mutex<HashMap<Key, Slot>>,
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl CacheStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个实例，引用计数为 1
    ///
    /// 用于劫持时向作用域注入替身
    #[must_use]
    pub fn with_instance<T>(mut self, key: Key, instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let created_seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let state = EntryState::Live {
            cached: CachedInstance {
                value: instance,
                disposer: None,
                dependencies: Vec::new(),
                created_seq,
            },
            ref_count: 1,
        };
        self.entries
            .get_mut()
            .insert(key, Arc::new(AsyncMutex::new(state)));
        self
    }

    fn slot(&self, key: &Key) -> Option<Slot> {
        let mut entries = self.entries.lock();
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(EntryState::Vacant)))
                .clone(),
        )
    }

    /// 是否已被清空关闭
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_current(&self, key: &Key, slot: &Slot) -> bool {
        self.entries
            .lock()
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current, slot))
    }

    fn remove_if_current(&self, key: &Key, slot: &Slot) {
        let mut entries = self.entries.lock();
        if entries
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current, slot))
        {
            entries.remove(key);
        }
    }

    /// 获取实例
    ///
    /// 已缓存时增加引用计数；否则在持有该键锁的情况下执行 `create`，
    /// 并发获取同一个键只会创建一次。创建失败时不留下条目。
    /// 存储已关闭时返回 [`GraphError::ScopeNotFound`]
    pub async fn acquire<F>(
        &self,
        scope: &ScopeName,
        key: &Key,
        create: F,
    ) -> GraphResult<Acquired>
    where
        F: Future<Output = GraphResult<NewInstance>>,
    {
        let (slot, mut state) = loop {
            let slot = self
                .slot(key)
                .ok_or_else(|| GraphError::scope_not_found(scope))?;
            let state = slot.clone().lock_owned().await;
            let usable = match &*state {
                EntryState::Live { .. } => true,
                // 条目可能在等待锁期间被释放移除
                EntryState::Vacant => self.is_current(key, &slot),
            };
            if usable {
                break (slot, state);
            }
        };

        if let EntryState::Live { cached, ref_count } = &mut *state {
            *ref_count += 1;
            return Ok(Acquired {
                value: cached.value.clone(),
                ref_count: *ref_count,
                created: false,
            });
        }

        match create.await {
            Ok(instance) => {
                let value = instance.value.clone();
                *state = EntryState::Live {
                    cached: CachedInstance {
                        value: instance.value,
                        disposer: instance.disposer,
                        dependencies: instance.dependencies,
                        created_seq: self.sequence.fetch_add(1, Ordering::Relaxed),
                    },
                    ref_count: 1,
                };
                Ok(Acquired {
                    value,
                    ref_count: 1,
                    created: true,
                })
            }
            Err(err) => {
                self.remove_if_current(key, &slot);
                Err(err)
            }
        }
    }

    /// 释放一次引用，归零时移出条目并返回缓存的实例
    async fn release(&self, key: &Key) -> Option<Result<usize, CachedInstance>> {
        let slot = self.entries.lock().get(key).cloned()?;
        // 正在创建的实例会先完成，再参与释放
        let mut state = slot.lock().await;

        match std::mem::replace(&mut *state, EntryState::Vacant) {
            EntryState::Vacant => None,
            EntryState::Live { cached, ref_count } if ref_count > 1 => {
                *state = EntryState::Live {
                    cached,
                    ref_count: ref_count - 1,
                };
                Some(Ok(ref_count - 1))
            }
            EntryState::Live { cached, .. } => {
                self.remove_if_current(key, &slot);
                Some(Err(cached))
            }
        }
    }

    /// 关闭存储并移出全部条目，按创建顺序倒序返回
    async fn drain(&self) -> Vec<(Key, CachedInstance)> {
        let slots: Vec<(Key, Slot)> = {
            let mut entries = self.entries.lock();
            self.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut *entries).into_iter().collect()
        };

        let mut drained = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            let mut state = slot.lock().await;
            if let EntryState::Live { cached, .. } =
                std::mem::replace(&mut *state, EntryState::Vacant)
            {
                drained.push((key, cached));
            }
        }
        drained.sort_by(|a, b| b.1.created_seq.cmp(&a.1.created_seq));
        drained
    }

    /// 指定键的引用计数
    pub async fn ref_count(&self, key: &Key) -> Option<usize> {
        let slot = self.entries.lock().get(key).cloned()?;
        let state = slot.lock().await;
        match &*state {
            EntryState::Live { ref_count, .. } => Some(*ref_count),
            EntryState::Vacant => None,
        }
    }

    /// 当前缓存的实例
    pub async fn get(&self, key: &Key) -> Option<Instance> {
        let slot = self.entries.lock().get(key).cloned()?;
        let state = slot.lock().await;
        match &*state {
            EntryState::Live { cached, .. } => Some(cached.value.clone()),
            EntryState::Vacant => None,
        }
    }

    /// 所有存活条目的键与引用计数，按键排序
    pub async fn snapshot(&self) -> Vec<(Key, usize)> {
        let slots: Vec<(Key, Slot)> = self
            .entries
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();

        let mut live = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            if let EntryState::Live { ref_count, .. } = &*slot.lock().await {
                live.push((key, *ref_count));
            }
        }
        live.sort_by_cached_key(|(key, _)| key.to_string());
        live
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("slots", &self.entries.lock().len())
            .finish()
    }
}

/// 劫持令牌
///
/// 只能用于恢复签发它的作用域
#[derive(Debug, PartialEq, Eq)]
pub struct HijackToken {
    scope: ScopeName,
    id: Uuid,
}

impl HijackToken {
    /// 被劫持的作用域
    pub fn scope(&self) -> &ScopeName {
        &self.scope
    }
}

struct HijackRecord {
    id: Uuid,
    original: Arc<CacheStore>,
}

/// 作用域缓存
pub struct ScopeCache {
    name: ScopeName,
    store: RwLock<Arc<CacheStore>>,
    hijack: Mutex<Option<HijackRecord>>,
}

impl ScopeCache {
    /// 创建作用域缓存
    pub fn new(name: ScopeName) -> Self {
        Self {
            name,
            store: RwLock::new(Arc::new(CacheStore::new())),
            hijack: Mutex::new(None),
        }
    }

    /// 作用域名称
    pub fn name(&self) -> &ScopeName {
        &self.name
    }

    /// 当前生效的存储
    pub fn store(&self) -> Arc<CacheStore> {
        self.store.read().clone()
    }

    /// 获取实例
    ///
    /// 操作在开始时的存储上完成，期间发生的劫持不影响它
    pub async fn acquire<F>(&self, key: &Key, create: F) -> GraphResult<Acquired>
    where
        F: Future<Output = GraphResult<NewInstance>>,
    {
        self.store().acquire(&self.name, key, create).await
    }

    /// 释放一次引用
    ///
    /// 归零时执行销毁钩子，钩子的错误和 panic 都被捕获到 [`Eviction`] 中。
    /// 劫持期间当前存储未持有的键在原存储上释放
    pub async fn release(&self, key: &Key) -> CacheRelease {
        let mut released = self.store().release(key).await;
        if released.is_none() {
            let original = self
                .hijack
                .lock()
                .as_ref()
                .map(|record| record.original.clone());
            if let Some(original) = original {
                released = original.release(key).await;
            }
        }

        match released {
            None => CacheRelease::NotHeld,
            Some(Ok(remaining)) => CacheRelease::Retained { remaining },
            Some(Err(cached)) => CacheRelease::Evicted(self.dispose(key.clone(), cached)),
        }
    }

    /// 清空当前存储，按创建顺序倒序销毁所有实例
    ///
    /// 劫持中的作用域同时清空被替换下来的原存储
    pub async fn drain(&self) -> Vec<Eviction> {
        let original = self.hijack.lock().take().map(|record| record.original);
        let mut drained = self.store().drain().await;
        if let Some(original) = original {
            drained.extend(original.drain().await);
        }
        if !drained.is_empty() {
            info!("清空作用域缓存: {} ({} 个实例)", self.name, drained.len());
        }
        drained
            .into_iter()
            .map(|(key, cached)| self.dispose(key, cached))
            .collect()
    }

    fn dispose(&self, key: Key, cached: CachedInstance) -> Eviction {
        let CachedInstance {
            value,
            disposer,
            dependencies,
            ..
        } = cached;

        let disposal_error = disposer.and_then(|disposer| {
            let message = match catch_unwind(AssertUnwindSafe(|| disposer(&value))) {
                Ok(Ok(())) => return None,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            error!("销毁钩子执行失败: {} (作用域 {}): {}", key, self.name, message);
            Some(DisposalError::new(&key, &self.name, message))
        });

        debug!("移出实例: {} (作用域 {})", key, self.name);
        Eviction {
            key,
            dependencies,
            disposal_error,
        }
    }

    /// 劫持底层存储
    ///
    /// 同一时间只允许一个劫持，重复劫持返回 [`GraphError::DoubleHijack`]
    pub fn hijack(&self, replacement: Arc<CacheStore>) -> GraphResult<HijackToken> {
        let mut hijack = self.hijack.lock();
        if hijack.is_some() {
            return Err(GraphError::DoubleHijack {
                scope: self.name.to_string(),
            });
        }

        let original = std::mem::replace(&mut *self.store.write(), replacement);
        let id = Uuid::new_v4();
        *hijack = Some(HijackRecord { id, original });

        info!("劫持作用域缓存: {}", self.name);
        Ok(HijackToken {
            scope: self.name.clone(),
            id,
        })
    }

    /// 结束劫持，恢复原存储并返回替换用的存储
    pub fn unhijack(&self, token: HijackToken) -> GraphResult<Arc<CacheStore>> {
        let mut hijack = self.hijack.lock();
        let record = match hijack.take() {
            None => {
                return Err(GraphError::NotHijacked {
                    scope: self.name.to_string(),
                })
            }
            Some(record) if token.scope != self.name || token.id != record.id => {
                *hijack = Some(record);
                return Err(GraphError::HijackTokenMismatch {
                    scope: self.name.to_string(),
                });
            }
            Some(record) => record,
        };

        let replacement = std::mem::replace(&mut *self.store.write(), record.original);
        info!("恢复作用域缓存: {}", self.name);
        Ok(replacement)
    }

    /// 是否处于劫持状态
    pub fn is_hijacked(&self) -> bool {
        self.hijack.lock().is_some()
    }

    /// 指定键的引用计数
    pub async fn ref_count(&self, key: &Key) -> Option<usize> {
        self.store().ref_count(key).await
    }

    /// 是否持有指定键
    pub async fn contains(&self, key: &Key) -> bool {
        self.ref_count(key).await.is_some()
    }

    /// 存活实例数量
    pub async fn len(&self) -> usize {
        self.store().snapshot().await.len()
    }

    /// 是否没有存活实例
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 存活实例的键
    pub async fn keys(&self) -> Vec<Key> {
        self.store()
            .snapshot()
            .await
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }
}

impl std::fmt::Debug for ScopeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeCache")
            .field("name", &self.name)
            .field("hijacked", &self.is_hijacked())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic".to_string()
    }
}
