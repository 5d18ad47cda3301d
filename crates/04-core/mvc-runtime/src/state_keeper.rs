//! 状态保存器
//!
//! 在作用域销毁与重建之间暂存模型的序列化副本。每个键最多保留一条记录，
//! 恢复即消费；未被恢复的记录在进程级清理时丢弃。

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tether_common::{Key, StateError, StateResult};
use tracing::{debug, warn};

/// 保存的状态记录
#[derive(Debug, Clone, PartialEq)]
pub struct SavedStateRecord {
    /// 状态键
    pub key: Key,
    /// 状态类型名称
    pub state_type: &'static str,
    /// 序列化后的值
    pub value: serde_json::Value,
    /// 保存时间
    pub saved_at: DateTime<Utc>,
}

/// 状态保存器
#[derive(Debug)]
pub struct StateKeeper {
    records: Mutex<HashMap<Key, SavedStateRecord>>,
    ttl: Option<Duration>,
    warn_on_discard: bool,
}

impl Default for StateKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl StateKeeper {
    /// 创建状态保存器
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl: None,
            warn_on_discard: true,
        }
    }

    /// 设置记录有效期
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// 设置丢弃记录时是否警告
    #[must_use]
    pub fn with_warn_on_discard(mut self, warn_on_discard: bool) -> Self {
        self.warn_on_discard = warn_on_discard;
        self
    }

    /// 保存状态，覆盖同键未恢复的记录
    pub fn save<M>(&self, key: Key, state: &M) -> StateResult<()>
    where
        M: Serialize + ?Sized,
    {
        let value = serde_json::to_value(state).map_err(|source| StateError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.save_value(key, std::any::type_name::<M>(), value);
        Ok(())
    }

    /// 以状态类型为键保存
    pub fn save_as<M>(&self, state: &M) -> StateResult<()>
    where
        M: Serialize + 'static,
    {
        self.save(Key::of::<M>(), state)
    }

    /// 保存已序列化的值
    pub fn save_value(&self, key: Key, state_type: &'static str, value: serde_json::Value) {
        let record = SavedStateRecord {
            key: key.clone(),
            state_type,
            value,
            saved_at: Utc::now(),
        };
        if self.records.lock().insert(key.clone(), record).is_some() {
            debug!("覆盖未恢复的状态: {}", key);
        } else {
            debug!("保存状态: {}", key);
        }
    }

    /// 恢复状态并移除记录，没有记录时返回 `None`
    pub fn restore<M>(&self, key: &Key) -> StateResult<Option<M>>
    where
        M: DeserializeOwned,
    {
        let Some(value) = self.take_value(key) else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StateError::Deserialize {
                key: key.to_string(),
                source,
            })
    }

    /// 以状态类型为键恢复
    pub fn restore_as<M>(&self) -> StateResult<Option<M>>
    where
        M: DeserializeOwned + 'static,
    {
        self.restore(&Key::of::<M>())
    }

    /// 取出已序列化的值，过期记录被丢弃
    pub fn take_value(&self, key: &Key) -> Option<serde_json::Value> {
        let record = self.records.lock().remove(key)?;
        if self.is_expired(&record) {
            self.discard(&record, "记录已过期");
            return None;
        }
        debug!("恢复状态: {}", key);
        Some(record.value)
    }

    /// 是否存在未恢复的记录
    pub fn contains(&self, key: &Key) -> bool {
        self.records.lock().contains_key(key)
    }

    /// 未恢复记录的键，按键排序
    pub fn pending(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.records.lock().keys().cloned().collect();
        keys.sort_by_cached_key(ToString::to_string);
        keys
    }

    /// 未恢复记录数量
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// 是否没有未恢复记录
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// 进程级清理，丢弃所有未恢复的记录并返回数量
    pub fn teardown(&self) -> usize {
        let records: Vec<SavedStateRecord> = self.records.lock().drain().map(|(_, r)| r).collect();
        for record in &records {
            self.discard(record, "进程清理时仍未恢复");
        }
        records.len()
    }

    fn is_expired(&self, record: &SavedStateRecord) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let age = Utc::now().signed_duration_since(record.saved_at);
        age.to_std().map_or(false, |age| age > ttl)
    }

    fn discard(&self, record: &SavedStateRecord, reason: &str) {
        if self.warn_on_discard {
            warn!("丢弃保存的状态: {} ({}), {}", record.key, record.state_type, reason);
        } else {
            debug!("丢弃保存的状态: {} ({}), {}", record.key, record.state_type, reason);
        }
    }
}
