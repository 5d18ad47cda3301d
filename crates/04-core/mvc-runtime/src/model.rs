//! 模型容器
//!
//! 组件通过 [`StateCell`] 读写它独占的模型，对象图中缓存的也是这个容器

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tether_common::Key;

/// 模型容器
#[derive(Debug, Default)]
pub struct StateCell<M> {
    inner: RwLock<M>,
}

impl<M> StateCell<M> {
    /// 创建模型容器
    pub fn new(model: M) -> Self {
        Self {
            inner: RwLock::new(model),
        }
    }

    /// 读取模型
    pub fn read(&self) -> RwLockReadGuard<'_, M> {
        self.inner.read()
    }

    /// 修改模型
    pub fn write(&self) -> RwLockWriteGuard<'_, M> {
        self.inner.write()
    }

    /// 在写锁内执行修改并返回结果
    pub fn update<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// 整体替换模型，返回旧值
    pub fn replace(&self, model: M) -> M {
        std::mem::replace(&mut *self.inner.write(), model)
    }
}

impl<M: Clone> StateCell<M> {
    /// 复制当前模型
    pub fn snapshot(&self) -> M {
        self.inner.read().clone()
    }
}

impl<M: Serialize> StateCell<M> {
    /// 序列化当前模型
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&*self.inner.read())
    }
}

impl<M: DeserializeOwned> StateCell<M> {
    /// 用保存的值覆盖当前模型
    pub fn restore_from(&self, value: serde_json::Value) -> serde_json::Result<()> {
        let model: M = serde_json::from_value(value)?;
        *self.inner.write() = model;
        Ok(())
    }
}

/// 模型在对象图中的键
pub fn model_key<M: 'static>(qualifier: Option<&str>) -> Key {
    let key = Key::of::<StateCell<M>>();
    match qualifier {
        Some(qualifier) => key.with_qualifier(qualifier),
        None => key,
    }
}
