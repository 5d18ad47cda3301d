//! 已解析的依赖集合
//!
//! 工厂执行时通过它按键取得类型化的依赖实例

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tether_common::{GraphError, GraphResult, Instance, Key};

/// 已解析的依赖
#[derive(Clone, Default)]
pub struct ResolvedDependencies {
    entries: HashMap<Key, Instance>,
}

impl fmt::Debug for ResolvedDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl ResolvedDependencies {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个依赖
    pub fn insert(&mut self, key: Key, instance: Instance) {
        self.entries.insert(key, instance);
    }

    /// 按键取得类型化依赖
    pub fn get<T>(&self, key: &Key) -> GraphResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let instance = self
            .entries
            .get(key)
            .ok_or_else(|| GraphError::unresolved(key, "未在提供者中声明该依赖"))?;

        instance
            .clone()
            .downcast::<T>()
            .map_err(|_| GraphError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// 按无限定符的类型键取得依赖
    pub fn get_of<T>(&self) -> GraphResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.get(&Key::of::<T>())
    }

    /// 是否包含指定依赖
    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// 依赖数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
