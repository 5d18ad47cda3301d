//! 提供者注册表
//!
//! 键到提供者的映射，注册冲突在注册时立即失败

use std::collections::HashMap;
use tether_common::{ComponentDescriptor, GraphError, GraphResult, Key, TypeTag};
use tether_graph_abstractions::{GraphModule, Provider};
use tracing::{debug, info};

/// 提供者注册表
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    bindings: HashMap<Key, Provider>,
    implicit: HashMap<TypeTag, Provider>,
}

impl ProviderRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册提供者
    ///
    /// 已存在不可覆盖的同键绑定时返回 [`GraphError::DuplicateBinding`]
    pub fn register(&mut self, provider: impl Into<Provider>) -> GraphResult<()> {
        let provider = provider.into();
        let key = provider.key().clone();

        if let Some(existing) = self.bindings.get(&key) {
            if !existing.is_overridable() {
                return Err(GraphError::duplicate_binding(&key));
            }
            info!("覆盖绑定: {} ({} -> {})", key, existing.type_name(), provider.type_name());
        } else {
            debug!("注册绑定: {} ({})", key, provider.type_name());
        }

        self.bindings.insert(key, provider);
        Ok(())
    }

    /// 注册模块中的所有提供者，返回注册数量
    pub fn register_module(&mut self, module: &dyn GraphModule) -> GraphResult<usize> {
        let providers = module.providers();
        let count = providers.len();
        for provider in providers {
            self.register(provider)?;
        }
        info!("注册模块: {} ({} 个提供者)", module.name(), count);
        Ok(count)
    }

    /// 允许类型 `T` 的隐式默认提供者
    ///
    /// 对 `T` 的任意限定符生效，显式绑定始终优先
    pub fn allow_implicit<T>(&mut self)
    where
        T: Default + Send + Sync + 'static,
    {
        let provider = Provider::default_of::<T>().build();
        debug!("允许隐式默认: {}", provider.key());
        self.implicit.insert(TypeTag::of::<T>(), provider);
    }

    /// 查找提供者
    pub fn lookup(&self, key: &Key) -> Option<Provider> {
        if let Some(provider) = self.bindings.get(key) {
            return Some(provider.clone());
        }
        self.implicit
            .get(&key.type_tag())
            .map(|provider| provider.rekeyed(key.clone()))
    }

    /// 解析工厂
    pub fn resolve_factory(&self, key: &Key) -> GraphResult<Provider> {
        self.lookup(key)
            .ok_or_else(|| GraphError::unresolved(key, key.to_string()))
    }

    /// 是否存在可用的提供者
    pub fn contains(&self, key: &Key) -> bool {
        self.bindings.contains_key(key) || self.implicit.contains_key(&key.type_tag())
    }

    /// 声明的依赖
    pub fn dependencies_of(&self, key: &Key) -> Vec<Key> {
        self.bindings
            .get(key)
            .map(|provider| provider.dependencies().to_vec())
            .unwrap_or_default()
    }

    /// 显式绑定的提供者，按键排序
    pub fn providers(&self) -> Vec<&Provider> {
        let mut providers: Vec<&Provider> = self.bindings.values().collect();
        providers.sort_by_cached_key(|provider| provider.key().to_string());
        providers
    }

    /// 所有显式绑定的描述符
    pub fn descriptors(&self) -> Vec<ComponentDescriptor> {
        self.providers()
            .into_iter()
            .map(Provider::descriptor)
            .collect()
    }

    /// 显式绑定数量
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// 是否没有显式绑定
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
