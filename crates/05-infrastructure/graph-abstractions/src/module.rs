//! 模块化注册
//!
//! 声明式的提供者列表，在对象图构建时或之后整体注册

use crate::provider::Provider;

/// 对象图模块 trait
pub trait GraphModule: Send + Sync {
    /// 模块名称
    fn name(&self) -> &str;

    /// 模块提供的所有提供者
    fn providers(&self) -> Vec<Provider>;
}

/// 提供者集合
///
/// 最简单的 [`GraphModule`] 实现，按添加顺序注册
#[derive(Debug, Clone, Default)]
pub struct ProviderSet {
    name: String,
    providers: Vec<Provider>,
}

impl ProviderSet {
    /// 创建新的提供者集合
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
        }
    }

    /// 添加提供者
    #[must_use]
    pub fn with(mut self, provider: impl Into<Provider>) -> Self {
        self.providers.push(provider.into());
        self
    }

    /// 添加提供者
    pub fn add(&mut self, provider: impl Into<Provider>) {
        self.providers.push(provider.into());
    }

    /// 提供者数量
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl GraphModule for ProviderSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn providers(&self) -> Vec<Provider> {
        self.providers.clone()
    }
}
