//! # 对象图实现
//!
//! 提供注册表、作用域缓存和对象图的具体实现
//!
//! - [`ProviderRegistry`] - 键到提供者的绑定，注册冲突立即失败
//! - [`ScopeCache`] / [`CacheStore`] - 带引用计数的作用域缓存，支持劫持
//! - [`Graph`] - 解析、缓存、级联释放以及循环依赖检测

pub mod cache;
pub mod graph;
pub mod registry;

pub use cache::{Acquired, CacheRelease, CacheStore, Eviction, HijackToken, NewInstance, ScopeCache};
pub use graph::{Graph, GraphSettings, GraphStats};
pub use registry::ProviderRegistry;

pub use tether_graph_abstractions::{
    GraphModule, Provider, ProviderBuilder, ProviderSet, ReleaseOutcome, Resolved,
    ResolvedDependencies, Resolver, ResolverExt,
};
