//! # Tether MVC 运行时
//!
//! 在对象图之上提供控制器与管理器组件、状态保存和类型化事件。
//!
//! ## 主要功能
//!
//! - **组件**: [`Component`] 与 [`ComponentBase`]，组件从对象图取得独占的模型
//! - **状态保存**: [`StateKeeper`] 在作用域为重建而销毁时暂存模型，重建后恢复一次
//! - **事件通道**: [`EventChannel`] 先快照后分发，支持跨分发上下文排队投递
//! - **运行时**: [`MvcRuntime`] 接收宿主的作用域生命周期信号
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_common::{Key, ScopeName};
//! use tether_graph::{Graph, ProviderRegistry};
//! use tether_mvc::{MvcRuntime, StateKeeper};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let graph = Arc::new(Graph::with_registry(ProviderRegistry::new()));
//!     let runtime = MvcRuntime::new(graph, Arc::new(StateKeeper::new()));
//!
//!     let screen = ScopeName::new("screen");
//!     runtime.on_scope_create(screen.clone(), None)?;
//!     runtime.on_scope_will_destroy(&screen, true)?;
//!     runtime.on_scope_destroyed(&screen).await?;
//!
//!     runtime.teardown().await?;
//!     Ok(())
//! }
//! ```

pub mod component;
pub mod dispatch;
pub mod events;
pub mod global;
pub mod model;
pub mod runtime;
pub mod state_keeper;

pub use component::{component_provider, model_key_of, model_provider, Component, ComponentBase};
pub use dispatch::{DispatchContext, DispatchHandle};
pub use events::{
    Event, EventChannel, EventListener, EventSender, ListenerId, PostReport,
};
pub use global::{clear_global_runtime, global_runtime, install_global_runtime};
pub use model::{model_key, StateCell};
pub use runtime::{ComponentLease, MvcRuntime, TeardownReport};
pub use state_keeper::{SavedStateRecord, StateKeeper};
