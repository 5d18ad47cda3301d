//! # Configuration Implementation
//!
//! 运行时配置模型与分层加载。
//!
//! ## 主要组件
//!
//! - [`RuntimeConfig`] - 对象图、状态保存、事件和日志配置
//! - [`RuntimeConfigLoader`] - 默认值、配置文件和环境变量的分层加载

pub mod loader;
pub mod settings;

pub use loader::*;
pub use settings::*;
