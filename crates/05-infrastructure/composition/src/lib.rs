//! # 运行时组合层
//!
//! 这个 crate 负责把配置、对象图和 MVC 运行时组合成一个可运行的整体。
//!
//! ## 主要功能
//!
//! - **运行时构建器**: 使用构建者模式注册提供者，构建时验证对象图
//! - **配置**: 默认值、TOML/JSON 文件和环境变量分层加载
//! - **日志初始化**: 基于 `tracing-subscriber`，支持 JSON 输出
//! - **生命周期管理**: 进程级清理与全局运行时
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use tether_composition::{LoggingConfig, TetherRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tether = TetherRuntime::builder()
//!         .with_logging(LoggingConfig::development())
//!         .build()?;
//!
//!     let runtime = tether.runtime();
//!     runtime.on_scope_create("screen", None)?;
//!
//!     tether.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod host;
pub mod logging;

pub use builder::RuntimeBuilder;
pub use host::TetherRuntime;
pub use logging::LoggingConfig;

// 重新导出错误类型
pub use tether_common::{RuntimeError, RuntimeResult};
