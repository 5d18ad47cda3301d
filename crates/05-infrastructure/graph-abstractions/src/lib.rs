//! # Graph Abstractions
//!
//! 对象图抽象层，定义提供者注册和依赖解析的核心接口。
//!
//! ## 核心接口
//!
//! - [`Provider`] - 键到工厂函数的绑定
//! - [`ResolvedDependencies`] - 工厂执行时可用的依赖
//! - [`Resolver`] / [`ResolverExt`] - 依赖解析与释放
//! - [`CycleDetector`] - 循环依赖检测
//! - [`GraphModule`] - 声明式的模块注册

pub mod dependencies;
pub mod detector;
pub mod module;
pub mod provider;
pub mod resolver;

pub use dependencies::*;
pub use detector::*;
pub use module::*;
pub use provider::*;
pub use resolver::*;
