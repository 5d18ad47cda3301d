//! # Tether Common
//!
//! 这个 crate 提供了 Tether 运行时各层共享的基础类型。
//!
//! ## 核心类型
//!
//! - [`Key`] - 依赖查找键（类型标签 + 限定符）
//! - [`ScopeName`] / [`ScopeChain`] - 作用域及请求方作用域链
//! - [`Disposable`] - 实例销毁钩子
//! - [`GraphError`] / [`StateError`] / [`RuntimeError`] - 错误分类
//!
//! ## 设计原则
//!
//! - 以类型标签代替运行时反射
//! - 引用计数加销毁钩子管理实例生命周期
//! - 注册期错误启动即失败，解析期错误交给调用方处理

pub mod component;
pub mod errors;
pub mod key;
pub mod lifecycle;

pub use component::*;
pub use errors::*;
pub use key::*;
pub use lifecycle::*;
