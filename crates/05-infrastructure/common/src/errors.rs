//! 错误类型定义

use crate::key::Key;
use crate::lifecycle::ScopeName;
use thiserror::Error;

/// 装箱的通用错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 对象图错误类型
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("重复绑定: {key}")]
    DuplicateBinding { key: String },

    #[error("依赖无法解析: {key}, 解析链: {chain}")]
    UnresolvedDependency { key: String, chain: String },

    #[error("检测到循环依赖: {chain}")]
    CyclicDependency { chain: String },

    #[error("作用域缓存已被劫持: {scope}")]
    DoubleHijack { scope: String },

    #[error("劫持令牌不匹配: {scope}")]
    HijackTokenMismatch { scope: String },

    #[error("作用域缓存未被劫持: {scope}")]
    NotHijacked { scope: String },

    #[error("作用域不存在: {scope}")]
    ScopeNotFound { scope: String },

    #[error("组件创建失败: {key}, 原因: {source}")]
    FactoryFailed { key: String, source: BoxError },

    #[error("类型不匹配: {key}, 期望 {expected}")]
    TypeMismatch { key: String, expected: String },

    #[error("解析深度超出限制: {key}, 最大深度 {max_depth}")]
    ResolutionDepthExceeded { key: String, max_depth: usize },
}

impl GraphError {
    /// 创建重复绑定错误
    pub fn duplicate_binding(key: &Key) -> Self {
        Self::DuplicateBinding {
            key: key.to_string(),
        }
    }

    /// 创建依赖无法解析错误
    pub fn unresolved(key: &Key, chain: impl Into<String>) -> Self {
        Self::UnresolvedDependency {
            key: key.to_string(),
            chain: chain.into(),
        }
    }

    /// 创建循环依赖错误
    pub fn cyclic(chain: impl Into<String>) -> Self {
        Self::CyclicDependency {
            chain: chain.into(),
        }
    }

    /// 创建作用域不存在错误
    pub fn scope_not_found(scope: &ScopeName) -> Self {
        Self::ScopeNotFound {
            scope: scope.to_string(),
        }
    }

    /// 是否为注册阶段错误
    pub fn is_registration_error(&self) -> bool {
        matches!(self, Self::DuplicateBinding { .. })
    }
}

/// 销毁钩子执行失败
///
/// 只记录和上报，不会传播给释放调用方
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("销毁钩子执行失败: {key} (作用域 {scope}), 原因: {message}")]
pub struct DisposalError {
    pub key: String,
    pub scope: String,
    pub message: String,
}

impl DisposalError {
    /// 创建销毁错误
    pub fn new(key: &Key, scope: &ScopeName, message: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            scope: scope.to_string(),
            message: message.into(),
        }
    }
}

/// 状态保存错误类型
#[derive(Error, Debug)]
pub enum StateError {
    #[error("状态序列化失败: {key}, 原因: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("状态反序列化失败: {key}, 原因: {source}")]
    Deserialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("作用域 {scope} 有 {failed} 个模型保存失败: {message}")]
    SaveFailed {
        scope: String,
        failed: usize,
        message: String,
    },
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError { source: BoxError },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 运行时错误类型
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("对象图错误: {source}")]
    Graph {
        #[from]
        source: GraphError,
    },

    #[error("状态错误: {source}")]
    State {
        #[from]
        source: StateError,
    },

    #[error("配置错误: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("作用域未处于活跃状态: {scope}")]
    ScopeNotActive { scope: String },

    #[error("运行时启动失败: {message}")]
    BootstrapFailed { message: String },
}

/// 结果类型别名
pub type GraphResult<T> = Result<T, GraphError>;
pub type StateResult<T> = Result<T, StateError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;
