//! 运行时配置模型

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_common::{ConfigError, ConfigResult, ScopeName};

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 对象图配置
    pub graph: GraphConfig,
    /// 状态保存配置
    pub state_keeper: StateKeeperConfig,
    /// 事件配置
    pub events: EventsConfig,
    /// 日志配置
    pub logging: LogSettings,
}

/// 对象图配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// 根作用域名称
    pub root_scope: ScopeName,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 构建时验证所有绑定
    pub validate_on_build: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            root_scope: ScopeName::root(),
            max_resolution_depth: 256,
            validate_on_build: true,
        }
    }
}

/// 状态保存配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateKeeperConfig {
    /// 记录有效期（秒），过期记录视为不存在
    pub record_ttl_secs: Option<u64>,
    /// 丢弃未恢复的记录时输出警告
    pub warn_on_discard: bool,
}

impl StateKeeperConfig {
    /// 记录有效期
    pub fn record_ttl(&self) -> Option<Duration> {
        self.record_ttl_secs.map(Duration::from_secs)
    }
}

impl Default for StateKeeperConfig {
    fn default() -> Self {
        Self {
            record_ttl_secs: None,
            warn_on_discard: true,
        }
    }
}

/// 事件配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// 没有监听器时记录被丢弃的事件
    pub warn_on_dropped: bool,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// 日志级别
    pub level: String,
    /// JSON 格式输出
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RuntimeConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.graph.root_scope.as_str().trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "graph.root_scope 不能为空".to_string(),
            });
        }
        if self.graph.max_resolution_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "graph.max_resolution_depth 必须大于 0".to_string(),
            });
        }
        if self.state_keeper.record_ttl_secs == Some(0) {
            return Err(ConfigError::ValidationError {
                message: "state_keeper.record_ttl_secs 必须大于 0".to_string(),
            });
        }
        Ok(())
    }
}
