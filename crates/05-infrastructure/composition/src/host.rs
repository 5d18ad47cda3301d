//! 运行时主入口

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tether_common::RuntimeResult;
use tether_config::RuntimeConfig;
use tether_graph::Graph;
use tether_mvc::{clear_global_runtime, global_runtime, MvcRuntime, StateKeeper, TeardownReport};
use tracing::info;

use crate::builder::RuntimeBuilder;

/// 组装好的运行时
///
/// 持有 MVC 运行时和构建时使用的配置，`shutdown` 完成进程级清理
pub struct TetherRuntime {
    runtime: Arc<MvcRuntime>,
    config: RuntimeConfig,
    global: bool,
    started_at: DateTime<Utc>,
}

impl TetherRuntime {
    /// 创建运行时构建器
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn new(runtime: Arc<MvcRuntime>, config: RuntimeConfig, global: bool) -> Self {
        Self {
            runtime,
            config,
            global,
            started_at: Utc::now(),
        }
    }

    /// MVC 运行时
    pub fn runtime(&self) -> &Arc<MvcRuntime> {
        &self.runtime
    }

    /// 对象图
    pub fn graph(&self) -> &Arc<Graph> {
        self.runtime.graph()
    }

    /// 状态保存器
    pub fn state_keeper(&self) -> &Arc<StateKeeper> {
        self.runtime.state_keeper()
    }

    /// 构建时使用的配置
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// 构建时间
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// 进程级清理
    ///
    /// 销毁所有作用域，丢弃未恢复的状态，并移除自己安装的全局运行时
    pub async fn shutdown(self) -> RuntimeResult<TeardownReport> {
        info!("停止运行时");
        let report = self.runtime.teardown().await?;

        if self.global {
            if let Some(current) = global_runtime() {
                if Arc::ptr_eq(&current, &self.runtime) {
                    clear_global_runtime();
                }
            }
        }

        let uptime = Utc::now().signed_duration_since(self.started_at);
        info!("运行时停止完成，运行 {} 毫秒", uptime.num_milliseconds());
        Ok(report)
    }
}

impl std::fmt::Debug for TetherRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TetherRuntime")
            .field("runtime", &self.runtime)
            .field("global", &self.global)
            .field("started_at", &self.started_at)
            .finish()
    }
}
