//! 进程级运行时入口
//!
//! 宿主框架的生命周期回调通常拿不到运行时引用，通过这里取得

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::info;

use crate::runtime::MvcRuntime;

static GLOBAL_RUNTIME: Lazy<RwLock<Option<Arc<MvcRuntime>>>> = Lazy::new(|| RwLock::new(None));

/// 安装全局运行时，返回之前安装的运行时
pub fn install_global_runtime(runtime: Arc<MvcRuntime>) -> Option<Arc<MvcRuntime>> {
    let previous = GLOBAL_RUNTIME.write().replace(runtime);
    if previous.is_some() {
        info!("替换全局运行时");
    } else {
        info!("安装全局运行时");
    }
    previous
}

/// 全局运行时
pub fn global_runtime() -> Option<Arc<MvcRuntime>> {
    GLOBAL_RUNTIME.read().clone()
}

/// 移除全局运行时
pub fn clear_global_runtime() -> Option<Arc<MvcRuntime>> {
    GLOBAL_RUNTIME.write().take()
}
