//! 分发上下文
//!
//! 一个分发上下文是一个独立的 tokio 任务和它的 FIFO 队列，
//! 注册在上下文上的监听器总是在这个任务里收到事件

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<u64>> = const { Cell::new(None) };
}

/// 分发上下文句柄
///
/// 可以自由克隆，所有克隆指向同一个队列
#[derive(Clone)]
pub struct DispatchHandle {
    id: u64,
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Message>,
}

impl DispatchHandle {
    /// 上下文名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前代码是否正运行在该上下文上
    pub fn is_current(&self) -> bool {
        CURRENT_CONTEXT.with(|current| current.get() == Some(self.id))
    }

    /// 提交任务，上下文已停止时返回 `false`
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.sender.send(Message::Run(Box::new(job))).is_ok()
    }

    /// 等待此前提交的任务全部执行完毕，上下文已停止时返回 `false`
    pub async fn flush(&self) -> bool {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Message::Flush(ack)).is_err() {
            return false;
        }
        done.await.is_ok()
    }

    /// 上下文是否已停止
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// 分发上下文
///
/// 丢弃时停止任务，队列中尚未执行的任务随之丢弃
pub struct DispatchContext {
    handle: DispatchHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchContext {
    /// 在当前 tokio 运行时上启动分发上下文
    pub fn spawn(name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(id, name.clone(), receiver));
        info!("启动分发上下文: {}", name);

        Self {
            handle: DispatchHandle { id, name, sender },
            task: Mutex::new(Some(task)),
        }
    }

    /// 句柄
    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// 上下文名称
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// 等待此前提交的任务全部执行完毕
    pub async fn flush(&self) -> bool {
        self.handle.flush().await
    }

    /// 执行完已提交的任务后停止
    pub async fn shutdown(self) {
        let _ = self.handle.sender.send(Message::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!("分发上下文任务异常结束: {} ({})", self.handle.name, err);
            }
        }
    }
}

impl Drop for DispatchContext {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("handle", &self.handle)
            .finish()
    }
}

async fn run(id: u64, name: Arc<str>, mut receiver: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Run(job) => {
                CURRENT_CONTEXT.with(|current| current.set(Some(id)));
                let result = catch_unwind(AssertUnwindSafe(job));
                CURRENT_CONTEXT.with(|current| current.set(None));
                if result.is_err() {
                    error!("分发任务 panic: {}", name);
                }
            }
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
            Message::Shutdown => break,
        }
    }
    debug!("分发上下文已停止: {}", name);
}
