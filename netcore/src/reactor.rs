//! 事件循环
//!
//! 显式构造的 tokio 运行时。监听器和会话通过 [`ReactorHandle`] 把异步任务提交到它上面，
//! 不依赖任何进程级全局状态。

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;

/// 事件循环配置
#[derive(Clone, Debug)]
pub struct ReactorConfig {
    /// 工作线程数，1 表示单线程事件循环
    pub worker_threads: usize,
    /// 工作线程名
    pub thread_name: String,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            thread_name: "netcore-reactor".to_string(),
        }
    }
}

/// 事件循环
pub struct Reactor {
    runtime: Runtime,
}

impl Reactor {
    pub fn new(config: ReactorConfig) -> Result<Self> {
        let runtime = if config.worker_threads <= 1 {
            Builder::new_current_thread().enable_all().build()?
        } else {
            Builder::new_multi_thread()
                .worker_threads(config.worker_threads)
                .thread_name(config.thread_name.clone())
                .enable_all()
                .build()?
        };

        debug!(
            "Reactor started with {} worker thread(s)",
            config.worker_threads.max(1)
        );
        Ok(Self { runtime })
    }

    /// 获取可跨线程传递的句柄
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            inner: self.runtime.handle().clone(),
        }
    }

    /// 在事件循环上运行 future 直到完成
    ///
    /// 单线程事件循环只在这里推进 I/O 完成回调。
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// 关闭事件循环，最多等待 `grace` 让后台任务退出
    pub fn shutdown(self, grace: Duration) {
        self.runtime.shutdown_timeout(grace);
        info!("Reactor stopped");
    }
}

/// 事件循环句柄
#[derive(Clone, Debug)]
pub struct ReactorHandle {
    inner: Handle,
}

impl ReactorHandle {
    /// 当前所在运行时的句柄
    ///
    /// # Panics
    /// 在 tokio 运行时之外调用会 panic。
    pub fn current() -> Self {
        Self {
            inner: Handle::current(),
        }
    }

    /// 提交异步任务
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.spawn(future)
    }
}
