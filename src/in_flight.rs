use std::{
    pin::pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::sync::Notify;

/// 在途异步任务计数，关闭流程据此等待
///
/// 每个任务对应一个 [`InFlightGuard`]，创建时加一，释放时减一。
/// 任务被丢弃（队列被丢弃、任务 panic）时同样会减一。
#[derive(Clone, Default)]
pub struct InFlight {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在交出任务之前调用
    pub fn track(&self) -> InFlightGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// 计数归零后返回，没有超时
    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.inner.idle.notified());
            // 先注册再检查，避免错过两者之间的归零通知
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[must_use = "guard 被释放时计数立即减一"]
pub struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
