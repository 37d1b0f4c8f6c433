//! 有界工作池
//!
//! 解析与处理统一在独立的 tokio 运行时上执行，与接入线程隔离。
//! 用信号量限制在途任务数：非阻塞提交在池满时立即拒绝，
//! 异步提交只挂起调用方；关停时收回全部许可即代表在途任务已排空。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

/// 提交失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// 在途任务已达上限
    Saturated,
    /// 工作池已关闭
    Closed,
}

/// 排空结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained,
    /// 宽限期结束时仍未完成、被放弃的任务数
    Abandoned(usize),
}

impl DrainOutcome {
    pub fn is_drained(self) -> bool {
        self == Self::Drained
    }
}

/// 有界工作池
#[derive(Clone)]
pub struct WorkerPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// 在指定运行时上创建工作池，`capacity` 为在途任务上限（至少为 1）
    pub fn new(handle: Handle, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// 使用当前运行时创建（必须在 tokio 上下文中调用）
    pub fn current(capacity: usize) -> Self {
        Self::new(Handle::current(), capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前在途任务数
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.permits.available_permits())
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// 非阻塞提交
    pub fn try_spawn<F>(&self, task: F) -> Result<JoinHandle<F::Output>, SubmitError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Err(SubmitError::Saturated),
            Err(TryAcquireError::Closed) => return Err(SubmitError::Closed),
        };
        Ok(self.spawn_with_permit(permit, task))
    }

    /// 等待许可后提交，只挂起调用方
    pub async fn spawn<F>(&self, task: F) -> Result<JoinHandle<F::Output>, SubmitError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SubmitError::Closed)?;
        Ok(self.spawn_with_permit(permit, task))
    }

    fn spawn_with_permit<F>(&self, permit: OwnedSemaphorePermit, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(async move {
            let output = task.await;
            drop(permit);
            output
        })
    }

    /// 停止接收新任务并等待在途任务完成
    ///
    /// 超时后剩余任务被放弃，其数量在关闭信号量之前统计。
    pub async fn drain(&self, grace: Duration) -> DrainOutcome {
        let capacity = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        let drained = tokio::time::timeout(grace, self.permits.acquire_many(capacity)).await;
        // 超时时 acquire 已被丢弃，部分获得的许可已归还
        let outcome = match drained {
            Ok(Ok(_)) => DrainOutcome::Drained,
            _ => DrainOutcome::Abandoned(self.in_flight()),
        };
        self.permits.close();
        outcome
    }
}
