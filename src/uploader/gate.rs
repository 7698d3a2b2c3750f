//! 全局并发闸门
//!
//! 限制整个批次中同时进行的上传尝试数量，与排队文件数无关。
//! 许可以 RAII 方式持有：无论上传成功、失败、panic 还是任务被中止，
//! `GatePermit` 被 drop 时都会归还容量。

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// 并发闸门
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// 闸门许可，drop 时释放
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// 创建闸门
    ///
    /// 容量为 0 会导致所有任务永久挂起，因此至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("并发上限不能为 0，已调整为 1");
            1
        } else {
            capacity
        };
        debug!("创建并发闸门，容量: {}", capacity);

        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// 获取许可，没有空闲容量时挂起等待
    pub async fn acquire(&self) -> GatePermit {
        match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => GatePermit { _permit: permit },
            // 闸门从不调用 close()
            Err(_) => unreachable!("并发闸门的信号量不会被关闭"),
        }
    }

    /// 总容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 当前已借出的许可数
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }
}
