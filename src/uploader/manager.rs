// 批量上传管理器
//
// 按分组调度上传：
// - 一个分组内的所有文件一次性创建任务（JoinSet），再等待全部结束
// - 真正的并发上限由全局并发闸门控制，与分组大小无关
// - 分组之间严格串行，前一组全部结束后才开始下一组
// - 单个文件失败不会取消同组的其他任务

use crate::uploader::{
    FileGroup, ProgressEntry, TaskOutcome, UploadEngine, UploadReporter, UploadTask,
};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// 分组（或整次运行）的统计结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// 第一次尝试即送达
    pub delivered: usize,
    /// 失败后重试成功
    pub recovered: usize,
    /// 重试耗尽
    pub failed: usize,
    /// 不可重试的错误
    pub rejected: usize,
    /// 任务异常退出（panic）
    pub aborted: usize,
}

impl BatchResult {
    /// 记录一个文件的结果
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Delivered => self.delivered += 1,
            TaskOutcome::Recovered { .. } => self.recovered += 1,
            TaskOutcome::Exhausted { .. } => self.failed += 1,
            TaskOutcome::Rejected { .. } => self.rejected += 1,
        }
    }

    /// 合并另一个分组的结果
    pub fn merge(&mut self, other: &BatchResult) {
        self.delivered += other.delivered;
        self.recovered += other.recovered;
        self.failed += other.failed;
        self.rejected += other.rejected;
        self.aborted += other.aborted;
    }

    /// 文件总数
    pub fn total(&self) -> usize {
        self.delivered + self.recovered + self.failed + self.rejected + self.aborted
    }

    /// 成功送达的文件数
    pub fn succeeded(&self) -> usize {
        self.delivered + self.recovered
    }

    /// 是否全部送达
    pub fn is_clean(&self) -> bool {
        self.succeeded() == self.total()
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "共 {} 个, 成功 {}, 重试后成功 {}, 失败 {}, 拒绝 {}, 异常 {}",
            self.total(),
            self.delivered,
            self.recovered,
            self.failed,
            self.rejected,
            self.aborted
        )
    }
}

/// 批量上传管理器
pub struct UploadManager {
    engine: Arc<UploadEngine>,
}

impl UploadManager {
    pub fn new(engine: UploadEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &Arc<UploadEngine> {
        &self.engine
    }

    fn reporter(&self) -> &Arc<dyn UploadReporter> {
        self.engine.reporter()
    }

    /// 上传一个分组，等待组内所有文件到达终态
    pub async fn run_group(&self, group: &FileGroup) -> BatchResult {
        if group.files.is_empty() {
            self.reporter().progress(ProgressEntry::GroupEmpty {
                directory: group.directory.clone(),
            });
            return BatchResult::default();
        }

        self.reporter().progress(ProgressEntry::GroupStarted {
            directory: group.directory.clone(),
            files: group.files.len(),
        });

        let endpoint: Arc<str> = Arc::from(self.engine.endpoint());
        let mut join_set: JoinSet<TaskOutcome> = JoinSet::new();

        for path in &group.files {
            let engine = self.engine.clone();
            let task = UploadTask::new(path.clone(), endpoint.clone());
            join_set.spawn(async move { engine.deliver(task).await });
        }

        let mut result = BatchResult::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => result.record(&outcome),
                Err(e) => {
                    // 任务 panic
                    error!("上传任务异常: {}", e);
                    result.aborted += 1;
                }
            }
        }

        self.reporter().progress(ProgressEntry::GroupFinished {
            directory: group.directory.clone(),
            result: result.clone(),
        });

        result
    }

    /// 依次上传所有分组
    pub async fn run_all(&self, groups: &[FileGroup]) -> BatchResult {
        let mut summary = BatchResult::default();

        for (index, group) in groups.iter().enumerate() {
            info!(
                "处理分组 {}/{}: {}",
                index + 1,
                groups.len(),
                group.directory.display()
            );
            let result = self.run_group(group).await;
            summary.merge(&result);
        }

        summary
    }
}
