// 上传任务定义

use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// 上传任务状态
///
/// Pending → Attempting → { Delivered | Attempting | Exhausted | Rejected }
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTaskStatus {
    /// 等待中
    Pending,
    /// 上传中
    Attempting,
    /// 已送达
    Delivered,
    /// 重试次数耗尽
    Exhausted,
    /// 遇到不可重试的错误
    Rejected,
}

impl UploadTaskStatus {
    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadTaskStatus::Delivered | UploadTaskStatus::Exhausted | UploadTaskStatus::Rejected
        )
    }
}

/// 上传任务
///
/// 尝试计数只由处理该任务的重试控制器修改
#[derive(Debug, Clone)]
pub struct UploadTask {
    /// 任务ID
    pub id: String,
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 上传目标地址（整个批次共享）
    pub endpoint: Arc<str>,
    /// 已发起的尝试次数
    pub attempts: u32,
    /// 任务状态
    pub status: UploadTaskStatus,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 开始时间 (Unix timestamp)
    pub started_at: Option<i64>,
    /// 完成时间 (Unix timestamp)
    pub completed_at: Option<i64>,
    /// 最近一次错误
    pub error: Option<String>,
}

impl UploadTask {
    /// 创建新的上传任务
    pub fn new(local_path: PathBuf, endpoint: Arc<str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            local_path,
            endpoint,
            attempts: 0,
            status: UploadTaskStatus::Pending,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.local_path
    }

    /// 开始新一次尝试，返回尝试序号（从 1 开始）
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.status = UploadTaskStatus::Attempting;
        if self.started_at.is_none() {
            self.started_at = Some(chrono::Utc::now().timestamp());
        }
        self.attempts
    }

    /// 记录一次失败（任务仍可继续重试）
    pub fn record_failure(&mut self, error: String) {
        self.error = Some(error);
    }

    /// 标记为已送达
    pub fn mark_delivered(&mut self) {
        self.status = UploadTaskStatus::Delivered;
        self.completed_at = Some(chrono::Utc::now().timestamp());
    }

    /// 标记为重试耗尽
    pub fn mark_exhausted(&mut self, error: String) {
        self.status = UploadTaskStatus::Exhausted;
        self.completed_at = Some(chrono::Utc::now().timestamp());
        self.error = Some(error);
    }

    /// 标记为不可重试失败
    pub fn mark_rejected(&mut self, error: String) {
        self.status = UploadTaskStatus::Rejected;
        self.completed_at = Some(chrono::Utc::now().timestamp());
        self.error = Some(error);
    }
}
