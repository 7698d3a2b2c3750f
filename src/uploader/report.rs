//! 上传结果上报
//!
//! 上传核心不直接写全局日志，而是通过 [`UploadReporter`] 输出到两个通道：
//! - progress：按时间顺序的进度记录（每次尝试的成功/失败、分组开始/结束）
//! - failure：只记录重试耗尽、被拒绝，以及失败后重试成功的文件
//!
//! 生产环境使用 [`TracingReporter`]，失败通道写入 target 为
//! [`FAILURE_TARGET`] 的事件，由日志系统单独落盘；测试中使用
//! [`MemoryReporter`] 在内存中收集记录。

use crate::uploader::{BatchResult, FailureReason};
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// 失败通道使用的 tracing target
pub const FAILURE_TARGET: &str = "upload_failure";

/// 进度通道记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEntry {
    /// 开始处理一个分组
    GroupStarted { directory: PathBuf, files: usize },
    /// 分组中没有待上传文件
    GroupEmpty { directory: PathBuf },
    /// 文件已送达
    Delivered { path: PathBuf, attempt: u32 },
    /// 一次尝试失败；`retry_in` 为 None 表示不会再重试
    AttemptFailed {
        path: PathBuf,
        attempt: u32,
        max_attempts: u32,
        reason: FailureReason,
        retry_in: Option<Duration>,
    },
    /// 分组处理完成
    GroupFinished {
        directory: PathBuf,
        result: BatchResult,
    },
}

impl ProgressEntry {
    /// 是否为警告级别
    pub fn is_warning(&self) -> bool {
        matches!(self, ProgressEntry::AttemptFailed { .. })
    }
}

impl fmt::Display for ProgressEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEntry::GroupStarted { directory, files } => {
                write!(f, "在 {} 中找到 {} 个 DICOM 文件", directory.display(), files)
            }
            ProgressEntry::GroupEmpty { directory } => {
                write!(f, "{} 中没有 DICOM 文件", directory.display())
            }
            ProgressEntry::Delivered { path, attempt } => {
                write!(f, "已上传 {} (第 {} 次尝试)", path.display(), attempt)
            }
            ProgressEntry::AttemptFailed {
                path,
                attempt,
                max_attempts,
                reason,
                retry_in,
            } => {
                write!(
                    f,
                    "第 {}/{} 次上传失败: {}, {}",
                    attempt,
                    max_attempts,
                    path.display(),
                    reason
                )?;
                match retry_in {
                    Some(delay) => write!(f, ", {:.1} 秒后重试", delay.as_secs_f64()),
                    None => Ok(()),
                }
            }
            ProgressEntry::GroupFinished { directory, result } => {
                write!(f, "分组处理完成: {} ({})", directory.display(), result)
            }
        }
    }
}

/// 失败通道记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureEntry {
    /// 失败后重试成功
    Recovered { path: PathBuf, attempts: u32 },
    /// 所有尝试都失败
    Exhausted {
        path: PathBuf,
        attempts: u32,
        reason: FailureReason,
    },
    /// 不可重试的错误，提前放弃
    Rejected {
        path: PathBuf,
        attempts: u32,
        reason: FailureReason,
    },
}

impl FailureEntry {
    pub fn path(&self) -> &PathBuf {
        match self {
            FailureEntry::Recovered { path, .. }
            | FailureEntry::Exhausted { path, .. }
            | FailureEntry::Rejected { path, .. } => path,
        }
    }
}

impl fmt::Display for FailureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureEntry::Recovered { path, attempts } => write!(
                f,
                "文件 {} 最初上传失败，但在第 {} 次尝试后上传成功",
                path.display(),
                attempts
            ),
            FailureEntry::Exhausted {
                path,
                attempts,
                reason,
            } => write!(
                f,
                "文件 {} 的 {} 次尝试全部失败，最后错误: {}",
                path.display(),
                attempts,
                reason
            ),
            FailureEntry::Rejected {
                path,
                attempts,
                reason,
            } => write!(
                f,
                "文件 {} 在第 {} 次尝试时遇到不可重试的错误: {}",
                path.display(),
                attempts,
                reason
            ),
        }
    }
}

/// 上传结果上报接口
///
/// 两个通道都是只追加的，允许多个任务并发写入
pub trait UploadReporter: Send + Sync {
    /// 写入进度通道
    fn progress(&self, entry: ProgressEntry);

    /// 写入失败通道
    fn failure(&self, entry: FailureEntry);
}

/// 输出到 tracing 的上报器
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl UploadReporter for TracingReporter {
    fn progress(&self, entry: ProgressEntry) {
        if entry.is_warning() {
            warn!("{}", entry);
        } else {
            info!("{}", entry);
        }
    }

    fn failure(&self, entry: FailureEntry) {
        error!(target: FAILURE_TARGET, "{}", entry);
    }
}

/// 内存上报器，按写入顺序保存两个通道的记录
#[derive(Debug, Default)]
pub struct MemoryReporter {
    progress: Mutex<Vec<ProgressEntry>>,
    failures: Mutex<Vec<FailureEntry>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进度通道快照
    pub fn progress_entries(&self) -> Vec<ProgressEntry> {
        self.progress.lock().clone()
    }

    /// 失败通道快照
    pub fn failure_entries(&self) -> Vec<FailureEntry> {
        self.failures.lock().clone()
    }

    /// 某个文件在进度通道中的记录
    pub fn progress_for(&self, path: &std::path::Path) -> Vec<ProgressEntry> {
        self.progress
            .lock()
            .iter()
            .filter(|e| match e {
                ProgressEntry::Delivered { path: p, .. }
                | ProgressEntry::AttemptFailed { path: p, .. } => p == path,
                _ => false,
            })
            .cloned()
            .collect()
    }

    /// 某个文件在失败通道中的记录
    pub fn failures_for(&self, path: &std::path::Path) -> Vec<FailureEntry> {
        self.failures
            .lock()
            .iter()
            .filter(|e| e.path() == path)
            .cloned()
            .collect()
    }
}

impl UploadReporter for MemoryReporter {
    fn progress(&self, entry: ProgressEntry) {
        self.progress.lock().push(entry);
    }

    fn failure(&self, entry: FailureEntry) {
        self.failures.lock().push(entry);
    }
}
