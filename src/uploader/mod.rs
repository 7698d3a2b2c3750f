// 上传模块
//
// 数据流：
// FolderScanner 扫描出分组 → UploadManager 为每个文件创建任务
// → UploadEngine 在并发闸门下驱动 1..N 次上传尝试 → UploadReporter 记录结果

pub mod engine;
pub mod folder;
pub mod gate;
pub mod manager;
pub mod outcome;
pub mod report;
pub mod task;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{attempt_upload, RetryPolicy, TaskOutcome, UploadEngine};
pub use folder::{is_dicom_candidate, FileGroup, FolderScanner, ScanOptions};
pub use gate::{ConcurrencyGate, GatePermit};
pub use manager::{BatchResult, UploadManager};
pub use outcome::{AttemptOutcome, ClassificationMode, FailureReason, SUCCESS_STATUSES};
pub use report::{
    FailureEntry, MemoryReporter, ProgressEntry, TracingReporter, UploadReporter, FAILURE_TARGET,
};
pub use task::{UploadTask, UploadTaskStatus};
pub use transport::{Credentials, ReqwestTransport, TransportError, UploadTransport};
