// DICOM Uploader Library
// 扫描本地 DICOM 文件并批量上传到 Orthanc 风格的 /instances 接口

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use config::AppConfig;
pub use uploader::{
    BatchResult, ConcurrencyGate, FileGroup, FolderScanner, RetryPolicy, UploadEngine,
    UploadManager, UploadReporter, UploadTask,
};
