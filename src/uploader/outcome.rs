// 上传结果分类
//
// 把一次上传的原始结果（HTTP 状态码、传输错误、本地读取错误）
// 归类为三态结果：已送达 / 可重试失败 / 致命错误

use crate::uploader::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// 服务器接受上传时返回的状态码（200 OK / 201 Created）
pub const SUCCESS_STATUSES: [u16; 2] = [200, 201];

/// 失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// 服务器返回了非成功状态码
    Status(u16),
    /// 传输层错误（连接、超时、TLS、DNS）
    Transport(String),
    /// 本地文件读取失败
    Read(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Status(code) => write!(f, "错误码: {}", code),
            FailureReason::Transport(msg) => write!(f, "传输错误: {}", msg),
            FailureReason::Read(msg) => write!(f, "读取文件失败: {}", msg),
        }
    }
}

/// 单次上传尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 服务器已接收
    Delivered,
    /// 失败，但可以重试
    RetryableFailure { reason: FailureReason },
    /// 失败，重试也不会成功
    FatalError { reason: FailureReason },
}

impl AttemptOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, AttemptOutcome::Delivered)
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            AttemptOutcome::Delivered => None,
            AttemptOutcome::RetryableFailure { reason } | AttemptOutcome::FatalError { reason } => {
                Some(reason)
            }
        }
    }
}

/// 错误分类模式
///
/// - `Lenient`：除 200/201 以外的所有结果都视为可重试（默认行为）
/// - `Strict`：客户端错误（4xx，408/429 除外）以及文件不存在、无权限等
///   本地错误视为致命错误，重试控制器会立即放弃
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    #[default]
    Lenient,
    Strict,
}

impl ClassificationMode {
    /// 根据 HTTP 状态码分类
    pub fn classify_status(self, status: u16) -> AttemptOutcome {
        if SUCCESS_STATUSES.contains(&status) {
            return AttemptOutcome::Delivered;
        }

        let reason = FailureReason::Status(status);
        match self {
            ClassificationMode::Strict if is_fatal_status(status) => {
                AttemptOutcome::FatalError { reason }
            }
            _ => AttemptOutcome::RetryableFailure { reason },
        }
    }

    /// 传输层错误分类
    ///
    /// 请求本身无法构建（例如 URL 非法）时，严格模式下视为致命错误
    pub fn classify_transport(self, error: &TransportError) -> AttemptOutcome {
        let reason = FailureReason::Transport(error.to_string());
        match (self, error) {
            (ClassificationMode::Strict, TransportError::Request(_)) => {
                AttemptOutcome::FatalError { reason }
            }
            _ => AttemptOutcome::RetryableFailure { reason },
        }
    }

    /// 本地读取错误分类
    pub fn classify_read(self, error: &io::Error) -> AttemptOutcome {
        let reason = FailureReason::Read(error.to_string());
        let permanent = matches!(
            error.kind(),
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
        );
        match self {
            ClassificationMode::Strict if permanent => AttemptOutcome::FatalError { reason },
            _ => AttemptOutcome::RetryableFailure { reason },
        }
    }
}

/// 重试不会改变结果的状态码
fn is_fatal_status(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}
