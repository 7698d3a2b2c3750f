// 上传引擎
//
// 核心功能：
// 1. 单次上传尝试：读取整个文件，POST 到目标地址，对结果分类
// 2. 重试控制：固定间隔重试，直到送达、遇到致命错误或次数耗尽
// 3. 每次尝试前获取并发闸门许可，尝试结束（包括出错）后释放
//
// 同一文件的多次尝试严格串行；重试等待期间不占用闸门许可

use crate::config::UploadConfig;
use crate::uploader::{
    AttemptOutcome, ClassificationMode, ConcurrencyGate, FailureEntry, FailureReason,
    ProgressEntry, UploadReporter, UploadTask, UploadTransport,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// =====================================================
// 重试策略
// =====================================================

/// 默认最大尝试次数
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// 默认重试间隔（秒）
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// 重试策略
///
/// 固定间隔，无指数退避、无抖动。需要更强退避策略时从
/// [`RetryPolicy::delay_before`] 扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 两次尝试之间的等待时间
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::fixed(config.max_retries, config.retry_delay())
    }

    /// 第 `next_attempt` 次尝试之前的等待时间
    pub fn delay_before(&self, _next_attempt: u32) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(
            DEFAULT_MAX_RETRIES,
            Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        )
    }
}

// =====================================================
// 任务终态
// =====================================================

/// 单个文件的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// 第一次尝试即送达
    Delivered,
    /// 失败后重试成功
    Recovered { attempts: u32 },
    /// 重试次数耗尽
    Exhausted { attempts: u32, reason: FailureReason },
    /// 不可重试的错误
    Rejected { attempts: u32, reason: FailureReason },
}

impl TaskOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            TaskOutcome::Delivered => 1,
            TaskOutcome::Recovered { attempts }
            | TaskOutcome::Exhausted { attempts, .. }
            | TaskOutcome::Rejected { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Delivered | TaskOutcome::Recovered { .. })
    }
}

// =====================================================
// 单次上传尝试
// =====================================================

/// 执行一次上传
///
/// 先把文件完整读入内存，再通过传输层发送。不修改任何本地状态
pub async fn attempt_upload(
    transport: &dyn UploadTransport,
    local_path: &Path,
    mode: ClassificationMode,
) -> AttemptOutcome {
    let body = match tokio::fs::read(local_path).await {
        Ok(body) => body,
        Err(e) => return mode.classify_read(&e),
    };

    match transport.post(body).await {
        Ok(status) => mode.classify_status(status),
        Err(e) => mode.classify_transport(&e),
    }
}

// =====================================================
// 上传引擎（重试控制器）
// =====================================================

/// 上传引擎
///
/// 所有任务共享同一个引擎实例：同一个传输层、同一个并发闸门、
/// 同一个上报器
pub struct UploadEngine {
    /// 传输层
    transport: Arc<dyn UploadTransport>,
    /// 全局并发闸门
    gate: ConcurrencyGate,
    /// 重试策略
    policy: RetryPolicy,
    /// 错误分类模式
    mode: ClassificationMode,
    /// 结果上报
    reporter: Arc<dyn UploadReporter>,
}

impl UploadEngine {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        gate: ConcurrencyGate,
        policy: RetryPolicy,
        mode: ClassificationMode,
        reporter: Arc<dyn UploadReporter>,
    ) -> Self {
        Self {
            transport,
            gate,
            policy,
            mode,
            reporter,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn reporter(&self) -> &Arc<dyn UploadReporter> {
        &self.reporter
    }

    /// 上传一个文件直到终态
    ///
    /// 任何失败都只体现在返回值和上报记录中，不会向调用方传播错误
    pub async fn deliver(&self, mut task: UploadTask) -> TaskOutcome {
        let max_attempts = self.policy.max_attempts;

        loop {
            let attempt = task.begin_attempt();
            debug!(
                "[{}] 第 {}/{} 次尝试: {:?} -> {}",
                task.id, attempt, max_attempts, task.local_path, task.endpoint
            );

            let outcome = {
                let _permit = self.gate.acquire().await;
                attempt_upload(self.transport.as_ref(), task.path(), self.mode).await
            };

            match outcome {
                AttemptOutcome::Delivered => {
                    task.mark_delivered();
                    if attempt > 1 {
                        self.reporter.failure(FailureEntry::Recovered {
                            path: task.local_path.clone(),
                            attempts: attempt,
                        });
                    }
                    self.reporter.progress(ProgressEntry::Delivered {
                        path: task.local_path.clone(),
                        attempt,
                    });

                    return if attempt > 1 {
                        TaskOutcome::Recovered { attempts: attempt }
                    } else {
                        TaskOutcome::Delivered
                    };
                }
                AttemptOutcome::FatalError { reason } => {
                    self.reporter.progress(ProgressEntry::AttemptFailed {
                        path: task.local_path.clone(),
                        attempt,
                        max_attempts,
                        reason: reason.clone(),
                        retry_in: None,
                    });
                    self.reporter.failure(FailureEntry::Rejected {
                        path: task.local_path.clone(),
                        attempts: attempt,
                        reason: reason.clone(),
                    });
                    task.mark_rejected(reason.to_string());

                    return TaskOutcome::Rejected {
                        attempts: attempt,
                        reason,
                    };
                }
                AttemptOutcome::RetryableFailure { reason } => {
                    let exhausted = attempt >= max_attempts;
                    let delay = self.policy.delay_before(attempt + 1);

                    self.reporter.progress(ProgressEntry::AttemptFailed {
                        path: task.local_path.clone(),
                        attempt,
                        max_attempts,
                        reason: reason.clone(),
                        retry_in: (!exhausted).then_some(delay),
                    });

                    if exhausted {
                        self.reporter.failure(FailureEntry::Exhausted {
                            path: task.local_path.clone(),
                            attempts: attempt,
                            reason: reason.clone(),
                        });
                        task.mark_exhausted(reason.to_string());

                        return TaskOutcome::Exhausted {
                            attempts: attempt,
                            reason,
                        };
                    }

                    task.record_failure(reason.to_string());
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::testing::{write_files, ScriptedTransport};
    use crate::uploader::{MemoryReporter, TransportError};
    use std::path::PathBuf;

    fn engine(
        transport: Arc<ScriptedTransport>,
        capacity: usize,
        policy: RetryPolicy,
        mode: ClassificationMode,
    ) -> (UploadEngine, Arc<MemoryReporter>) {
        let reporter = Arc::new(MemoryReporter::new());
        let engine = UploadEngine::new(
            transport,
            ConcurrencyGate::new(capacity),
            policy,
            mode,
            reporter.clone(),
        );
        (engine, reporter)
    }

    fn task(path: &Path) -> UploadTask {
        UploadTask::new(path.to_path_buf(), Arc::from("http://test/instances"))
    }

    fn warnings(reporter: &MemoryReporter, path: &Path) -> usize {
        reporter
            .progress_for(path)
            .iter()
            .filter(|e| e.is_warning())
            .count()
    }

    fn successes(reporter: &MemoryReporter, path: &Path) -> usize {
        reporter
            .progress_for(path)
            .iter()
            .filter(|e| matches!(e, ProgressEntry::Delivered { .. }))
            .count()
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert_eq!(policy.delay_before(2), policy.delay_before(5));

        // 至少尝试一次
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_attempt_upload_classifies_status() {
        let (_dir, files) = write_files(&["ok", "bad"]);
        let transport = ScriptedTransport::new();
        transport.script("bad", vec![Ok(500)]);

        let mode = ClassificationMode::Lenient;
        assert_eq!(
            attempt_upload(&transport, &files[0], mode).await,
            AttemptOutcome::Delivered
        );
        assert_eq!(
            attempt_upload(&transport, &files[1], mode).await,
            AttemptOutcome::RetryableFailure {
                reason: FailureReason::Status(500)
            }
        );
    }

    #[tokio::test]
    async fn test_attempt_upload_missing_file_skips_transport() {
        let transport = ScriptedTransport::new();
        let outcome = attempt_upload(
            &transport,
            Path::new("/definitely/not/here/IM0001"),
            ClassificationMode::Lenient,
        )
        .await;

        assert!(matches!(
            outcome,
            AttemptOutcome::RetryableFailure {
                reason: FailureReason::Read(_)
            }
        ));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_first_try_success() {
        let (_dir, files) = write_files(&["f1"]);
        let transport = Arc::new(ScriptedTransport::new());
        let (engine, reporter) = engine(
            transport.clone(),
            2,
            RetryPolicy::fixed(5, Duration::ZERO),
            ClassificationMode::Lenient,
        );

        let outcome = engine.deliver(task(&files[0])).await;

        assert_eq!(outcome, TaskOutcome::Delivered);
        assert_eq!(successes(&reporter, &files[0]), 1);
        assert_eq!(warnings(&reporter, &files[0]), 0);
        assert!(reporter.failure_entries().is_empty());
        assert_eq!(transport.total_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_after_retries() {
        let (_dir, files) = write_files(&["flaky"]);
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            "flaky",
            vec![
                Ok(500),
                Err(TransportError::Connect("connection reset".to_string())),
                Ok(201),
            ],
        );
        let (engine, reporter) = engine(
            transport.clone(),
            2,
            RetryPolicy::fixed(5, Duration::from_secs(5)),
            ClassificationMode::Lenient,
        );

        let started = tokio::time::Instant::now();
        let outcome = engine.deliver(task(&files[0])).await;

        assert_eq!(outcome, TaskOutcome::Recovered { attempts: 3 });
        // 两次失败之后各等待一次
        assert!(started.elapsed() >= Duration::from_secs(10));

        assert_eq!(successes(&reporter, &files[0]), 1);
        assert_eq!(warnings(&reporter, &files[0]), 2);
        assert_eq!(
            reporter.failures_for(&files[0]),
            vec![FailureEntry::Recovered {
                path: files[0].clone(),
                attempts: 3
            }]
        );
        assert_eq!(transport.calls_for("flaky"), 3);
    }

    #[tokio::test]
    async fn test_exhausted_after_max_attempts() {
        let (_dir, files) = write_files(&["broken"]);
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("broken", vec![Ok(503)]);
        let (engine, reporter) = engine(
            transport.clone(),
            2,
            RetryPolicy::fixed(4, Duration::ZERO),
            ClassificationMode::Lenient,
        );

        let outcome = engine.deliver(task(&files[0])).await;

        assert_eq!(
            outcome,
            TaskOutcome::Exhausted {
                attempts: 4,
                reason: FailureReason::Status(503)
            }
        );
        assert_eq!(warnings(&reporter, &files[0]), 4);
        assert_eq!(successes(&reporter, &files[0]), 0);
        assert_eq!(reporter.failures_for(&files[0]).len(), 1);
        assert!(matches!(
            reporter.failures_for(&files[0])[0],
            FailureEntry::Exhausted { attempts: 4, .. }
        ));

        // 最后一次失败不再预告重试
        let last = reporter.progress_for(&files[0]).pop().unwrap();
        assert!(matches!(
            last,
            ProgressEntry::AttemptFailed { retry_in: None, .. }
        ));
        assert_eq!(transport.calls_for("broken"), 4);
    }

    #[tokio::test]
    async fn test_missing_file_consumes_full_budget() {
        let transport = Arc::new(ScriptedTransport::new());
        let (engine, reporter) = engine(
            transport.clone(),
            2,
            RetryPolicy::fixed(3, Duration::ZERO),
            ClassificationMode::Lenient,
        );
        let missing = PathBuf::from("/definitely/not/here/IM0001");

        let outcome = engine.deliver(task(&missing)).await;

        assert!(matches!(
            outcome,
            TaskOutcome::Exhausted {
                attempts: 3,
                reason: FailureReason::Read(_)
            }
        ));
        assert_eq!(warnings(&reporter, &missing), 3);
        assert_eq!(reporter.failures_for(&missing).len(), 1);
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_strict_mode_fails_fast() {
        let (_dir, files) = write_files(&["forbidden"]);
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("forbidden", vec![Ok(403)]);
        let (engine, reporter) = engine(
            transport.clone(),
            2,
            RetryPolicy::fixed(5, Duration::ZERO),
            ClassificationMode::Strict,
        );

        let outcome = engine.deliver(task(&files[0])).await;

        assert_eq!(
            outcome,
            TaskOutcome::Rejected {
                attempts: 1,
                reason: FailureReason::Status(403)
            }
        );
        assert_eq!(warnings(&reporter, &files[0]), 1);
        assert!(matches!(
            reporter.failures_for(&files[0])[0],
            FailureEntry::Rejected { attempts: 1, .. }
        ));
        assert_eq!(transport.calls_for("forbidden"), 1);
    }

    #[tokio::test]
    async fn test_permit_not_held_after_delivery() {
        let (_dir, files) = write_files(&["a", "b"]);
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("b", vec![Ok(500)]);
        let (engine, _reporter) = engine(
            transport,
            1,
            RetryPolicy::fixed(2, Duration::ZERO),
            ClassificationMode::Lenient,
        );

        engine.deliver(task(&files[0])).await;
        engine.deliver(task(&files[1])).await;

        assert_eq!(engine.gate().available(), 1);
    }
}
