//! 日志系统配置
//!
//! 控制台输出 + 两个日志文件：
//! - `upload.<启动时间>.log`：所有进度记录
//! - `upload-failure.<启动时间>.log`：只包含失败通道（target = `upload_failure`）的记录
//!
//! 日志文件按大小滚动，启动时清理过期日志

use crate::config::LogConfig;
use crate::uploader::FAILURE_TARGET;
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter,
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// 进度日志文件名前缀
pub const PROGRESS_LOG_PREFIX: &str = "upload";

/// 失败日志文件名前缀
pub const FAILURE_LOG_PREFIX: &str = "upload-failure";

const TIMER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日志文件管理器（内部状态）
///
/// 负责管理日志文件的创建、滚动和写入
struct LogFileManagerInner {
    /// 文件名前缀
    prefix: String,
    /// 启动时间戳（格式：YYYY-MM-DD-HHMMSS）
    start_timestamp: String,
    /// 日志目录路径
    log_dir: PathBuf,
    /// 当前文件句柄
    current_file: Option<File>,
    /// 当前文件序号（0 表示基础文件，1、2、3... 表示滚动文件）
    current_index: u32,
    /// 单个文件最大大小（字节）
    max_file_size: u64,
    /// 当前文件已写入的字节数
    current_size: u64,
}

impl LogFileManagerInner {
    fn new(log_dir: PathBuf, prefix: &str, start_timestamp: String, max_file_size: u64) -> io::Result<Self> {
        let mut manager = Self {
            prefix: prefix.to_string(),
            start_timestamp,
            log_dir,
            current_file: None,
            current_index: 0,
            max_file_size,
            current_size: 0,
        };

        manager.create_new_file()?;

        Ok(manager)
    }

    /// 生成日志文件路径
    fn generate_file_path(&self, index: u32) -> PathBuf {
        let filename = if index == 0 {
            format!("{}.{}.log", self.prefix, self.start_timestamp)
        } else {
            format!("{}.{}_{}.log", self.prefix, self.start_timestamp, index)
        };
        self.log_dir.join(filename)
    }

    fn create_new_file(&mut self) -> io::Result<()> {
        let file_path = self.generate_file_path(self.current_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        self.current_file = Some(file);
        self.current_size = 0;

        Ok(())
    }

    /// 检查是否需要滚动到新文件
    fn should_rotate(&self, incoming_size: usize) -> bool {
        self.current_size > 0 && self.current_size + incoming_size as u64 > self.max_file_size
    }

    /// 滚动到新文件
    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.current_file.take() {
            file.flush()?;
        }

        self.current_index += 1;
        self.create_new_file()?;

        Ok(())
    }

    fn write_data(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.should_rotate(buf.len()) {
            self.rotate()?;
        }

        if let Some(file) = &mut self.current_file {
            let written = file.write(buf)?;
            self.current_size += written as u64;
            Ok(written)
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "日志文件未打开"))
        }
    }

    fn flush_file(&mut self) -> io::Result<()> {
        if let Some(file) = &mut self.current_file {
            file.flush()?;
        }
        Ok(())
    }
}

/// 日志文件管理器（线程安全包装）
///
/// 实现了 Write trait，可以作为日志输出目标
#[derive(Clone)]
pub struct LogFileManager {
    inner: Arc<Mutex<LogFileManagerInner>>,
}

impl LogFileManager {
    /// 创建新的日志文件管理器
    ///
    /// 文件名格式: `<prefix>.YYYY-MM-DD-HHMMSS.log`，滚动后为 `<prefix>.YYYY-MM-DD-HHMMSS_N.log`
    pub fn new(log_dir: PathBuf, prefix: &str, start_timestamp: String, max_file_size: u64) -> io::Result<Self> {
        let inner = LogFileManagerInner::new(log_dir, prefix, start_timestamp, max_file_size)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, LogFileManagerInner>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "日志文件锁已损坏"))
    }
}

impl Write for LogFileManager {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write_data(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush_file()
    }
}

/// 日志系统守卫
/// 必须保持存活，否则日志写入线程会终止
pub struct LogGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// 初始化日志系统
///
/// # Arguments
/// * `config` - 日志配置
///
/// # Returns
/// * `LogGuard` - 日志守卫，需要保持存活直到程序结束
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    // RUST_LOG 只指定了部分 target 时，失败通道仍需保留
    let env_filter = match format!("{}=error", FAILURE_TARGET).parse::<filter::Directive>() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIMER_FORMAT.to_string()))
        .with_ansi(true);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        info!("日志系统初始化完成（仅控制台输出）");
        return LogGuard {
            _file_guards: Vec::new(),
        };
    }

    let managers = fs::create_dir_all(&config.log_dir).and_then(|_| {
        let start_timestamp = Local::now().format("%Y-%m-%d-%H%M%S").to_string();
        let progress = LogFileManager::new(
            config.log_dir.clone(),
            PROGRESS_LOG_PREFIX,
            start_timestamp.clone(),
            config.max_file_size,
        )?;
        let failure = LogFileManager::new(
            config.log_dir.clone(),
            FAILURE_LOG_PREFIX,
            start_timestamp,
            config.max_file_size,
        )?;
        Ok((progress, failure))
    });

    let (progress_manager, failure_manager) = match managers {
        Ok(managers) => managers,
        Err(e) => {
            eprintln!(
                "创建日志文件失败: {:?}, 错误: {}, 回退到仅控制台输出",
                config.log_dir, e
            );
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
            return LogGuard {
                _file_guards: Vec::new(),
            };
        }
    };

    let (progress_writer, progress_guard) = tracing_appender::non_blocking(progress_manager);
    let (failure_writer, failure_guard) = tracing_appender::non_blocking(failure_manager);

    // 进度文件：所有记录
    let progress_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIMER_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(progress_writer);

    // 失败文件：只保留失败通道
    let failure_layer = fmt::layer()
        .with_target(false)
        .with_level(false)
        .with_timer(ChronoLocal::new(TIMER_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(failure_writer)
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target() == FAILURE_TARGET
        }));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(progress_layer)
        .with(failure_layer)
        .init();

    info!(
        "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}, 单文件最大={:.1}MB",
        config.log_dir,
        config.retention_days,
        config.level,
        config.max_file_size as f64 / 1024.0 / 1024.0
    );

    cleanup_old_logs(&config.log_dir, config.retention_days);

    LogGuard {
        _file_guards: vec![progress_guard, failure_guard],
    }
}

/// 清理过期日志文件
fn cleanup_old_logs(log_dir: &Path, retention_days: u32) {
    let now = Local::now().date_naive();
    let retention_duration = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return;
        }
    };

    let mut deleted_count = 0;

    for entry in entries.flatten() {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let filename = match path.file_name().and_then(|s| s.to_str()) {
            Some(name) => name,
            None => continue,
        };

        let Some(date_str) = extract_date_from_filename(filename) else {
            continue;
        };

        let should_delete = match chrono::NaiveDate::parse_from_str(&date_str, "%Y-%m-%d") {
            Ok(file_date) => now.signed_duration_since(file_date) > retention_duration,
            // 日期解析失败，使用文件修改时间作为后备方案
            Err(_) => check_by_modified_time(&entry, retention_days),
        };

        if should_delete {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e);
            } else {
                deleted_count += 1;
                tracing::debug!("已删除过期日志文件: {:?}", path);
            }
        }
    }

    if deleted_count > 0 {
        info!("已清理 {} 个过期日志文件", deleted_count);
    }
}

/// 从文件名中提取日期部分
///
/// 支持的格式：
/// - upload.YYYY-MM-DD-HHMMSS.log -> YYYY-MM-DD
/// - upload-failure.YYYY-MM-DD-HHMMSS_N.log -> YYYY-MM-DD
///
/// 不是本程序生成的日志文件返回 None
fn extract_date_from_filename(filename: &str) -> Option<String> {
    let name = filename.strip_suffix(".log")?;
    let (prefix, stamp) = name.split_once('.')?;
    if prefix != PROGRESS_LOG_PREFIX && prefix != FAILURE_LOG_PREFIX {
        return None;
    }

    let parts: Vec<&str> = stamp.split('-').collect();
    if parts.len() >= 3 {
        Some(format!("{}-{}-{}", parts[0], parts[1], parts[2]))
    } else {
        None
    }
}

/// 根据文件修改时间检查是否过期（后备方案）
fn check_by_modified_time(entry: &fs::DirEntry, retention_days: u32) -> bool {
    let now = chrono::Utc::now();
    let retention_duration = chrono::Duration::days(retention_days as i64);

    if let Ok(metadata) = entry.metadata() {
        if let Ok(modified) = metadata.modified() {
            let modified_datetime: chrono::DateTime<chrono::Utc> = modified.into();
            let age = now.signed_duration_since(modified_datetime);
            return age > retention_duration;
        }
    }

    false
}
