// 配置管理模块

use crate::uploader::engine::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};
use crate::uploader::ClassificationMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传目标服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 扫描配置
    #[serde(default)]
    pub scan: ScanConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 上传目标服务器配置
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 主机地址
    #[serde(default = "default_server_host")]
    pub host: String,
    /// 端口
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// 是否使用 HTTPS
    #[serde(default)]
    pub tls: bool,
    /// Basic 认证用户名
    #[serde(default = "default_server_username")]
    pub username: String,
    /// Basic 认证密码
    #[serde(default = "default_server_password")]
    pub password: String,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8042
}

fn default_server_username() -> String {
    "orthanc".to_string()
}

fn default_server_password() -> String {
    "orthanc".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            tls: false,
            username: default_server_username(),
            password: default_server_password(),
        }
    }
}

impl ServerConfig {
    /// 上传地址：`{scheme}://{host}:{port}/instances`
    pub fn instances_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}/instances", scheme, self.host, self.port)
    }
}

// 密码不进日志
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 最大同时上传数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// 每个文件的最大尝试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 重试间隔（秒）
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// 单次请求超时（秒），不设置则不限制
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// 错误分类模式
    #[serde(default)]
    pub classification: ClassificationMode,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: None,
            classification: ClassificationMode::default(),
        }
    }
}

impl UploadConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            anyhow::bail!("upload.max_concurrent 必须大于 0");
        }
        if self.max_retries == 0 {
            anyhow::bail!("upload.max_retries 必须大于 0");
        }
        if self.request_timeout_secs == Some(0) {
            anyhow::bail!("upload.request_timeout_secs 不能为 0");
        }
        Ok(())
    }
}

/// 扫描配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// 待扫描的根目录（命令行参数优先）
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    /// 跳过隐藏文件和目录
    #[serde(default)]
    pub skip_hidden: bool,
    /// 是否跟随符号链接
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;

        config.upload.validate().context("上传配置验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        // 确保父目录存在
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("创建配置目录失败")?;
            }
        }

        fs::write(path, content)
            .await
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;

        tracing::info!("✓ 配置已保存: {}", path.display());

        Ok(())
    }

    /// 加载或创建默认配置
    ///
    /// 只有配置文件不存在时才写入并使用默认配置；文件存在但无法读取、
    /// 解析或验证失败时返回错误
    pub async fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::metadata(path).await {
            Ok(_) => {
                let config = Self::load_from_file(path).await?;
                tracing::info!("配置文件加载成功: {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("配置文件不存在，使用默认配置: {}", path.display());
                let default_config = Self::default();
                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {:#}", e);
                }
                Ok(default_config)
            }
            Err(e) => {
                Err(e).with_context(|| format!("读取配置文件失败: {}", path.display()))
            }
        }
    }
}

/// 加载日志配置
///
/// 日志系统初始化之前调用，失败时静默返回默认配置
pub async fn load_log_config(path: impl AsRef<Path>) -> LogConfig {
    if let Ok(content) = fs::read_to_string(path.as_ref()).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}
