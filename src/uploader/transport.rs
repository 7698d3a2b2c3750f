// 上传传输层
//
// 抽象出 UploadTransport trait，生产环境使用 reqwest 实现，
// 测试中可以替换为脚本化的假实现，不发起真实网络请求

use crate::config::{ServerConfig, UploadConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// 传输层错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// 连接失败（拒绝连接、DNS、TLS 握手等）
    #[error("连接失败: {0}")]
    Connect(String),
    /// 请求超时
    #[error("请求超时: {0}")]
    Timeout(String),
    /// 请求无法构建（URL 非法等）
    #[error("请求构建失败: {0}")]
    Request(String),
    /// 其他错误
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::Request(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// 上传传输层
///
/// 一次调用对应一次完整的 POST，请求体为文件的全部内容，
/// 返回服务器的 HTTP 状态码
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// 发送文件内容
    async fn post(&self, body: Vec<u8>) -> Result<u16, TransportError>;

    /// 目标地址（仅用于日志和任务记录）
    fn endpoint(&self) -> &str;
}

/// Basic 认证凭据
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// 密码不进日志
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 基于 reqwest 的传输实现
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    url: String,
    credentials: Credentials,
}

impl ReqwestTransport {
    /// 创建传输层
    ///
    /// # 参数
    /// * `url` - 完整的上传地址，如 `http://127.0.0.1:8042/instances`
    /// * `credentials` - Basic 认证凭据
    /// * `timeout` - 单次请求超时，`None` 表示不限制
    pub fn new(
        url: impl Into<String>,
        credentials: Credentials,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("创建 HTTP 客户端失败")?;

        Ok(Self {
            client,
            url: url.into(),
            credentials,
        })
    }

    /// 从配置创建
    pub fn from_config(server: &ServerConfig, upload: &UploadConfig) -> Result<Self> {
        Self::new(
            server.instances_url(),
            Credentials::new(&server.username, &server.password),
            upload.request_timeout(),
        )
    }
}

#[async_trait]
impl UploadTransport for ReqwestTransport {
    async fn post(&self, body: Vec<u8>) -> Result<u16, TransportError> {
        let body_len = body.len();
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!("POST {} ({} bytes) -> {}", self.url, body_len, status);

        Ok(status)
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
