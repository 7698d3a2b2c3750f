// 测试用传输层
//
// 按请求体内容区分文件：每个测试文件的内容就是它的名字，
// 脚本中的响应按顺序返回，最后一个响应会一直重复

use crate::uploader::{TransportError, UploadTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Vec<Result<u16, TransportError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    latency: Duration,
    total_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// 未配置脚本的文件一律返回 201
    pub(crate) fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            latency,
            total_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn script(&self, name: &str, responses: Vec<Result<u16, TransportError>>) {
        self.scripts.lock().insert(name.to_string(), responses);
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().get(name).copied().unwrap_or(0)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn respond(&self, name: &str) -> Result<u16, TransportError> {
        let index = {
            let mut calls = self.calls.lock();
            let count = calls.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };

        let scripts = self.scripts.lock();
        match scripts.get(name) {
            Some(responses) if !responses.is_empty() => {
                responses[index.min(responses.len() - 1)].clone()
            }
            _ => Ok(201),
        }
    }
}

#[async_trait]
impl UploadTransport for ScriptedTransport {
    async fn post(&self, body: Vec<u8>) -> Result<u16, TransportError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let name = String::from_utf8_lossy(&body).into_owned();
        let result = self.respond(&name);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn endpoint(&self) -> &str {
        "http://scripted.test/instances"
    }
}

/// 在临时目录中创建文件，内容为文件名
pub(crate) fn write_files(names: &[&str]) -> (TempDir, Vec<PathBuf>) {
    let dir = TempDir::new().unwrap();
    let paths = names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            path
        })
        .collect();
    (dir, paths)
}
