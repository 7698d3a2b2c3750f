use anyhow::Context;
use clap::Parser;
use dicom_uploader::{
    config::{self, AppConfig},
    logging,
    uploader::{
        ConcurrencyGate, FolderScanner, ReqwestTransport, RetryPolicy, ScanOptions,
        TracingReporter, UploadEngine, UploadManager,
    },
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// 扫描本地 DICOM 文件并上传到 /instances 接口
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 待扫描的根目录，未指定时使用配置文件中的 scan.roots
    roots: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 先加载日志配置，初始化日志系统（必须保持 _log_guard 存活）
    let log_config = config::load_log_config(&cli.config).await;
    let _log_guard = logging::init_logging(&log_config);

    info!("DICOM Uploader v{} 启动中...", env!("CARGO_PKG_VERSION"));

    // 配置文件存在但无效时直接退出
    let config = AppConfig::load_or_create(&cli.config).await?;

    let roots = if cli.roots.is_empty() {
        config.scan.roots.clone()
    } else {
        cli.roots.clone()
    };
    if roots.is_empty() {
        info!("未指定任何扫描目录，程序退出");
        return Ok(());
    }

    let transport = ReqwestTransport::from_config(&config.server, &config.upload)?;
    info!(
        "上传目标: {}, 最大并发: {}, 最大尝试次数: {}, 重试间隔: {}s, 分类模式: {:?}",
        config.server.instances_url(),
        config.upload.max_concurrent,
        config.upload.max_retries,
        config.upload.retry_delay_secs,
        config.upload.classification
    );

    let engine = UploadEngine::new(
        Arc::new(transport),
        ConcurrencyGate::new(config.upload.max_concurrent),
        RetryPolicy::from_config(&config.upload),
        config.upload.classification,
        Arc::new(TracingReporter),
    );
    let manager = UploadManager::new(engine);
    let scanner = FolderScanner::with_options(ScanOptions::from(&config.scan));

    // 目录遍历是阻塞 IO
    let groups = tokio::task::spawn_blocking(move || scanner.discover(&roots))
        .await
        .context("扫描任务异常")?;

    let summary = manager.run_all(&groups).await;

    info!("所有目录处理完成: {}", summary);
    if !summary.is_clean() {
        warn!(
            "有 {} 个文件未能上传，详见失败日志",
            summary.total() - summary.succeeded()
        );
    }

    Ok(())
}
