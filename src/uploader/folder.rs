//! 文件夹扫描
//!
//! 负责:
//! - 递归扫描本地文件夹
//! - 按文件名判断是否为 DICOM 候选文件
//! - 按所在目录分组，供批量上传逐组处理

use crate::config::ScanConfig;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// 一个目录下的候选文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    /// 目录绝对路径
    pub directory: PathBuf,
    /// 该目录下（不含子目录）的候选文件绝对路径，按文件名排序
    pub files: Vec<PathBuf>,
}

/// 文件夹扫描配置
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 是否跟随符号链接
    pub follow_symlinks: bool,
    /// 跳过隐藏文件（以.开头的文件和文件夹）
    pub skip_hidden: bool,
}

impl From<&ScanConfig> for ScanOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            follow_symlinks: config.follow_symlinks,
            skip_hidden: config.skip_hidden,
        }
    }
}

/// 判断文件名是否为 DICOM 候选文件
///
/// 扩展名为 `.dcm`（不区分大小写），或文件名中完全没有 `.`
/// （PACS 导出的 DICOM 文件常常没有扩展名，如 `IM0001`）
pub fn is_dicom_candidate(file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(".dcm") || !file_name.contains('.')
}

/// 文件夹扫描器
#[derive(Debug, Clone, Default)]
pub struct FolderScanner {
    options: ScanOptions,
}

impl FolderScanner {
    /// 创建默认配置的扫描器
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建自定义配置的扫描器
    pub fn with_options(options: ScanOptions) -> Self {
        Self { options }
    }

    /// 扫描多个根目录
    ///
    /// 扫描失败的根目录记录警告后跳过，不影响其他根目录
    pub fn discover(&self, roots: &[PathBuf]) -> Vec<FileGroup> {
        let mut groups = Vec::new();
        for root in roots {
            match self.scan_root(root) {
                Ok(found) => groups.extend(found),
                Err(e) => warn!("扫描根目录失败，已跳过: {:#}", e),
            }
        }
        groups
    }

    /// 扫描一个根目录
    ///
    /// # 返回
    /// - 根目录及其所有子目录各自对应一个分组（包括没有候选文件的目录），
    ///   按路径排序
    pub fn scan_root<P: AsRef<Path>>(&self, root_path: P) -> Result<Vec<FileGroup>> {
        let root_path = root_path.as_ref();

        if !root_path.exists() {
            anyhow::bail!("扫描路径不存在: {}", root_path.display());
        }

        if !root_path.is_dir() {
            anyhow::bail!("扫描路径不是文件夹: {}", root_path.display());
        }

        let root = dunce::canonicalize(root_path)
            .with_context(|| format!("无法解析绝对路径: {}", root_path.display()))?;

        info!("开始扫描文件夹: {}", root.display());

        let mut groups: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        let skip_hidden = self.options.skip_hidden;

        let walker = WalkDir::new(&root)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !(skip_hidden && is_hidden(entry)));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("读取目录条目失败，已跳过: {}", e);
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                info!("发现目录: {}", entry.path().display());
                groups.entry(entry.path().to_path_buf()).or_default();
                continue;
            }

            if !file_type.is_file() {
                debug!("跳过非常规文件: {}", entry.path().display());
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if !is_dicom_candidate(&name) {
                debug!("跳过非 DICOM 文件: {}", entry.path().display());
                continue;
            }

            let parent = entry
                .path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.clone());
            info!("发现文件: {}", entry.path().display());
            groups
                .entry(parent)
                .or_default()
                .push(entry.path().to_path_buf());
        }

        let groups: Vec<FileGroup> = groups
            .into_iter()
            .map(|(directory, files)| FileGroup { directory, files })
            .collect();

        info!(
            "文件夹扫描完成: {} 个目录，{} 个候选文件",
            groups.len(),
            groups.iter().map(|g| g.files.len()).sum::<usize>()
        );

        Ok(groups)
    }
}

/// 根目录本身不算隐藏
fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}
