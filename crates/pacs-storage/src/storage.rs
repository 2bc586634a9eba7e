//! 上传文件本地暂存

use chrono::Utc;
use pacs_core::{PacsError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// 同名冲突时最多尝试的时间戳偏移次数
const MAX_NAME_ATTEMPTS: i64 = 1000;

/// 已落盘的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// 磁盘上的文件名（带时间戳前缀）
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

/// 上传文件暂存区，文件在磁盘上无限期保留
#[derive(Debug, Clone)]
pub struct UploadStorage {
    base_path: PathBuf,
}

impl UploadStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 创建暂存文件，命名为 `<毫秒时间戳>_<原始文件名>`，从不覆盖已有文件
    pub async fn create(&self, original_name: &str) -> Result<UploadWriter> {
        tokio::fs::create_dir_all(&self.base_path).await?;

        let name = sanitize_file_name(original_name);
        let millis = Utc::now().timestamp_millis();

        for offset in 0..MAX_NAME_ATTEMPTS {
            let filename = format!("{}_{}", millis + offset, name);
            let path = self.base_path.join(&filename);

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    return Ok(UploadWriter {
                        file,
                        filename,
                        path,
                        size: 0,
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(PacsError::Internal(format!(
            "could not allocate a unique file name for {}",
            name
        )))
    }

    /// 读取已暂存的文件
    pub async fn read(&self, stored: &StoredFile) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&stored.path).await?)
    }

    /// 删除已暂存的文件
    pub async fn remove(&self, stored: &StoredFile) {
        remove_quietly(&stored.path).await;
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
    }
}

/// 正在写入的暂存文件；未 `finish` 的文件应调用 `discard` 删除
#[derive(Debug)]
pub struct UploadWriter {
    file: tokio::fs::File,
    filename: String,
    path: PathBuf,
    size: u64,
}

impl UploadWriter {
    /// 已写入的字节数
    pub fn size(&self) -> u64 {
        self.size
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    /// 刷盘并返回文件信息；失败时删除半成品
    pub async fn finish(mut self) -> Result<StoredFile> {
        if let Err(e) = self.file.flush().await {
            self.discard().await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), size = self.size, "Stored upload locally");
        Ok(StoredFile {
            filename: self.filename,
            path: self.path,
            size: self.size,
        })
    }

    /// 放弃写入并删除文件
    pub async fn discard(self) {
        let UploadWriter { file, path, .. } = self;
        drop(file);
        remove_quietly(&path).await;
    }
}

/// 去掉客户端文件名中的目录部分，防止写出暂存区
pub fn sanitize_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" | "." | ".." => "upload".to_string(),
        name => name.to_string(),
    }
}
