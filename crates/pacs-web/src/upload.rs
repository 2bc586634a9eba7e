//! DICOM 上传转发
//!
//! 每个文件部分边接收边落盘，全部接收完成后再逐个转发到 PACS；
//! 单个文件的失败只记录在该文件的结果中，不影响同一请求中的其他文件。

use chrono::Utc;
use futures_util::{pin_mut, Stream, StreamExt};
use pacs_core::{
    FieldError, OrthancStatus, PacsError, RejectedFile, Result, UploadResult, UploadStatus,
};
use pacs_integration::PacsClient;
use pacs_storage::{StoredFile, UploadStorage};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

const ALLOWED_EXTENSIONS: [&str; 2] = ["dcm", "dicom"];
const OCTET_STREAM: &str = "application/octet-stream";

/// 上传限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_size: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: 100,
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

/// 一次上传的汇总结果
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub files: Vec<UploadResult>,
    pub rejected: Vec<RejectedFile>,
}

impl UploadReport {
    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn pacs_uploaded(&self) -> usize {
        self.files.iter().filter(|r| r.is_uploaded()).count()
    }

    pub fn message(&self) -> String {
        format!(
            "DICOM files processed: {}/{} uploaded to PACS",
            self.pacs_uploaded(),
            self.total_files()
        )
    }
}

/// 扩展名为 `.dcm`、`.dicom` 或无扩展名，或声明为 octet-stream 的文件才接收
pub fn is_accepted_file(original_name: &str, content_type: Option<&str>) -> bool {
    let extension_ok = match Path::new(original_name).extension() {
        None => true,
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
    };

    extension_ok || content_type == Some(OCTET_STREAM)
}

fn rejection(original_name: &str, err: &PacsError) -> RejectedFile {
    RejectedFile {
        original_name: original_name.to_string(),
        error: err.code().to_string(),
        message: err.to_string(),
    }
}

/// 上传转发器
pub struct UploadRelay {
    storage: UploadStorage,
    pacs: Arc<dyn PacsClient>,
    limits: UploadLimits,
}

impl UploadRelay {
    pub fn new(storage: UploadStorage, pacs: Arc<dyn PacsClient>, limits: UploadLimits) -> Self {
        Self {
            storage,
            pacs,
            limits,
        }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// 开始处理一次上传请求
    pub fn session(&self) -> UploadSession<'_> {
        UploadSession {
            relay: self,
            parts: 0,
            stored: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// 文件数超过上限时整个请求失败
    pub fn ensure_file_count(&self, count: usize) -> Result<()> {
        if count > self.limits.max_files {
            return Err(PacsError::Validation(vec![FieldError::new(
                "dicomFiles",
                format!("At most {} files can be uploaded per request", self.limits.max_files),
            )
            .with_value(count.to_string())]));
        }
        Ok(())
    }

    /// 读回暂存文件并转发到 PACS；任何失败只记录在结果中
    async fn forward(&self, original_name: String, stored: StoredFile) -> UploadResult {
        let mut result = UploadResult {
            filename: stored.filename.clone(),
            original_name,
            size: stored.size,
            local_path: stored.path.display().to_string(),
            upload_time: Utc::now(),
            status: UploadStatus::UploadedLocally,
            orthanc_status: OrthancStatus::Pending,
            orthanc_id: None,
            orthanc_error: None,
        };

        info!(file = %result.original_name, size = stored.size, "Uploading to PACS");
        let uploaded = match self.storage.read(&stored).await {
            Ok(data) => self.pacs.upload_instance(data).await,
            Err(e) => Err(e),
        };

        match uploaded {
            Ok(response) => {
                info!(file = %result.original_name, orthanc_id = %response.id, "Uploaded to PACS");
                result.orthanc_status = OrthancStatus::Uploaded;
                result.status = UploadStatus::UploadedToPacs;
                result.orthanc_id = Some(response.id);
            }
            Err(e) => {
                error!(file = %result.original_name, error = %e, "PACS upload failed");
                result.orthanc_status = OrthancStatus::Failed;
                result.orthanc_error = Some(match e {
                    PacsError::RemoteUnavailable(reason) => reason,
                    other => other.to_string(),
                });
            }
        }

        result
    }
}

/// 一次上传请求的接收状态
pub struct UploadSession<'a> {
    relay: &'a UploadRelay,
    /// 已见到的文件部分数（含被拒绝的）
    parts: usize,
    stored: Vec<(String, StoredFile)>,
    rejected: Vec<RejectedFile>,
}

impl UploadSession<'_> {
    fn reject(&mut self, original_name: &str, err: &PacsError) {
        warn!(file = %original_name, code = err.code(), error = %err, "Rejected upload");
        self.rejected.push(rejection(original_name, err));
    }

    async fn discard_all(&mut self) {
        for (_, stored) in self.stored.drain(..) {
            self.relay.storage.remove(&stored).await;
        }
    }

    /// 接收一个文件部分，边读边写入暂存区
    ///
    /// 类型不符、超过大小上限、落盘失败都只拒绝该文件；
    /// 文件数超限或请求体本身读取失败时整个请求失败，已暂存的文件被删除。
    pub async fn accept<S, B, E>(
        &mut self,
        original_name: &str,
        content_type: Option<&str>,
        chunks: S,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        self.parts += 1;
        if let Err(e) = self.relay.ensure_file_count(self.parts) {
            self.discard_all().await;
            return Err(e);
        }

        if !is_accepted_file(original_name, content_type) {
            self.reject(original_name, &PacsError::InvalidFileType(original_name.to_string()));
            return Ok(());
        }

        let mut writer = match self.relay.storage.create(original_name).await {
            Ok(writer) => writer,
            Err(e) => {
                self.reject(original_name, &e);
                return Ok(());
            }
        };

        let max_file_size = self.relay.limits.max_file_size;
        pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    writer.discard().await;
                    self.discard_all().await;
                    return Err(PacsError::invalid_field("dicomFiles", e.to_string()));
                }
            };
            let chunk = chunk.as_ref();

            if writer.size() + chunk.len() as u64 > max_file_size {
                writer.discard().await;
                self.reject(
                    original_name,
                    &PacsError::FileTooLarge(format!("{} (limit {} bytes)", original_name, max_file_size)),
                );
                return Ok(());
            }

            if let Err(e) = writer.write(chunk).await {
                writer.discard().await;
                self.reject(original_name, &e);
                return Ok(());
            }
        }

        match writer.finish().await {
            Ok(stored) => self.stored.push((original_name.to_string(), stored)),
            Err(e) => self.reject(original_name, &e),
        }
        Ok(())
    }

    /// 转发全部已暂存的文件；一个文件部分都没有时返回 `NoFilesProvided`
    pub async fn finish(self) -> Result<UploadReport> {
        if self.parts == 0 {
            return Err(PacsError::NoFilesProvided);
        }

        let mut report = UploadReport {
            files: Vec::with_capacity(self.stored.len()),
            rejected: self.rejected,
        };
        for (original_name, stored) in self.stored {
            report.files.push(self.relay.forward(original_name, stored).await);
        }

        info!(
            accepted = report.total_files(),
            rejected = report.rejected.len(),
            uploaded = report.pacs_uploaded(),
            "Upload processed"
        );
        Ok(report)
    }
}
