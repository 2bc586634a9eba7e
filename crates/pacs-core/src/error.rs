//! 错误定义模块

use serde::Serialize;
use thiserror::Error;

/// 字段级校验错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// 网关统一错误类型
#[derive(Error, Debug)]
pub enum PacsError {
    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Access token required")]
    MissingToken,

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("PACS unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("{0} not found in PACS")]
    RemoteNotFound(String),

    /// PACS 返回了非成功状态码
    #[error("{status}: {reason}")]
    RemoteStatus { status: u16, reason: String },

    #[error("Only DICOM files are allowed: {0}")]
    InvalidFileType(String),

    #[error("File exceeds the upload size limit: {0}")]
    FileTooLarge(String),

    #[error("No DICOM files uploaded")]
    NoFilesProvided,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PacsError {
    /// 单字段校验失败的快捷构造
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        PacsError::Validation(vec![FieldError::new(field, message)])
    }

    /// 机器可读的错误码
    pub fn code(&self) -> &'static str {
        match self {
            PacsError::Validation(_) => "VALIDATION_ERROR",
            PacsError::InvalidCredentials => "INVALID_CREDENTIALS",
            PacsError::MissingToken => "MISSING_TOKEN",
            PacsError::InvalidToken(_) => "INVALID_TOKEN",
            PacsError::NotFound(_) => "NOT_FOUND",
            PacsError::Conflict(_) => "CONFLICT",
            PacsError::RemoteUnavailable(_) | PacsError::RemoteStatus { .. } => {
                "REMOTE_UNAVAILABLE"
            }
            PacsError::RemoteNotFound(_) => "REMOTE_NOT_FOUND",
            PacsError::InvalidFileType(_) => "INVALID_FILE_TYPE",
            PacsError::FileTooLarge(_) => "FILE_TOO_LARGE",
            PacsError::NoFilesProvided => "NO_FILES_PROVIDED",
            PacsError::Config(_)
            | PacsError::Io(_)
            | PacsError::Serialization(_)
            | PacsError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否属于不应向客户端暴露细节的内部错误
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            PacsError::Config(_)
                | PacsError::Io(_)
                | PacsError::Serialization(_)
                | PacsError::Internal(_)
        )
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// 网关统一结果类型
pub type Result<T> = std::result::Result<T, PacsError>;
