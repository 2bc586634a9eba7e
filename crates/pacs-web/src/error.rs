//! 错误到 HTTP 响应的映射
//!
//! 响应体统一为 `{ error: true, code, message, status, errors? }`。
//! 内部错误的细节只在开发环境返回，其余环境由 [`redact_internal_errors`] 替换为通用消息。

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use pacs_core::PacsError;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::server::AppState;

const REDACTED_MESSAGE: &str = "Internal server error";

/// 处理器的错误类型
#[derive(Debug)]
pub struct ApiError(pub PacsError);

impl From<PacsError> for ApiError {
    fn from(err: PacsError) -> Self {
        ApiError(err)
    }
}

/// 附在响应扩展上的标记：该响应来自内部错误，发送前需按环境脱敏
#[derive(Debug, Clone, Copy)]
struct InternalErrorMarker;

pub fn status_for(err: &PacsError) -> StatusCode {
    match err {
        PacsError::Validation(_)
        | PacsError::InvalidFileType(_)
        | PacsError::FileTooLarge(_)
        | PacsError::NoFilesProvided => StatusCode::BAD_REQUEST,
        PacsError::InvalidCredentials | PacsError::MissingToken => StatusCode::UNAUTHORIZED,
        PacsError::InvalidToken(_) => StatusCode::FORBIDDEN,
        PacsError::NotFound(_) | PacsError::RemoteNotFound(_) => StatusCode::NOT_FOUND,
        PacsError::Conflict(_) => StatusCode::CONFLICT,
        PacsError::RemoteUnavailable(_)
        | PacsError::RemoteStatus { .. }
        | PacsError::Config(_)
        | PacsError::Io(_)
        | PacsError::Serialization(_)
        | PacsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 构造错误响应体；`expose_internal` 为 false 时内部错误只给出通用消息
pub fn error_body(err: &PacsError, expose_internal: bool) -> Value {
    let status = status_for(err);
    let message = match err {
        PacsError::Validation(_) => "Validation failed".to_string(),
        e if e.is_internal() && !expose_internal => REDACTED_MESSAGE.to_string(),
        e => e.to_string(),
    };

    let mut body = json!({
        "error": true,
        "code": err.code(),
        "message": message,
        "status": status.as_u16(),
    });

    if let PacsError::Validation(errors) = err {
        body["errors"] = json!(errors);
    }

    body
}

fn redacted_body() -> Value {
    json!({
        "error": true,
        "code": "INTERNAL_ERROR",
        "message": REDACTED_MESSAGE,
        "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);

        if status.is_server_error() {
            error!(code = err.code(), error = %err, "Request failed");
        } else {
            warn!(code = err.code(), error = %err, "Request rejected");
        }

        let mut response = (status, Json(error_body(&err, true))).into_response();
        if err.is_internal() {
            response.extensions_mut().insert(InternalErrorMarker);
        }
        response
    }
}

/// 非开发环境下把内部错误的响应体替换为通用消息
pub async fn redact_internal_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    if state.settings.development || response.extensions().get::<InternalErrorMarker>().is_none() {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = Body::from(redacted_body().to_string());
    Response::from_parts(parts, body)
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
