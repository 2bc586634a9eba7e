//! # PACS集成模块
//!
//! 外部 PACS（Orthanc）的 HTTP 适配器：
//! - 只读查询经由代理端点，不带凭据
//! - 上传、删除走直连端点，附带 Basic 认证
//! - 远端错误统一映射为 `RemoteUnavailable` / `RemoteNotFound` / `RemoteStatus`，不重试

pub mod client;
pub mod models;
pub mod orthanc;

pub use client::PacsClient;
pub use models::{OrthancPatient, OrthancSeries, OrthancStudy, OrthancUploadResponse};
pub use orthanc::{Authentication, OrthancClient, OrthancConfig};
