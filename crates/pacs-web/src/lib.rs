//! # PACS Web模块
//!
//! 医学影像网关的 HTTP 层：
//! - 登录与 JWT 校验
//! - 本地检查的增删改查
//! - PACS 患者、检查的聚合查询
//! - DICOM 文件上传与转发

pub mod aggregation;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod query;
pub mod server;
pub mod upload;
pub mod validation;

pub use aggregation::{Aggregator, FanOutAggregator, FanOutLimits};
pub use auth::{hash_seed_users, AuthGate, AuthService, Claims, LoginResponse};
pub use error::ApiError;
pub use server::{create_app, AppState, Settings, WebServer};
pub use upload::{UploadLimits, UploadRelay};
