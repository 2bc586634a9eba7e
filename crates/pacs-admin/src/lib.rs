//! # PACS管理模块
//!
//! 配置加载与校验、日志初始化。

pub mod config;
pub mod logging;

pub use crate::config::{
    AppConfig, AuthConfig, ConfigManager, LoggingConfig, PacsEndpointConfig, ServerConfig,
    UploadConfig,
};
pub use logging::init_logging;
