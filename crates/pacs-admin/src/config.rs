//! 配置管理
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//! 内置默认值、配置文件（可选）、`MEDIMG__` 前缀的环境变量（`__` 分隔层级）。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// 网关完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 认证配置
    pub auth: AuthConfig,
    /// PACS 连接配置
    pub pacs: PacsEndpointConfig,
    /// 上传配置
    pub upload: UploadConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 运行环境，`development` 时错误响应包含内部细节
    pub environment: String,
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JWT 签名密钥
    pub jwt_secret: String,
    /// 令牌有效期（小时）
    pub token_expiry_hours: i64,
    /// 为 true 时患者、检查、DICOM 路由也要求令牌
    pub protect_api: bool,
}

/// PACS 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacsEndpointConfig {
    /// 只读代理端点
    pub proxy_url: String,
    /// 直连端点
    pub direct_url: String,
    pub username: String,
    pub password: String,
    /// 单个文件上传超时（秒）
    pub upload_timeout_secs: u64,
    /// 患者列表详情查询上限
    pub patient_fanout_limit: usize,
    /// 检查列表详情查询上限
    pub study_fanout_limit: usize,
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// 本地暂存目录
    pub dir: String,
    /// 单次请求最多文件数
    pub max_files: usize,
    /// 单个文件大小上限（字节）
    pub max_file_size: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或 EnvFilter 指令
    pub level: String,
    /// `json` 或 `pretty`
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            environment: "development".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "medical_imaging_secret_key_2024".to_string(),
            token_expiry_hours: 24,
            protect_api: false,
        }
    }
}

impl Default for PacsEndpointConfig {
    fn default() -> Self {
        Self {
            proxy_url: "http://localhost:8080/pacs".to_string(),
            direct_url: "http://localhost:8042".to_string(),
            username: "orthanc".to_string(),
            password: "orthanc".to_string(),
            upload_timeout_secs: 30,
            patient_fanout_limit: 10,
            study_fanout_limit: 20,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: "./uploads/dicom".to_string(),
            max_files: 100,
            max_file_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: AppConfig,
    validator: ConfigValidator,
}

impl ConfigManager {
    /// 加载配置；`config_path` 为空时只使用默认值与环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self { config, validator })
    }

    /// 直接使用给定配置（测试、嵌入场景）
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;
        Ok(Self { config, validator })
    }

    fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&AppConfig::default()).context("Failed to encode default configuration")?,
        );

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("MEDIMG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 覆盖监听端口（命令行参数优先）
    pub fn override_port(&mut self, port: u16) -> Result<()> {
        let mut candidate = self.config.clone();
        candidate.server.port = port;
        self.validator.validate(&candidate)?;
        self.config = candidate;
        Ok(())
    }

    /// 覆盖日志级别
    pub fn override_log_level(&mut self, level: &str) {
        self.config.logging.level = level.to_string();
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&AppConfig) -> bool,
    /// 错误消息
    error_message: &'static str,
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| config.server.port != 0,
                error_message: "Server port cannot be 0",
            },
            ValidationRule {
                field_path: "auth.jwt_secret",
                validator: |config| !config.auth.jwt_secret.is_empty(),
                error_message: "JWT secret cannot be empty",
            },
            ValidationRule {
                field_path: "auth.token_expiry_hours",
                validator: |config| config.auth.token_expiry_hours > 0,
                error_message: "Token expiry must be positive",
            },
            ValidationRule {
                field_path: "pacs.proxy_url",
                validator: |config| is_http_url(&config.pacs.proxy_url),
                error_message: "PACS proxy URL must be an http(s) URL",
            },
            ValidationRule {
                field_path: "pacs.direct_url",
                validator: |config| is_http_url(&config.pacs.direct_url),
                error_message: "PACS direct URL must be an http(s) URL",
            },
            ValidationRule {
                field_path: "pacs.patient_fanout_limit",
                validator: |config| config.pacs.patient_fanout_limit > 0,
                error_message: "Patient fan-out limit cannot be 0",
            },
            ValidationRule {
                field_path: "pacs.study_fanout_limit",
                validator: |config| config.pacs.study_fanout_limit > 0,
                error_message: "Study fan-out limit cannot be 0",
            },
            ValidationRule {
                field_path: "upload.max_files",
                validator: |config| config.upload.max_files > 0,
                error_message: "Upload file count limit cannot be 0",
            },
            ValidationRule {
                field_path: "upload.max_file_size",
                validator: |config| config.upload.max_file_size > 0,
                error_message: "Upload file size limit cannot be 0",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &AppConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if !(rule.validator)(config) {
                return Err(anyhow::anyhow!("{}: {}", rule.field_path, rule.error_message));
            }
        }

        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
