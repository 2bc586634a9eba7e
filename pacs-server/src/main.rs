//! 医学影像网关主程序

use anyhow::{Context, Result};
use clap::Parser;
use pacs_admin::{init_logging, AppConfig, ConfigManager};
use pacs_database::{default_studies, default_users, InMemoryStudyRepository, InMemoryUserRepository};
use pacs_integration::{Authentication, OrthancClient, OrthancConfig, PacsClient};
use pacs_storage::UploadStorage;
use pacs_web::{
    auth::hash_seed_users, AppState, AuthService, FanOutAggregator, FanOutLimits, Settings,
    UploadLimits, UploadRelay, WebServer,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "pacs-server")]
#[command(about = "医学影像网关：登录、检查管理、PACS 查询与 DICOM 上传")]
struct Args {
    /// 配置文件路径（TOML/YAML/JSON）
    #[arg(short, long)]
    config: Option<String>,

    /// 覆盖监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 覆盖日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut manager = ConfigManager::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        manager.override_port(port)?;
    }
    if let Some(level) = &args.log_level {
        manager.override_log_level(level);
    }
    Ok(manager.into_config())
}

fn build_state(config: &AppConfig) -> Result<AppState> {
    let pacs: Arc<dyn PacsClient> = Arc::new(OrthancClient::new(OrthancConfig {
        proxy_url: config.pacs.proxy_url.clone(),
        direct_url: config.pacs.direct_url.clone(),
        direct_auth: Authentication::BasicAuth {
            username: config.pacs.username.clone(),
            password: config.pacs.password.clone(),
        },
        upload_timeout: Duration::from_secs(config.pacs.upload_timeout_secs),
    })?);

    let users = hash_seed_users(default_users()).context("Failed to prepare users")?;
    let auth = AuthService::new(
        Arc::new(InMemoryUserRepository::new(users)),
        &config.auth.jwt_secret,
        config.auth.token_expiry_hours,
    )
    .context("Failed to initialise authentication")?;

    let aggregator = FanOutAggregator::new(
        pacs.clone(),
        FanOutLimits {
            patients: config.pacs.patient_fanout_limit,
            studies: config.pacs.study_fanout_limit,
        },
    );

    let relay = UploadRelay::new(
        UploadStorage::new(&config.upload.dir),
        pacs.clone(),
        UploadLimits {
            max_files: config.upload.max_files,
            max_file_size: config.upload.max_file_size,
        },
    );

    Ok(AppState {
        auth: Arc::new(auth),
        studies: Arc::new(InMemoryStudyRepository::new(default_studies())),
        aggregator: Arc::new(aggregator),
        relay: Arc::new(relay),
        pacs,
        settings: Arc::new(Settings {
            environment: config.server.environment.clone(),
            development: config.server.is_development(),
            protect_api: config.auth.protect_api,
        }),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config.logging)?;

    info!("启动医学影像网关...");
    info!(
        "  配置来源: {}",
        args.config.as_deref().unwrap_or("默认值与环境变量")
    );
    info!("  运行环境: {}", config.server.environment);
    info!("  PACS 代理端点: {}", config.pacs.proxy_url);
    info!("  PACS 直连端点: {}", config.pacs.direct_url);
    info!("  上传目录: {}", config.upload.dir);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = build_state(&config)?;
    let server = WebServer::new(addr, state);

    if let Err(e) = server.run().await {
        error!("服务器运行失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}
