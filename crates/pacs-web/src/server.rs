//! Web服务器

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    response::Response,
    routing::{get, patch, post},
    Router,
};
use pacs_core::Result;
use pacs_database::StudyRepository;
use pacs_integration::PacsClient;
use serde_json::json;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::aggregation::Aggregator;
use crate::auth::{auth_middleware, auth_test_handler, login_handler, me_handler, AuthGate};
use crate::error::redact_internal_errors;
use crate::handlers;
use crate::upload::UploadRelay;

/// 运行时设置
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: String,
    /// 开发环境下错误响应包含内部细节
    pub development: bool,
    /// 患者、检查、DICOM 路由是否要求令牌
    pub protect_api: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            development: true,
            protect_api: false,
        }
    }
}

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthGate>,
    pub studies: Arc<dyn StudyRepository>,
    pub aggregator: Arc<dyn Aggregator>,
    pub relay: Arc<UploadRelay>,
    pub pacs: Arc<dyn PacsClient>,
    pub settings: Arc<Settings>,
}

/// 处理器 panic 时的兜底响应，不带任何细节
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "Handler panicked");

    let body = json!({
        "error": true,
        "code": "INTERNAL_ERROR",
        "message": "Internal server error",
        "status": 500,
    });

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// 构建完整路由
pub fn create_app(state: AppState) -> Router {
    let guard = from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/me", get(me_handler))
        .route_layer(guard.clone())
        .route("/login", post(login_handler))
        .route("/test", get(auth_test_handler));

    let mut patient_routes = Router::new()
        .route("/", get(handlers::list_patients))
        .route("/test", get(handlers::patients_test))
        .route("/:id", get(handlers::get_patient));

    let mut study_routes = Router::new()
        .route("/", get(handlers::list_studies).post(handlers::create_study))
        .route("/test", get(handlers::studies_test))
        .route(
            "/:id",
            get(handlers::get_study).delete(handlers::delete_study),
        )
        .route("/:id/status", patch(handlers::update_study_status));

    let mut dicom_routes = Router::new()
        .route("/test", get(handlers::dicom_test))
        .route("/studies", get(handlers::list_dicom_studies))
        .route(
            "/studies/:study_id",
            get(handlers::get_dicom_study).delete(handlers::delete_dicom_study),
        )
        .route(
            "/upload",
            post(handlers::upload_dicom).layer(DefaultBodyLimit::disable()),
        );

    if state.settings.protect_api {
        patient_routes = patient_routes.route_layer(guard.clone());
        study_routes = study_routes.route_layer(guard.clone());
        dicom_routes = dicom_routes.route_layer(guard);
    }

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api", get(handlers::api_root))
        .nest("/api/auth", auth_routes)
        .nest("/api/patients", patient_routes)
        .nest("/api/studies", study_routes)
        .nest("/api/dicom", dicom_routes)
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(state.clone(), redact_internal_errors))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP 服务
pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            app: create_app(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}
