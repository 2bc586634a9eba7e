//! 路由级测试：真实的路由、认证与 Orthanc 客户端，PACS 由进程内的模拟服务代替

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Path, State},
    http::{header, Method, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use async_trait::async_trait;
use pacs_core::{NewStudy, PacsError, Study, StudyStatus};
use pacs_database::{
    default_studies, default_users, InMemoryStudyRepository, InMemoryUserRepository,
    StudyRepository,
};
use pacs_integration::{Authentication, OrthancClient, OrthancConfig, PacsClient};
use pacs_storage::UploadStorage;
use pacs_web::{
    create_app, hash_seed_users, AppState, AuthService, FanOutAggregator, FanOutLimits, Settings,
    UploadLimits, UploadRelay,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

const BOUNDARY: &str = "----medimg-test-boundary";

struct TestApp {
    app: Router,
    uploads: Arc<AtomicUsize>,
    upload_dir: TempDir,
}

fn patient_json(id: &str) -> Option<Value> {
    let (name, patient_id, sex) = match id {
        "p1" => ("Doe^John", "PAT001", "M"),
        "p2" => ("Smith^Jane", "PAT002", "F"),
        _ => return None,
    };
    Some(json!({
        "ID": id,
        "MainDicomTags": {
            "PatientName": name,
            "PatientID": patient_id,
            "PatientSex": sex,
            "PatientBirthDate": "19800101"
        },
        "Studies": ["s1"],
        "LastUpdate": "20240120T101500"
    }))
}

fn study_json(id: &str) -> Option<Value> {
    let (parent, modality, date, series) = match id {
        "s1" => ("p1", "CT", "20240115", json!(["se1"])),
        "s2" => ("p2", "MR", "20240220", json!([])),
        _ => return None,
    };
    Some(json!({
        "ID": id,
        "MainDicomTags": {
            "StudyInstanceUID": format!("1.2.840.99.{}", id.len()),
            "StudyDate": date,
            "StudyDescription": format!("{} study", modality),
            "Modality": modality,
            "AccessionNumber": format!("ACC-{}", id)
        },
        "ParentPatient": parent,
        "Series": series,
        "CountInstances": 3
    }))
}

fn lookup(found: Option<Value>) -> (StatusCode, Json<Value>) {
    match found {
        Some(body) => (StatusCode::OK, Json(body)),
        None => (StatusCode::NOT_FOUND, Json(json!({}))),
    }
}

/// 模拟的 Orthanc：两个患者、两个检查、一个系列；内容以 `BAD` 开头的实例上传返回 400
async fn spawn_mock_orthanc(uploads: Arc<AtomicUsize>) -> String {
    let app = Router::new()
        .route("/system", get(|| async { Json(json!({ "Version": "1.12.1" })) }))
        .route("/patients", get(|| async { Json(json!(["p1", "p2"])) }))
        .route(
            "/patients/:id",
            get(|Path(id): Path<String>| async move { lookup(patient_json(&id)) }),
        )
        .route("/studies", get(|| async { Json(json!(["s1", "s2"])) }))
        .route(
            "/studies/:id",
            get(|Path(id): Path<String>| async move { lookup(study_json(&id)) }).delete(
                |Path(id): Path<String>| async move {
                    if id == "s1" {
                        StatusCode::OK
                    } else {
                        StatusCode::NOT_FOUND
                    }
                },
            ),
        )
        .route(
            "/series/:id",
            get(|Path(id): Path<String>| async move {
                lookup((id == "se1").then(|| {
                    json!({
                        "ID": "se1",
                        "MainDicomTags": { "Modality": "CT", "SeriesNumber": "2", "SeriesDescription": "Axial" },
                        "Instances": ["i1", "i2", "i3"]
                    })
                }))
            }),
        )
        .route(
            "/instances",
            post(
                |State(uploads): State<Arc<AtomicUsize>>, body: Bytes| async move {
                    let n = uploads.fetch_add(1, Ordering::SeqCst);
                    if body.starts_with(b"BAD") {
                        return (StatusCode::BAD_REQUEST, Json(json!({})));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({ "ID": format!("inst-{}", n), "Status": "Success" })),
                    )
                },
            ),
        )
        .with_state(uploads);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// 内部故障的仓储：列表返回 IO 错误，按 id 查询直接 panic
struct BrokenStudies;

#[async_trait]
impl StudyRepository for BrokenStudies {
    async fn list(&self) -> pacs_core::Result<Vec<Study>> {
        Err(PacsError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "/var/lib/medimg/studies: disk quota exceeded",
        )))
    }

    async fn get(&self, _id: u64) -> pacs_core::Result<Option<Study>> {
        panic!("study table lock poisoned");
    }

    async fn create(&self, _study: NewStudy) -> pacs_core::Result<Study> {
        Err(PacsError::Internal("write-ahead log unavailable".into()))
    }

    async fn update_status(&self, _id: u64, _status: StudyStatus) -> pacs_core::Result<Study> {
        Err(PacsError::Internal("write-ahead log unavailable".into()))
    }

    async fn delete(&self, _id: u64) -> pacs_core::Result<Study> {
        Err(PacsError::Internal("write-ahead log unavailable".into()))
    }
}

fn seeded_studies() -> Arc<dyn StudyRepository> {
    Arc::new(InMemoryStudyRepository::new(default_studies()))
}

async fn build_app(
    pacs_base: &str,
    settings: Settings,
    uploads: Arc<AtomicUsize>,
    studies: Arc<dyn StudyRepository>,
) -> TestApp {
    let pacs: Arc<dyn PacsClient> = Arc::new(
        OrthancClient::new(OrthancConfig {
            proxy_url: pacs_base.to_string(),
            direct_url: pacs_base.to_string(),
            direct_auth: Authentication::BasicAuth {
                username: "orthanc".into(),
                password: "orthanc".into(),
            },
            upload_timeout: Duration::from_secs(5),
        })
        .unwrap(),
    );

    let users = hash_seed_users(default_users()).unwrap();
    let upload_dir = tempfile::tempdir().unwrap();

    let state = AppState {
        auth: Arc::new(AuthService::new(
            Arc::new(InMemoryUserRepository::new(users)),
            "integration-secret",
            24,
        )
        .unwrap()),
        studies,
        aggregator: Arc::new(FanOutAggregator::new(pacs.clone(), FanOutLimits::default())),
        relay: Arc::new(UploadRelay::new(
            UploadStorage::new(upload_dir.path()),
            pacs.clone(),
            UploadLimits::default(),
        )),
        pacs,
        settings: Arc::new(settings),
    };

    TestApp {
        app: create_app(state),
        uploads,
        upload_dir,
    }
}

async fn spawn_app(settings: Settings) -> TestApp {
    let uploads = Arc::new(AtomicUsize::new(0));
    let base = spawn_mock_orthanc(uploads.clone()).await;
    build_app(&base, settings, uploads, seeded_studies()).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_req(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// (字段名, 文件名, Content-Type, 内容)
fn multipart_req(parts: &[(&str, Option<&str>, &str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, filename, content_type, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    field, name, content_type
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", field).as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/dicom/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        json_req(
            Method::POST,
            "/api/auth/login",
            json!({ "username": username, "password": password }),
        ),
    )
    .await
}

#[tokio::test]
async fn login_then_me() {
    let t = spawn_app(Settings::default()).await;

    let (status, body) = login(&t.app, "doctor", "doctor123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expiresIn"], "24h");
    assert_eq!(body["user"]["firstName"], "Dr. John");
    assert!(body["user"].get("password").is_none());
    assert!(body["user"].get("passwordHash").is_none());

    let token = body["token"].as_str().unwrap();
    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, me) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "doctor");
    assert_eq!(me["role"], "doctor");
}

#[tokio::test]
async fn me_requires_valid_token() {
    let t = spawn_app(Settings::default()).await;

    let (status, body) = send(&t.app, get_req("/api/auth/me")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "MISSING_TOKEN");

    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn login_failures() {
    let t = spawn_app(Settings::default()).await;

    let (status, body) = login(&t.app, "admin", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let (status, unknown) = login(&t.app, "ghost", "admin123").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown["message"], body["message"]);

    let (status, body) = login(&t.app, "", "ab").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<_> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(fields, vec!["username", "password"]);
}

#[tokio::test]
async fn auth_test_lists_users_without_secrets() {
    let t = spawn_app(Settings::default()).await;
    let (status, body) = send(&t.app, get_req("/api/auth/test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["availableUsers"],
        json!([
            { "username": "admin", "role": "admin" },
            { "username": "doctor", "role": "doctor" }
        ])
    );
}

#[tokio::test]
async fn studies_filter_and_paginate() {
    let t = spawn_app(Settings::default()).await;

    let (status, body) = send(&t.app, get_req("/api/studies?modality=CT&status=completed")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["studies"].as_array().unwrap().len(), 1);
    assert_eq!(body["studies"][0]["studyId"], "STU001");
    assert_eq!(body["filters"]["modalities"], json!(["CT", "MRI", "X-RAY", "US"]));
    assert_eq!(body["filters"]["statuses"], json!(["completed", "in_progress"]));

    let (_, body) = send(&t.app, get_req("/api/studies?limit=3&page=2")).await;
    assert_eq!(body["studies"].as_array().unwrap().len(), 1);
    assert_eq!(body["studies"][0]["studyId"], "STU004");
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["pagination"]["totalStudies"], 4);
    assert_eq!(body["pagination"]["currentPage"], 2);

    let (_, body) = send(&t.app, get_req("/api/studies?search=DOE")).await;
    assert_eq!(body["pagination"]["totalStudies"], 2);
}

#[tokio::test]
async fn studies_reject_bad_query() {
    let t = spawn_app(Settings::default()).await;
    let (status, body) = send(&t.app, get_req("/api/studies?limit=0&status=archived")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn create_study_and_conflict() {
    let t = spawn_app(Settings::default()).await;
    let payload = json!({
        "studyId": "STU100",
        "patientId": 2,
        "patientName": "Jane Smith",
        "modality": "CT",
        "description": "Follow-up CT",
        "studyDate": "2024-03-01"
    });

    let (status, body) = send(&t.app, json_req(Method::POST, "/api/studies", payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["study"]["id"], 5);
    assert_eq!(body["study"]["status"], "in_progress");
    assert_eq!(body["study"]["institutionName"], "Central Medical Center");
    assert_eq!(body["study"]["seriesCount"], 0);

    let duplicate = json!({
        "studyId": "STU100",
        "patientId": 9,
        "modality": "MRI",
        "description": "Should not replace",
        "studyDate": "2024-03-02"
    });
    let (status, body) = send(&t.app, json_req(Method::POST, "/api/studies", duplicate)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, body) = send(&t.app, get_req("/api/studies/5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "Follow-up CT");

    let (_, body) = send(&t.app, get_req("/api/studies/test")).await;
    assert_eq!(body["totalStudies"], 5);
}

#[tokio::test]
async fn create_study_validation() {
    let t = spawn_app(Settings::default()).await;
    let (status, body) = send(
        &t.app,
        json_req(Method::POST, "/api/studies", json!({ "patientId": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<_> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        fields,
        vec!["studyId", "patientId", "modality", "description", "studyDate"]
    );
}

#[tokio::test]
async fn update_status_and_delete() {
    let t = spawn_app(Settings::default()).await;

    let (status, _) = send(
        &t.app,
        json_req(Method::PATCH, "/api/studies/42/status", json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &t.app,
        json_req(Method::PATCH, "/api/studies/4/status", json!({ "status": "archived" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &t.app,
        json_req(Method::PATCH, "/api/studies/4/status", json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["study"]["status"], "completed");
    assert!(body["study"]["updatedAt"].is_string());

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/api/studies/4")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["study"]["studyId"], "STU004");

    let (status, _) = send(&t.app, get_req("/api/studies/4")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&t.app, get_req("/api/studies/not-a-number")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patients_from_pacs() {
    let t = spawn_app(Settings::default()).await;

    let (status, body) = send(&t.app, get_req("/api/patients")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "orthanc");
    assert_eq!(body["totalInPacs"], 2);
    assert_eq!(body["truncated"], false);
    assert_eq!(body["patients"][0]["firstName"], "John");
    assert_eq!(body["patients"][0]["lastName"], "Doe");
    assert_eq!(body["pagination"]["totalPatients"], 2);

    let (_, body) = send(&t.app, get_req("/api/patients?search=smith")).await;
    assert_eq!(body["patients"].as_array().unwrap().len(), 1);
    assert_eq!(body["patients"][0]["patientId"], "PAT002");

    let (status, body) = send(&t.app, get_req("/api/patients/p2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gender"], "F");

    let (status, body) = send(&t.app, get_req("/api/patients/p404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "REMOTE_NOT_FOUND");
}

#[tokio::test]
async fn dicom_studies_and_detail() {
    let t = spawn_app(Settings::default()).await;

    let (status, body) = send(&t.app, get_req("/api/dicom/studies?modality=mr")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalInPacs"], 2);
    assert_eq!(body["studies"].as_array().unwrap().len(), 1);
    assert_eq!(body["studies"][0]["patientName"], "Smith^Jane");
    assert_eq!(body["filters"]["modalities"], json!(["CT", "MR"]));

    let (status, body) = send(&t.app, get_req("/api/dicom/studies/s1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["patient"]["id"], "PAT001");
    assert_eq!(body["series"][0]["instanceCount"], 3);
    assert!(body["viewerUrls"]["orthanc"]
        .as_str()
        .unwrap()
        .ends_with("/app/explorer.html#study?uuid=s1"));

    let (status, _) = send(&t.app, get_req("/api/dicom/studies/s9")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // 编码的斜杠不能逃出检查资源
    let traversal = Request::builder()
        .method(Method::DELETE)
        .uri("/api/dicom/studies/..%2Fpatients%2Fp1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, traversal).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "REMOTE_NOT_FOUND");

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/api/dicom/studies/s1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["studyId"], "s1");
}

#[tokio::test]
async fn upload_rejects_per_file() {
    let t = spawn_app(Settings::default()).await;

    let request = multipart_req(&[
        ("dicomFiles", Some("one.dcm"), "application/dicom", &b"DICM-1"[..]),
        ("dicomFiles", Some("notes.txt"), "text/plain", &b"not dicom"[..]),
        ("dicomFiles[]", Some("three"), "application/octet-stream", &b"BAD-3"[..]),
    ]);
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalFiles"], 2);
    assert_eq!(body["pacsUploaded"], 1);
    assert_eq!(body["message"], "DICOM files processed: 1/2 uploaded to PACS");
    assert_eq!(body["rejected"][0]["originalName"], "notes.txt");
    assert_eq!(body["rejected"][0]["error"], "INVALID_FILE_TYPE");
    assert_eq!(body["files"][0]["orthancStatus"], "uploaded");
    assert_eq!(body["files"][0]["status"], "uploaded_to_pacs");
    assert_eq!(body["files"][1]["orthancStatus"], "failed");
    assert_eq!(body["files"][1]["orthancError"], "400: Bad Request");
    assert_eq!(t.uploads.load(Ordering::SeqCst), 2);

    // 两个接收的文件都已落盘
    let stored = std::fs::read_dir(t.upload_dir.path()).unwrap().count();
    assert_eq!(stored, 2);
}

#[tokio::test]
async fn upload_without_files_makes_no_pacs_calls() {
    let t = spawn_app(Settings::default()).await;

    let request = multipart_req(&[("comment", None, "", &b"hello"[..])]);
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_FILES_PROVIDED");

    // 字段名正确但不是文件
    let request = multipart_req(&[("dicomFiles", None, "", &b"DICM-inline"[..])]);
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_FILES_PROVIDED");

    let not_multipart = json_req(Method::POST, "/api/dicom/upload", json!({}));
    let (status, _) = send(&t.app, not_multipart).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(t.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn probes_report_connectivity() {
    let t = spawn_app(Settings::default()).await;
    let (status, body) = send(&t.app, get_req("/api/dicom/test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orthancStatus"], "Connected");
    assert_eq!(body["orthancVersion"], "1.12.1");

    // 无人监听的地址
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let t = build_app(
        &dead,
        Settings::default(),
        Arc::new(AtomicUsize::new(0)),
        seeded_studies(),
    )
    .await;
    for uri in ["/api/dicom/test", "/api/patients/test"] {
        let (status, body) = send(&t.app, get_req(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["orthancStatus"], "Disconnected");
    }

    let (status, body) = send(&t.app, get_req("/api/patients")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "REMOTE_UNAVAILABLE");
}

#[tokio::test]
async fn health_index_and_fallback() {
    let t = spawn_app(Settings::default()).await;

    let (status, body) = send(&t.app, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["environment"], "development");

    let (status, body) = send(&t.app, get_req("/api")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["studies"]["list"], "GET /api/studies");

    let (status, body) = send(&t.app, get_req("/api/nothing-here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Route not found");
    assert_eq!(body["message"], "Cannot GET /api/nothing-here");
}

#[tokio::test]
async fn protected_api_requires_token() {
    let settings = Settings {
        protect_api: true,
        ..Settings::default()
    };
    let t = spawn_app(settings).await;

    let (status, _) = send(&t.app, get_req("/api/studies")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = login(&t.app, "admin", "admin123").await;
    let token = body["token"].as_str().unwrap().to_string();
    let request = Request::builder()
        .uri("/api/studies")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);

    // 健康检查和登录不受影响
    let (status, _) = send(&t.app, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn internal_errors_are_generic_in_production() {
    let uploads = Arc::new(AtomicUsize::new(0));
    let base = spawn_mock_orthanc(uploads.clone()).await;
    let settings = Settings {
        environment: "production".to_string(),
        development: false,
        protect_api: false,
    };
    let t = build_app(&base, settings, uploads, Arc::new(BrokenStudies)).await;

    let (status, body) = send(&t.app, get_req("/api/studies")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert_eq!(body["message"], "Internal server error");
    assert!(!body.to_string().contains("quota"));

    let (status, body) = send(
        &t.app,
        json_req(Method::PATCH, "/api/studies/1/status", json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");

    // panic 由兜底层转换
    let (status, body) = send(&t.app, get_req("/api/studies/1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");
    assert!(!body.to_string().contains("poisoned"));

    // 客户端错误不受影响
    let (status, body) = send(&t.app, get_req("/api/studies?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn internal_errors_keep_detail_in_development() {
    let uploads = Arc::new(AtomicUsize::new(0));
    let base = spawn_mock_orthanc(uploads.clone()).await;
    let t = build_app(&base, Settings::default(), uploads, Arc::new(BrokenStudies)).await;

    let (status, body) = send(&t.app, get_req("/api/studies")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("disk quota exceeded"));
}
