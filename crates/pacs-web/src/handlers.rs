//! HTTP处理器

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, Path, Query, State},
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use pacs_core::{utils::generate_study_instance_uid, NewStudy, PacsError, StudyStatus};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::ApiResult;
use crate::query::{distinct, paginate, FilterScope, PatientQuery, StudyQuery};
use crate::server::AppState;
use crate::validation::{parse_body, Validator};

const DEFAULT_INSTITUTION: &str = "Central Medical Center";
const STATUS_VALUES: [&str; 3] = ["completed", "in_progress", "cancelled"];
const UPLOAD_FIELDS: [&str; 2] = ["dicomFiles", "dicomFiles[]"];

/// 健康检查处理器
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "message": "Medical Imaging Server is running",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.settings.environment,
        "services": {
            "orthanc": format!("Available on {}", state.pacs.direct_url()),
        }
    }))
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "message": "Medical Imaging Platform API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": {
                "login": "POST /api/auth/login",
                "me": "GET /api/auth/me",
                "test": "GET /api/auth/test"
            },
            "patients": {
                "list": "GET /api/patients",
                "get": "GET /api/patients/:id",
                "test": "GET /api/patients/test"
            },
            "studies": {
                "list": "GET /api/studies",
                "create": "POST /api/studies",
                "get": "GET /api/studies/:id",
                "updateStatus": "PATCH /api/studies/:id/status",
                "delete": "DELETE /api/studies/:id",
                "test": "GET /api/studies/test"
            },
            "dicom": {
                "upload": "POST /api/dicom/upload",
                "studies": "GET /api/dicom/studies",
                "study": "GET /api/dicom/studies/:studyId",
                "delete": "DELETE /api/dicom/studies/:studyId",
                "test": "GET /api/dicom/test"
            }
        },
        "documentation": "Visit /health for system status"
    }))
}

/// 未匹配路由
pub async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    warn!(%method, %uri, "Route not found");
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Route not found",
            "message": format!("Cannot {} {}", method, uri),
            "availableRoutes": [
                "GET /health",
                "GET /api",
                "POST /api/auth/login",
                "GET /api/patients",
                "GET /api/studies",
                "GET /api/dicom/studies"
            ]
        })),
    )
}

// ---------------------------------------------------------------------------
// 患者（PACS）
// ---------------------------------------------------------------------------

pub async fn list_patients(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let query = PatientQuery::from_params(&params)?;
    let listing = state.aggregator.list_patients(&query).await?;

    Ok(Json(json!({
        "patients": listing.page.items,
        "pagination": listing.page.pagination_json("totalPatients"),
        "source": "orthanc",
        "totalInPacs": listing.total_in_pacs,
        "truncated": listing.truncated,
    })))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    info!(patient_id = %id, "Fetching patient");
    let patient = state.aggregator.get_patient(&id).await?;
    Ok(Json(patient))
}

/// PACS 连通性自检，失败时仍返回 200
pub async fn patients_test(State(state): State<AppState>) -> impl IntoResponse {
    let proxy_url = state.pacs.proxy_url().to_string();
    match state.pacs.list_patients().await {
        Ok(ids) => Json(json!({
            "message": "Patients routes working with Orthanc connection",
            "orthancStatus": "Connected",
            "totalPatients": ids.len(),
            "orthancUrl": proxy_url,
            "patients": ids.iter().take(5).collect::<Vec<_>>(),
        })),
        Err(e) => {
            warn!(error = %e, "PACS connectivity probe failed");
            Json(json!({
                "message": "Patients routes working but Orthanc connection failed",
                "orthancStatus": "Disconnected",
                "error": e.to_string(),
                "orthancUrl": proxy_url,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// 本地检查
// ---------------------------------------------------------------------------

/// 非数字 id 视为不存在
fn parse_study_id(raw: &str) -> Result<u64, PacsError> {
    raw.parse::<u64>()
        .map_err(|_| PacsError::NotFound("Study not found".to_string()))
}

pub async fn list_studies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let query = StudyQuery::from_params(&params, FilterScope::Local)?;
    let all = state.studies.list().await?;

    let modalities = distinct(all.iter().map(|s| s.modality.clone()));
    let statuses = distinct(all.iter().map(|s| s.status));
    let page = paginate(query.filter.apply(all), &query.pagination);

    Ok(Json(json!({
        "studies": page.items,
        "pagination": page.pagination_json("totalStudies"),
        "filters": {
            "modalities": modalities,
            "statuses": statuses,
        }
    })))
}

pub async fn studies_test(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let all = state.studies.list().await?;
    Ok(Json(json!({
        "message": "Studies routes are working!",
        "totalStudies": all.len(),
        "modalities": distinct(all.iter().map(|s| s.modality.clone())),
    })))
}

pub async fn get_study(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_study_id(&id)?;
    let study = state
        .studies
        .get(id)
        .await?
        .ok_or_else(|| PacsError::NotFound("Study not found".to_string()))?;
    Ok(Json(study))
}

/// 校验请求体并构造新检查
fn new_study_from_body(body: &Value) -> Result<NewStudy, PacsError> {
    let mut v = Validator::from_body(body);

    let study_id = v.required_string("studyId", "Study ID is required");
    let patient_id = v.required_int_in(
        "patientId",
        Some((0, i64::MAX)),
        "Valid patient ID is required",
    );
    let modality = v.required_string("modality", "Modality is required");
    let description = v.required_string("description", "Description is required");
    let study_date = v.required_iso8601("studyDate", "Valid study date is required");
    let referring_physician =
        v.optional_string("referringPhysician", "Referring physician must be a string");
    let accession_number = v.optional_string("accessionNumber", "Accession number must be a string");
    let patient_name = v.optional_string("patientName", "Patient name must be a string");
    let study_time = v.optional_string("studyTime", "Study time must be a string");
    let institution_name = v.optional_string("institutionName", "Institution name must be a string");
    let status = v.optional_one_of("status", &STATUS_VALUES, "Valid status is required");

    v.finish()?;

    let status = match status {
        Some(s) => s.parse::<StudyStatus>()?,
        None => StudyStatus::InProgress,
    };

    Ok(NewStudy {
        study_id,
        study_instance_uid: generate_study_instance_uid(),
        patient_id: patient_id as u64,
        patient_name: patient_name.unwrap_or_default(),
        modality,
        description,
        study_date,
        study_time: study_time.unwrap_or_default(),
        accession_number: accession_number.unwrap_or_default(),
        referring_physician: referring_physician.unwrap_or_default(),
        institution_name: institution_name.unwrap_or_else(|| DEFAULT_INSTITUTION.to_string()),
        series_count: 0,
        instance_count: 0,
        status,
    })
}

pub async fn create_study(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body = parse_body(&body)?;
    let new_study = new_study_from_body(&body)?;

    let study = state.studies.create(new_study).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Study created successfully",
            "study": study,
        })),
    ))
}

pub async fn update_study_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body = parse_body(&body)?;
    let mut v = Validator::from_body(&body);
    let status = v.required_one_of("status", &STATUS_VALUES, "Valid status is required");
    v.finish()?;

    let status = status.parse::<StudyStatus>()?;
    let id = parse_study_id(&id)?;
    let study = state.studies.update_status(id, status).await?;

    Ok(Json(json!({
        "message": "Study status updated successfully",
        "study": study,
    })))
}

pub async fn delete_study(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_study_id(&id)?;
    let study = state.studies.delete(id).await?;

    Ok(Json(json!({
        "message": "Study deleted successfully",
        "study": study,
    })))
}

// ---------------------------------------------------------------------------
// DICOM（PACS）
// ---------------------------------------------------------------------------

pub async fn list_dicom_studies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let query = StudyQuery::from_params(&params, FilterScope::Remote)?;
    let listing = state.aggregator.list_studies(&query).await?;

    Ok(Json(json!({
        "studies": listing.page.items,
        "pagination": listing.page.pagination_json("totalStudies"),
        "filters": { "modalities": listing.modalities },
        "totalInPacs": listing.total_in_pacs,
        "truncated": listing.truncated,
        "message": "Studies fetched from Orthanc PACS",
    })))
}

pub async fn get_dicom_study(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.aggregator.get_study(&study_id).await?;
    Ok(Json(detail))
}

pub async fn delete_dicom_study(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.pacs.delete_study(&study_id).await?;
    info!(study_id = %study_id, "Study deleted from PACS");

    Ok(Json(json!({
        "message": "Study deleted from PACS successfully",
        "studyId": study_id,
    })))
}

/// 逐个读取 multipart 文件部分并直接写入暂存区；只有带文件名的部分视为文件
pub async fn upload_dicom(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let mut multipart = multipart.map_err(|e| {
        warn!(error = %e, "Upload is not a multipart request");
        PacsError::NoFilesProvided
    })?;

    let mut session = state.relay.session();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PacsError::invalid_field("dicomFiles", e.to_string()))?
    {
        if !field.name().map_or(false, |name| UPLOAD_FIELDS.contains(&name)) {
            continue;
        }
        let Some(original_name) = field.file_name().map(str::to_string) else {
            debug!(field = ?field.name(), "Ignoring non-file upload field");
            continue;
        };
        let content_type = field.content_type().map(str::to_string);

        session
            .accept(&original_name, content_type.as_deref(), field)
            .await?;
    }

    let report = session.finish().await?;

    Ok(Json(json!({
        "message": report.message(),
        "files": report.files,
        "rejected": report.rejected,
        "totalFiles": report.total_files(),
        "pacsUploaded": report.pacs_uploaded(),
        "orthancUrl": format!("{}/app/explorer.html", state.pacs.direct_url()),
    })))
}

/// 同时探测代理端点与直连端点，失败时仍返回 200
pub async fn dicom_test(State(state): State<AppState>) -> impl IntoResponse {
    let proxy_url = state.pacs.proxy_url().to_string();
    let direct_url = state.pacs.direct_url().to_string();

    let probe = async {
        let system = state.pacs.system_info().await?;
        state.pacs.system_info_direct().await?;
        Ok::<Value, PacsError>(system)
    };

    match probe.await {
        Ok(system) => Json(json!({
            "message": "DICOM routes working with Orthanc connection",
            "orthancStatus": "Connected",
            "orthancVersion": system.get("Version").cloned().unwrap_or(Value::Null),
            "proxyUrl": proxy_url,
            "directUrl": direct_url,
            "authConfigured": true,
        })),
        Err(e) => {
            warn!(error = %e, "PACS connectivity probe failed");
            Json(json!({
                "message": "DICOM routes working but Orthanc connection failed",
                "orthancStatus": "Disconnected",
                "error": e.to_string(),
                "proxyUrl": proxy_url,
                "directUrl": direct_url,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_study_defaults() {
        let study = new_study_from_body(&json!({
            "studyId": "STU100",
            "patientId": "7",
            "modality": "CT",
            "description": "Head CT",
            "studyDate": "2024-02-01"
        }))
        .unwrap();

        assert_eq!(study.patient_id, 7);
        assert_eq!(study.status, StudyStatus::InProgress);
        assert_eq!(study.institution_name, DEFAULT_INSTITUTION);
        assert_eq!(study.series_count, 0);
        assert!(pacs_core::utils::is_valid_dicom_uid(&study.study_instance_uid));
    }

    #[test]
    fn test_new_study_reports_every_bad_field() {
        let err = new_study_from_body(&json!({
            "patientId": -1,
            "modality": "",
            "studyDate": "yesterday",
            "status": "archived"
        }))
        .unwrap_err();

        match err {
            PacsError::Validation(errors) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(
                    fields,
                    vec!["studyId", "patientId", "modality", "description", "studyDate", "status"]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_study_id_is_not_found() {
        assert!(matches!(parse_study_id("abc"), Err(PacsError::NotFound(_))));
        assert_eq!(parse_study_id("12").unwrap(), 12);
    }
}
