//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FieldError, PacsError};

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Doctor,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Doctor => write!(f, "doctor"),
        }
    }
}

/// 用户信息（含口令哈希，不直接序列化给客户端）
#[derive(Debug, Clone)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub role: UserRole,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    /// 去除敏感字段后的公开资料
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

/// 用户公开资料
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub first_name: String,
    pub last_name: String,
}

/// 检查状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StudyStatus {
    Completed,
    InProgress,
    Cancelled,
}

impl StudyStatus {
    pub const ALL: [StudyStatus; 3] = [
        StudyStatus::Completed,
        StudyStatus::InProgress,
        StudyStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyStatus::Completed => "completed",
            StudyStatus::InProgress => "in_progress",
            StudyStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudyStatus {
    type Err = PacsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StudyStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                PacsError::Validation(vec![FieldError::new(
                    "status",
                    "must be one of completed, in_progress, cancelled",
                )
                .with_value(s)])
            })
    }
}

/// 本地检查记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub id: u64,
    pub study_id: String,
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    pub patient_id: u64,
    pub patient_name: String,
    pub modality: String,
    pub description: String,
    pub study_date: String,
    pub study_time: String,
    pub accession_number: String,
    pub referring_physician: String,
    pub institution_name: String,
    pub series_count: u32,
    pub instance_count: u32,
    pub status: StudyStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// 新建检查的输入，id 由仓储分配
#[derive(Debug, Clone)]
pub struct NewStudy {
    pub study_id: String,
    pub study_instance_uid: String,
    pub patient_id: u64,
    pub patient_name: String,
    pub modality: String,
    pub description: String,
    pub study_date: String,
    pub study_time: String,
    pub accession_number: String,
    pub referring_physician: String,
    pub institution_name: String,
    pub series_count: u32,
    pub instance_count: u32,
    pub status: StudyStatus,
}

impl NewStudy {
    pub fn into_study(self, id: u64, created_at: DateTime<Utc>) -> Study {
        Study {
            id,
            study_id: self.study_id,
            study_instance_uid: self.study_instance_uid,
            patient_id: self.patient_id,
            patient_name: self.patient_name,
            modality: self.modality,
            description: self.description,
            study_date: self.study_date,
            study_time: self.study_time,
            accession_number: self.accession_number,
            referring_physician: self.referring_physician,
            institution_name: self.institution_name,
            series_count: self.series_count,
            instance_count: self.instance_count,
            status: self.status,
            created_at,
            updated_at: None,
        }
    }
}

/// PACS 患者在本应用中的投影
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: String,
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub study_count: usize,
    pub last_study_date: String,
    pub orthanc_id: String,
}

/// PACS 检查摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudySummary {
    pub id: String,
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    pub patient_name: String,
    pub patient_id: String,
    pub study_date: String,
    pub study_time: String,
    pub study_description: String,
    pub modality: String,
    pub accession_number: String,
    pub series_count: usize,
    pub instances_count: u64,
}

/// 检查详情中的患者部分
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyPatient {
    pub name: String,
    pub id: String,
    pub birth_date: String,
    pub sex: String,
}

/// 检查详情中的检查属性
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyAttributes {
    pub date: String,
    pub time: String,
    pub description: String,
    pub accession_number: String,
}

/// 系列摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
    pub id: String,
    pub modality: String,
    pub description: String,
    pub instance_count: u64,
    pub series_number: String,
}

/// 查看器链接
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerUrls {
    pub orthanc: String,
    pub stone: String,
    pub osimis: String,
}

/// PACS 检查详情
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyDetail {
    pub id: String,
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    pub patient: StudyPatient,
    pub study: StudyAttributes,
    pub series: Vec<SeriesSummary>,
    pub viewer_urls: ViewerUrls,
}

/// 本地落盘状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    UploadedLocally,
    UploadedToPacs,
}

/// 转发至 PACS 的状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrthancStatus {
    Pending,
    Uploaded,
    Failed,
}

/// 单个上传文件的处理结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub local_path: String,
    pub upload_time: DateTime<Utc>,
    pub status: UploadStatus,
    pub orthanc_status: OrthancStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orthanc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orthanc_error: Option<String>,
}

impl UploadResult {
    pub fn is_uploaded(&self) -> bool {
        self.orthanc_status == OrthancStatus::Uploaded
    }
}

/// 被拒收的上传文件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RejectedFile {
    pub original_name: String,
    pub error: String,
    pub message: String,
}
