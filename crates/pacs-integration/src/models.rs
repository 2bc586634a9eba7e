//! Orthanc REST 接口的数据结构

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// DICOM 主标签集合
pub type MainDicomTags = HashMap<String, String>;

/// 读取标签值，缺失或为空时返回默认值
pub fn tag<'a>(tags: &'a MainDicomTags, name: &str, default: &'a str) -> &'a str {
    tags.get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

/// `/patients/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrthancPatient {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "MainDicomTags", default)]
    pub main_dicom_tags: MainDicomTags,
    #[serde(rename = "Studies", default)]
    pub studies: Vec<String>,
    #[serde(rename = "LastUpdate", default)]
    pub last_update: Option<String>,
}

/// `/studies/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrthancStudy {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "MainDicomTags", default)]
    pub main_dicom_tags: MainDicomTags,
    #[serde(rename = "PatientMainDicomTags", default)]
    pub patient_main_dicom_tags: MainDicomTags,
    #[serde(rename = "ParentPatient", default)]
    pub parent_patient: String,
    #[serde(rename = "Series", default)]
    pub series: Vec<String>,
    #[serde(rename = "CountInstances", default)]
    pub count_instances: Option<u64>,
    #[serde(rename = "LastUpdate", default)]
    pub last_update: Option<String>,
}

/// `/series/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrthancSeries {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "MainDicomTags", default)]
    pub main_dicom_tags: MainDicomTags,
    #[serde(rename = "Instances", default)]
    pub instances: Vec<String>,
    #[serde(rename = "CountInstances", default)]
    pub count_instances: Option<u64>,
}

impl OrthancSeries {
    /// 优先使用 PACS 给出的计数，否则按实例列表计算
    pub fn instance_count(&self) -> u64 {
        self.count_instances
            .unwrap_or(self.instances.len() as u64)
    }
}

/// `POST /instances` 的响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrthancUploadResponse {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "ParentStudy", default)]
    pub parent_study: Option<String>,
    #[serde(rename = "ParentSeries", default)]
    pub parent_series: Option<String>,
    #[serde(rename = "ParentPatient", default)]
    pub parent_patient: Option<String>,
}
