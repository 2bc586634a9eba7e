//! 过滤、搜索与分页
//!
//! 本地检查与 PACS 列表共用同一套语义：先全部过滤（合取），再分页。

use pacs_core::{
    utils::dicom_date_to_iso, PatientSummary, Result, Study, StudyStatus, StudySummary,
};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::validation::Validator;

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;

const STATUS_VALUES: [&str; 3] = ["completed", "in_progress", "cancelled"];

/// 分页参数，`page >= 1`，`1 <= limit <= 100`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    fn read(v: &mut Validator) -> Self {
        let page = v.optional_int("page", Some((1, i64::MAX)), "Page must be an integer >= 1");
        let limit = v.optional_int(
            "limit",
            Some((1, MAX_LIMIT as i64)),
            "Limit must be an integer between 1 and 100",
        );
        Self {
            page: page.map_or(DEFAULT_PAGE, |p| p as usize),
            limit: limit.map_or(DEFAULT_LIMIT, |l| l as usize),
        }
    }

    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let mut v = Validator::from_query(params);
        let pagination = Self::read(&mut v);
        v.finish()?;
        Ok(pagination)
    }

    fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// 一页结果
#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total: usize,
    pub limit: usize,
}

impl<T> Paged<T> {
    /// 响应中的 `pagination` 对象，`total_key` 如 `totalStudies`
    pub fn pagination_json(&self, total_key: &str) -> Value {
        let mut value = json!({
            "currentPage": self.current_page,
            "totalPages": self.total_pages,
            "limit": self.limit,
        });
        value[total_key] = json!(self.total);
        value
    }
}

/// 返回 `items[(page-1)*limit .. page*limit]`，`total_pages = ceil(total / limit)`
pub fn paginate<T>(items: Vec<T>, pagination: &Pagination) -> Paged<T> {
    let total = items.len();
    let limit = pagination.limit.max(1);
    let total_pages = total.div_ceil(limit);

    let items = items
        .into_iter()
        .skip(pagination.offset())
        .take(limit)
        .collect();

    Paged {
        items,
        current_page: pagination.page,
        total_pages,
        total,
        limit,
    }
}

/// 大小写不敏感的子串匹配，`needle` 须已转小写
pub fn matches_search<'a>(fields: impl IntoIterator<Item = &'a str>, needle: &str) -> bool {
    fields
        .into_iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// 按首次出现顺序去重
pub fn distinct<T: PartialEq>(values: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// 可被检查过滤器匹配的记录
pub trait StudyRecord {
    fn patient_key(&self) -> Cow<'_, str>;
    fn modality(&self) -> &str;
    fn status(&self) -> Option<StudyStatus>;
    /// `YYYY-MM-DD` 形式的检查日期
    fn study_date_iso(&self) -> Cow<'_, str>;
    fn search_fields(&self) -> Vec<&str>;
}

impl StudyRecord for Study {
    fn patient_key(&self) -> Cow<'_, str> {
        Cow::Owned(self.patient_id.to_string())
    }

    fn modality(&self) -> &str {
        &self.modality
    }

    fn status(&self) -> Option<StudyStatus> {
        Some(self.status)
    }

    fn study_date_iso(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.study_date.as_str())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.study_id.as_str(),
            self.description.as_str(),
            self.patient_name.as_str(),
            self.accession_number.as_str(),
        ]
    }
}

impl StudyRecord for StudySummary {
    fn patient_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.patient_id.as_str())
    }

    fn modality(&self) -> &str {
        &self.modality
    }

    fn status(&self) -> Option<StudyStatus> {
        None
    }

    fn study_date_iso(&self) -> Cow<'_, str> {
        Cow::Owned(dicom_date_to_iso(&self.study_date))
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.id.as_str(),
            self.study_description.as_str(),
            self.patient_name.as_str(),
            self.accession_number.as_str(),
        ]
    }
}

/// 检查过滤条件来源：本地表或 PACS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScope {
    Local,
    Remote,
}

/// 检查过滤条件，各条件之间为合取
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyFilter {
    pub patient_id: Option<String>,
    pub modality: Option<String>,
    pub status: Option<StudyStatus>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// 已转小写
    pub search: Option<String>,
}

impl StudyFilter {
    pub fn matches<R: StudyRecord>(&self, record: &R) -> bool {
        if let Some(patient_id) = &self.patient_id {
            if record.patient_key() != patient_id.as_str() {
                return false;
            }
        }

        if let Some(modality) = &self.modality {
            if !record.modality().eq_ignore_ascii_case(modality) {
                return false;
            }
        }

        if let Some(status) = self.status {
            if record.status() != Some(status) {
                return false;
            }
        }

        // 零填充的 YYYY-MM-DD 可直接按字典序比较
        let date = record.study_date_iso();
        if let Some(from) = &self.date_from {
            if &*date < from.as_str() {
                return false;
            }
        }

        if let Some(to) = &self.date_to {
            if &*date > to.as_str() {
                return false;
            }
        }

        if let Some(needle) = &self.search {
            if !matches_search(record.search_fields(), needle) {
                return false;
            }
        }

        true
    }

    pub fn apply<R: StudyRecord>(&self, records: Vec<R>) -> Vec<R> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

/// 检查列表的完整查询：过滤 + 分页
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyQuery {
    pub filter: StudyFilter,
    pub pagination: Pagination,
}

impl StudyQuery {
    /// 校验全部参数；任一参数非法时整体失败，不部分应用
    pub fn from_params(params: &HashMap<String, String>, scope: FilterScope) -> Result<Self> {
        let mut v = Validator::from_query(params);

        let patient_id = match scope {
            FilterScope::Local => v
                .optional_int("patientId", None, "Patient ID must be an integer")
                .map(|id| id.to_string()),
            FilterScope::Remote => v.optional_string("patientId", "Patient ID must be a string"),
        };
        let modality = v.optional_string("modality", "Modality must be a string");
        let status = match scope {
            FilterScope::Local => v.optional_one_of(
                "status",
                &STATUS_VALUES,
                "Status must be one of completed, in_progress, cancelled",
            ),
            FilterScope::Remote => {
                if params.contains_key("status") {
                    v.optional_one_of("status", &[], "Status filter is not available for PACS studies");
                }
                None
            }
        };
        let date_from = v.optional_iso8601("dateFrom", "dateFrom must be an ISO 8601 date");
        let date_to = v.optional_iso8601("dateTo", "dateTo must be an ISO 8601 date");
        let search = v.optional_string("search", "Search must be a string");
        let pagination = Pagination::read(&mut v);

        v.finish()?;

        let status = status
            .map(|s| s.parse::<StudyStatus>())
            .transpose()?;

        Ok(Self {
            filter: StudyFilter {
                patient_id,
                modality: modality.filter(|m| !m.is_empty()),
                status,
                date_from,
                date_to,
                search: search.filter(|s| !s.is_empty()).map(|s| s.to_lowercase()),
            },
            pagination,
        })
    }
}

/// 患者列表查询
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientQuery {
    /// 已转小写
    pub search: Option<String>,
    pub pagination: Pagination,
}

impl PatientQuery {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let mut v = Validator::from_query(params);
        let search = v.optional_string("search", "Search must be a string");
        let pagination = Pagination::read(&mut v);
        v.finish()?;

        Ok(Self {
            search: search.filter(|s| !s.is_empty()).map(|s| s.to_lowercase()),
            pagination,
        })
    }

    pub fn matches(&self, patient: &PatientSummary) -> bool {
        match &self.search {
            Some(needle) => matches_search(
                [
                    patient.orthanc_id.as_str(),
                    patient.patient_id.as_str(),
                    patient.full_name.as_str(),
                ],
                needle,
            ),
            None => true,
        }
    }
}
