//! PACS 数据聚合
//!
//! 先取 ID 列表，再逐个取详情（N+1），详情查询数量受上限约束。
//! 列表接口顺序查询并跳过失败项；检查详情接口并发查询所有系列，任一失败即整体失败。

use async_trait::async_trait;
use futures_util::future::try_join_all;
use pacs_core::{
    utils::split_person_name, PatientSummary, Result, SeriesSummary, StudyAttributes,
    StudyDetail, StudyPatient, StudySummary, ViewerUrls,
};
use pacs_integration::{
    models::tag, OrthancPatient, OrthancSeries, OrthancStudy, PacsClient,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::query::{distinct, paginate, Paged, PatientQuery, StudyQuery};

/// 单次列表请求最多查询多少条详情
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutLimits {
    pub patients: usize,
    pub studies: usize,
}

impl Default for FanOutLimits {
    fn default() -> Self {
        Self {
            patients: 10,
            studies: 20,
        }
    }
}

/// 患者列表结果
#[derive(Debug, Clone)]
pub struct PatientListing {
    pub page: Paged<PatientSummary>,
    /// PACS 中的患者总数（截断前）
    pub total_in_pacs: usize,
    /// 是否因查询上限只处理了部分患者
    pub truncated: bool,
}

/// 检查列表结果
#[derive(Debug, Clone)]
pub struct StudyListing {
    pub page: Paged<StudySummary>,
    pub total_in_pacs: usize,
    pub truncated: bool,
    /// 已获取详情的检查中出现过的模态
    pub modalities: Vec<String>,
}

/// 聚合层接口，处理器只依赖该 trait
#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn list_patients(&self, query: &PatientQuery) -> Result<PatientListing>;

    async fn get_patient(&self, id: &str) -> Result<PatientSummary>;

    async fn list_studies(&self, query: &StudyQuery) -> Result<StudyListing>;

    async fn get_study(&self, id: &str) -> Result<StudyDetail>;
}

/// 基于逐条详情查询的聚合实现
pub struct FanOutAggregator {
    pacs: Arc<dyn PacsClient>,
    limits: FanOutLimits,
}

impl FanOutAggregator {
    pub fn new(pacs: Arc<dyn PacsClient>, limits: FanOutLimits) -> Self {
        Self { pacs, limits }
    }

    async fn study_summary(&self, id: &str) -> Result<StudySummary> {
        let study = self.pacs.get_study(id).await?;
        let patient = self.pacs.get_patient(&study.parent_patient).await?;
        Ok(study_summary(id, &study, &patient))
    }
}

pub fn patient_summary(patient: &OrthancPatient) -> PatientSummary {
    let tags = &patient.main_dicom_tags;
    let full_name = tag(tags, "PatientName", "Unknown Patient").to_string();
    let (first_name, last_name) = split_person_name(&full_name);

    PatientSummary {
        id: patient.id.clone(),
        patient_id: tag(tags, "PatientID", "Unknown").to_string(),
        first_name,
        last_name,
        full_name,
        date_of_birth: tag(tags, "PatientBirthDate", "").to_string(),
        gender: tag(tags, "PatientSex", "U").to_string(),
        study_count: patient.studies.len(),
        last_study_date: patient.last_update.clone().unwrap_or_default(),
        orthanc_id: patient.id.clone(),
    }
}

pub fn study_summary(id: &str, study: &OrthancStudy, patient: &OrthancPatient) -> StudySummary {
    let tags = &study.main_dicom_tags;
    let patient_tags = &patient.main_dicom_tags;

    StudySummary {
        id: id.to_string(),
        study_instance_uid: tag(tags, "StudyInstanceUID", id).to_string(),
        patient_name: tag(patient_tags, "PatientName", "Unknown").to_string(),
        patient_id: tag(patient_tags, "PatientID", "Unknown").to_string(),
        study_date: tag(tags, "StudyDate", "").to_string(),
        study_time: tag(tags, "StudyTime", "").to_string(),
        study_description: tag(tags, "StudyDescription", "No Description").to_string(),
        modality: tag(tags, "Modality", "Unknown").to_string(),
        accession_number: tag(tags, "AccessionNumber", "").to_string(),
        series_count: study.series.len(),
        instances_count: study.count_instances.unwrap_or(0),
    }
}

fn series_summary(series: &OrthancSeries) -> SeriesSummary {
    let tags = &series.main_dicom_tags;
    SeriesSummary {
        id: series.id.clone(),
        modality: tag(tags, "Modality", "").to_string(),
        description: tag(tags, "SeriesDescription", "").to_string(),
        instance_count: series.instance_count(),
        series_number: tag(tags, "SeriesNumber", "").to_string(),
    }
}

/// 基于直连地址拼出三种查看器链接
pub fn viewer_urls(direct_url: &str, study_id: &str) -> ViewerUrls {
    ViewerUrls {
        orthanc: format!("{}/app/explorer.html#study?uuid={}", direct_url, study_id),
        stone: format!("{}/stone-webviewer/index.html?study={}", direct_url, study_id),
        osimis: format!("{}/osimis-viewer/app/index.html?study={}", direct_url, study_id),
    }
}

#[async_trait]
impl Aggregator for FanOutAggregator {
    async fn list_patients(&self, query: &PatientQuery) -> Result<PatientListing> {
        let ids = self.pacs.list_patients().await?;
        let total_in_pacs = ids.len();
        let bound = total_in_pacs.min(self.limits.patients);
        info!(total_in_pacs, fetching = bound, "Listing PACS patients");

        let mut patients = Vec::with_capacity(bound);
        for (index, id) in ids.iter().take(bound).enumerate() {
            debug!(patient_id = %id, "Fetching patient {}/{}", index + 1, bound);
            match self.pacs.get_patient(id).await {
                Ok(patient) => patients.push(patient_summary(&patient)),
                Err(e) => warn!(patient_id = %id, error = %e, "Skipping patient"),
            }
        }

        let matched: Vec<_> = patients.into_iter().filter(|p| query.matches(p)).collect();

        Ok(PatientListing {
            page: paginate(matched, &query.pagination),
            total_in_pacs,
            truncated: total_in_pacs > bound,
        })
    }

    async fn get_patient(&self, id: &str) -> Result<PatientSummary> {
        let patient = self.pacs.get_patient(id).await?;
        Ok(patient_summary(&patient))
    }

    async fn list_studies(&self, query: &StudyQuery) -> Result<StudyListing> {
        let ids = self.pacs.list_studies().await?;
        let total_in_pacs = ids.len();
        let bound = total_in_pacs.min(self.limits.studies);
        info!(total_in_pacs, fetching = bound, "Listing PACS studies");

        let mut studies = Vec::with_capacity(bound);
        for id in ids.iter().take(bound) {
            match self.study_summary(id).await {
                Ok(summary) => studies.push(summary),
                Err(e) => warn!(study_id = %id, error = %e, "Skipping study"),
            }
        }

        let modalities = distinct(studies.iter().map(|s| s.modality.clone()));
        let matched = query.filter.apply(studies);

        Ok(StudyListing {
            page: paginate(matched, &query.pagination),
            total_in_pacs,
            truncated: total_in_pacs > bound,
            modalities,
        })
    }

    async fn get_study(&self, id: &str) -> Result<StudyDetail> {
        let study = self.pacs.get_study(id).await?;
        let patient = self.pacs.get_patient(&study.parent_patient).await?;

        let series = try_join_all(study.series.iter().map(|sid| self.pacs.get_series(sid))).await?;

        let tags = &study.main_dicom_tags;
        let patient_tags = &patient.main_dicom_tags;

        Ok(StudyDetail {
            id: id.to_string(),
            study_instance_uid: tag(tags, "StudyInstanceUID", "").to_string(),
            patient: StudyPatient {
                name: tag(patient_tags, "PatientName", "").to_string(),
                id: tag(patient_tags, "PatientID", "").to_string(),
                birth_date: tag(patient_tags, "PatientBirthDate", "").to_string(),
                sex: tag(patient_tags, "PatientSex", "").to_string(),
            },
            study: StudyAttributes {
                date: tag(tags, "StudyDate", "").to_string(),
                time: tag(tags, "StudyTime", "").to_string(),
                description: tag(tags, "StudyDescription", "").to_string(),
                accession_number: tag(tags, "AccessionNumber", "").to_string(),
            },
            series: series.iter().map(series_summary).collect(),
            viewer_urls: viewer_urls(self.pacs.direct_url(), id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterScope, Pagination};
    use pacs_core::PacsError;
    use pacs_integration::OrthancUploadResponse;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 内存中的 PACS：`broken` 中的 ID 查询会失败
    #[derive(Default)]
    struct FakePacs {
        patients: Vec<OrthancPatient>,
        studies: Vec<OrthancStudy>,
        series: Vec<OrthancSeries>,
        broken: Vec<String>,
        detail_calls: AtomicUsize,
    }

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    impl FakePacs {
        fn check(&self, id: &str) -> Result<()> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.iter().any(|b| b == id) {
                return Err(PacsError::RemoteUnavailable(format!("{} timed out", id)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PacsClient for FakePacs {
        async fn list_patients(&self) -> Result<Vec<String>> {
            Ok(self.patients.iter().map(|p| p.id.clone()).collect())
        }

        async fn get_patient(&self, id: &str) -> Result<OrthancPatient> {
            self.check(id)?;
            self.patients
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| PacsError::RemoteNotFound(format!("Patient {}", id)))
        }

        async fn list_studies(&self) -> Result<Vec<String>> {
            Ok(self.studies.iter().map(|s| s.id.clone()).collect())
        }

        async fn get_study(&self, id: &str) -> Result<OrthancStudy> {
            self.check(id)?;
            self.studies
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| PacsError::RemoteNotFound(format!("Study {}", id)))
        }

        async fn get_series(&self, id: &str) -> Result<OrthancSeries> {
            self.check(id)?;
            self.series
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| PacsError::RemoteNotFound(format!("Series {}", id)))
        }

        async fn upload_instance(&self, _data: Vec<u8>) -> Result<OrthancUploadResponse> {
            Err(PacsError::Internal("not used".into()))
        }

        async fn delete_study(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn system_info(&self) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn system_info_direct(&self) -> Result<Value> {
            Ok(Value::Null)
        }

        fn direct_url(&self) -> &str {
            "http://pacs:8042"
        }

        fn proxy_url(&self) -> &str {
            "http://pacs:8080/pacs"
        }
    }

    fn patient(id: &str, name: &str) -> OrthancPatient {
        let patient_id = id.to_uppercase();
        OrthancPatient {
            id: id.to_string(),
            main_dicom_tags: tags(&[("PatientName", name), ("PatientID", patient_id.as_str())]),
            studies: vec![format!("study-{}", id)],
            last_update: Some("20240120T101500".to_string()),
        }
    }

    fn study(id: &str, parent: &str, modality: &str, date: &str, series: &[&str]) -> OrthancStudy {
        let uid = format!("1.2.3.{}", id.len());
        let description = format!("{} exam", modality);
        let accession = format!("ACC-{}", id);
        OrthancStudy {
            id: id.to_string(),
            main_dicom_tags: tags(&[
                ("StudyInstanceUID", uid.as_str()),
                ("StudyDate", date),
                ("StudyDescription", description.as_str()),
                ("Modality", modality),
                ("AccessionNumber", accession.as_str()),
            ]),
            parent_patient: parent.to_string(),
            series: series.iter().map(|s| s.to_string()).collect(),
            count_instances: Some(12),
            ..Default::default()
        }
    }

    fn series(id: &str, instances: usize) -> OrthancSeries {
        OrthancSeries {
            id: id.to_string(),
            main_dicom_tags: tags(&[("Modality", "CT"), ("SeriesNumber", "1")]),
            instances: (0..instances).map(|i| format!("{}-{}", id, i)).collect(),
            count_instances: None,
        }
    }

    fn aggregator(pacs: FakePacs, limits: FanOutLimits) -> (Arc<FakePacs>, FanOutAggregator) {
        let pacs = Arc::new(pacs);
        let aggregator = FanOutAggregator::new(pacs.clone(), limits);
        (pacs, aggregator)
    }

    #[test]
    fn test_patient_summary_splits_name() {
        let summary = patient_summary(&patient("p1", "Doe^John"));
        assert_eq!(summary.first_name, "John");
        assert_eq!(summary.last_name, "Doe");
        assert_eq!(summary.full_name, "Doe^John");
        assert_eq!(summary.gender, "U");
        assert_eq!(summary.study_count, 1);
        assert_eq!(summary.last_study_date, "20240120T101500");

        let anonymous = patient_summary(&OrthancPatient {
            id: "p9".into(),
            ..Default::default()
        });
        assert_eq!(anonymous.full_name, "Unknown Patient");
        assert_eq!(anonymous.patient_id, "Unknown");
    }

    #[tokio::test]
    async fn test_list_patients_skips_failures_and_bounds_fanout() {
        let pacs = FakePacs {
            patients: (0..15)
                .map(|i| patient(&format!("p{}", i), &format!("Patient^No{}", i)))
                .collect(),
            broken: vec!["p3".to_string()],
            ..Default::default()
        };
        let (pacs, aggregator) = aggregator(pacs, FanOutLimits::default());

        let query = PatientQuery {
            search: None,
            pagination: Pagination { page: 1, limit: 100 },
        };
        let listing = aggregator.list_patients(&query).await.unwrap();

        assert_eq!(listing.total_in_pacs, 15);
        assert!(listing.truncated);
        assert_eq!(listing.page.total, 9);
        assert_eq!(pacs.detail_calls.load(Ordering::SeqCst), 10);
        assert!(listing.page.items.iter().all(|p| p.id != "p3"));
    }

    #[tokio::test]
    async fn test_list_patients_search() {
        let pacs = FakePacs {
            patients: vec![patient("a", "Doe^John"), patient("b", "Smith^Jane")],
            ..Default::default()
        };
        let (_, aggregator) = aggregator(pacs, FanOutLimits::default());

        let query = PatientQuery {
            search: Some("doe".to_string()),
            pagination: Pagination::default(),
        };
        let listing = aggregator.list_patients(&query).await.unwrap();
        assert_eq!(listing.page.items.len(), 1);
        assert_eq!(listing.page.items[0].last_name, "Doe");
        assert!(!listing.truncated);
    }

    #[tokio::test]
    async fn test_list_studies_filters_after_fanout() {
        let pacs = FakePacs {
            patients: vec![patient("a", "Doe^John"), patient("b", "Smith^Jane")],
            studies: vec![
                study("s1", "a", "CT", "20240110", &[]),
                study("s2", "b", "MR", "20240115", &[]),
                study("s3", "a", "CT", "20240201", &[]),
                study("s4", "missing", "US", "20240301", &[]),
            ],
            ..Default::default()
        };
        let (_, aggregator) = aggregator(pacs, FanOutLimits::default());

        let params: HashMap<String, String> = [
            ("modality".to_string(), "ct".to_string()),
            ("dateFrom".to_string(), "2024-01-12".to_string()),
        ]
        .into_iter()
        .collect();
        let query = StudyQuery::from_params(&params, FilterScope::Remote).unwrap();
        let listing = aggregator.list_studies(&query).await.unwrap();

        assert_eq!(listing.total_in_pacs, 4);
        let ids: Vec<_> = listing.page.items.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s3"]);
        assert_eq!(listing.page.items[0].patient_name, "Doe^John");
        // s4 的父患者不存在，被跳过
        assert_eq!(listing.modalities, vec!["CT", "MR"]);
    }

    #[tokio::test]
    async fn test_list_studies_bound() {
        let pacs = FakePacs {
            patients: vec![patient("a", "Doe^John")],
            studies: (0..5)
                .map(|i| study(&format!("s{}", i), "a", "CT", "20240110", &[]))
                .collect(),
            ..Default::default()
        };
        let (_, aggregator) = aggregator(
            pacs,
            FanOutLimits {
                patients: 10,
                studies: 3,
            },
        );

        let listing = aggregator.list_studies(&StudyQuery::default()).await.unwrap();
        assert_eq!(listing.page.total, 3);
        assert!(listing.truncated);
    }

    #[tokio::test]
    async fn test_get_study_collects_series_and_viewer_urls() {
        let pacs = FakePacs {
            patients: vec![patient("a", "Doe^John")],
            studies: vec![study("s1", "a", "CT", "20240110", &["se1", "se2"])],
            series: vec![series("se1", 4), series("se2", 2)],
            ..Default::default()
        };
        let (_, aggregator) = aggregator(pacs, FanOutLimits::default());

        let detail = aggregator.get_study("s1").await.unwrap();
        assert_eq!(detail.patient.name, "Doe^John");
        assert_eq!(detail.series.len(), 2);
        assert_eq!(detail.series[0].instance_count, 4);
        assert_eq!(
            detail.viewer_urls.orthanc,
            "http://pacs:8042/app/explorer.html#study?uuid=s1"
        );
        assert_eq!(
            detail.viewer_urls.stone,
            "http://pacs:8042/stone-webviewer/index.html?study=s1"
        );
    }

    #[tokio::test]
    async fn test_get_study_fails_when_any_series_fails() {
        let pacs = FakePacs {
            patients: vec![patient("a", "Doe^John")],
            studies: vec![study("s1", "a", "CT", "20240110", &["se1", "se2"])],
            series: vec![series("se1", 4), series("se2", 2)],
            broken: vec!["se2".to_string()],
            ..Default::default()
        };
        let (_, aggregator) = aggregator(pacs, FanOutLimits::default());

        let err = aggregator.get_study("s1").await.unwrap_err();
        assert!(matches!(err, PacsError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_get_patient_not_found() {
        let (_, aggregator) = aggregator(FakePacs::default(), FanOutLimits::default());
        let err = aggregator.get_patient("nobody").await.unwrap_err();
        assert_eq!(err.to_string(), "Patient nobody not found in PACS");
    }
}
