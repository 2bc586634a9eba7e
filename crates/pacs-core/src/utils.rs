//! 通用工具函数

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

/// 本机构的 Study Instance UID 根
const STUDY_UID_ROOT: &str = "1.2.840.113619.2.5.1762583153.215519";

/// 为本地新建的检查生成 Study Instance UID
pub fn generate_study_instance_uid() -> String {
    // UUID 的 128 位整数形式保证同一毫秒内也不重复
    format!(
        "{}.{}.{}",
        STUDY_UID_ROOT,
        Utc::now().timestamp_millis(),
        Uuid::new_v4().as_u128() % 1_000_000
    )
}

/// 验证DICOM UID格式
pub fn is_valid_dicom_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid.len() <= 64
        && uid.chars().all(|c| c.is_ascii_digit() || c == '.')
        && !uid.starts_with('.')
        && !uid.ends_with('.')
        && !uid.contains("..")
}

/// 不带时区的日期时间写法
const LOCAL_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// 接受 `YYYY-MM-DD`、不带时区的 `YYYY-MM-DDTHH:MM[:SS[.fff]]` 或完整的 RFC 3339 时间戳
pub fn is_iso8601(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || LOCAL_DATETIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(value, format).is_ok())
        || DateTime::parse_from_rfc3339(value).is_ok()
}

/// DICOM DA (`YYYYMMDD`) 转为 `YYYY-MM-DD`，已是 ISO 形式或无法识别时原样返回
pub fn dicom_date_to_iso(value: &str) -> String {
    match NaiveDate::parse_from_str(value, "%Y%m%d") {
        Ok(date) if value.len() == 8 => date.format("%Y-%m-%d").to_string(),
        _ => value.to_string(),
    }
}

/// 拆分 DICOM 人名 `Family^Given`，返回 (first_name, last_name)
pub fn split_person_name(name: &str) -> (String, String) {
    let mut parts = name.split('^');
    let family = parts.next().filter(|p| !p.is_empty());
    let given = parts.next().filter(|p| !p.is_empty());

    let last_name = family.unwrap_or("Unknown").to_string();
    let first_name = given.or(family).unwrap_or("Unknown").to_string();
    (first_name, last_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_study_instance_uid() {
        let uid = generate_study_instance_uid();
        assert!(is_valid_dicom_uid(&uid));
        assert!(uid.starts_with(STUDY_UID_ROOT));
    }

    #[test]
    fn test_is_valid_dicom_uid() {
        assert!(is_valid_dicom_uid("1.2.840.10008.5.1.4.1.1.4"));
        assert!(!is_valid_dicom_uid(""));
        assert!(!is_valid_dicom_uid("invalid.uid.with.letters"));
        assert!(!is_valid_dicom_uid("1..2"));
    }

    #[test]
    fn test_is_iso8601() {
        assert!(is_iso8601("2024-01-15"));
        assert!(is_iso8601("2024-01-15T14:30:00Z"));
        assert!(is_iso8601("2024-01-15T14:30:00+08:00"));
        assert!(is_iso8601("2024-01-15T14:30:00"));
        assert!(is_iso8601("2024-01-15T14:30:00.250"));
        assert!(is_iso8601("2024-01-15T14:30"));
        assert!(!is_iso8601("2024-01-15T25:30"));
        assert!(!is_iso8601("2024-01-15T14"));
        assert!(!is_iso8601("2024-13-01"));
        assert!(!is_iso8601("20240115"));
        assert!(!is_iso8601("yesterday"));
    }

    #[test]
    fn test_dicom_date_to_iso() {
        assert_eq!(dicom_date_to_iso("20240115"), "2024-01-15");
        assert_eq!(dicom_date_to_iso("2024-01-15"), "2024-01-15");
        assert_eq!(dicom_date_to_iso(""), "");
    }

    #[test]
    fn test_split_person_name() {
        assert_eq!(
            split_person_name("Doe^John"),
            ("John".to_string(), "Doe".to_string())
        );
        assert_eq!(
            split_person_name("Anonymous"),
            ("Anonymous".to_string(), "Anonymous".to_string())
        );
        assert_eq!(
            split_person_name(""),
            ("Unknown".to_string(), "Unknown".to_string())
        );
    }
}
