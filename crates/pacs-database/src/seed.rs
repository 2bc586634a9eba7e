//! 启动时装载的初始数据

use chrono::{DateTime, TimeZone, Utc};
use pacs_core::{Study, StudyStatus, UserRole};

/// 初始用户，口令为明文，由认证服务在装载时做哈希
#[derive(Debug, Clone)]
pub struct SeedUser {
    pub id: u64,
    pub username: &'static str,
    pub password: &'static str,
    pub email: &'static str,
    pub role: UserRole,
    pub first_name: &'static str,
    pub last_name: &'static str,
}

pub fn default_users() -> Vec<SeedUser> {
    vec![
        SeedUser {
            id: 1,
            username: "admin",
            password: "admin123",
            email: "admin@hospital.com",
            role: UserRole::Admin,
            first_name: "System",
            last_name: "Administrator",
        },
        SeedUser {
            id: 2,
            username: "doctor",
            password: "doctor123",
            email: "doctor@hospital.com",
            role: UserRole::Doctor,
            first_name: "Dr. John",
            last_name: "Smith",
        },
    ]
}

fn seeded_at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

#[allow(clippy::too_many_arguments)]
fn study(
    id: u64,
    patient_id: u64,
    patient_name: &str,
    modality: &str,
    description: &str,
    (date, time): (&str, &str),
    referring_physician: &str,
    (series_count, instance_count): (u32, u32),
    status: StudyStatus,
    created_at: DateTime<Utc>,
) -> Study {
    Study {
        id,
        study_id: format!("STU{:03}", id),
        study_instance_uid: format!("1.2.840.113619.2.5.1762583153.215519.978957063.{}", 77 + id),
        patient_id,
        patient_name: patient_name.to_string(),
        modality: modality.to_string(),
        description: description.to_string(),
        study_date: date.to_string(),
        study_time: time.to_string(),
        accession_number: format!("ACC{:03}", id),
        referring_physician: referring_physician.to_string(),
        institution_name: "Central Medical Center".to_string(),
        series_count,
        instance_count,
        status,
        created_at,
        updated_at: None,
    }
}

pub fn default_studies() -> Vec<Study> {
    vec![
        study(
            1,
            1,
            "John Doe",
            "CT",
            "Chest CT with Contrast",
            ("2024-01-15", "14:30:00"),
            "Dr. Smith",
            (3, 150),
            StudyStatus::Completed,
            seeded_at(2024, 1, 15, 14, 30),
        ),
        study(
            2,
            2,
            "Jane Smith",
            "MRI",
            "Brain MRI without Contrast",
            ("2024-01-16", "09:15:00"),
            "Dr. Johnson",
            (5, 200),
            StudyStatus::Completed,
            seeded_at(2024, 1, 16, 9, 15),
        ),
        study(
            3,
            3,
            "Robert Johnson",
            "X-RAY",
            "Chest X-Ray PA and Lateral",
            ("2024-01-17", "11:45:00"),
            "Dr. Williams",
            (2, 2),
            StudyStatus::Completed,
            seeded_at(2024, 1, 17, 11, 45),
        ),
        study(
            4,
            1,
            "John Doe",
            "US",
            "Abdominal Ultrasound",
            ("2024-01-18", "16:20:00"),
            "Dr. Brown",
            (4, 85),
            StudyStatus::InProgress,
            seeded_at(2024, 1, 18, 16, 20),
        ),
    ]
}
