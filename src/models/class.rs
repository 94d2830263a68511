use crate::engine::ProgressResult;
use crate::engine::progress::minutes_between;
use crate::entities::class_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassRequest {
    #[schema(example = "4B")]
    pub name: String,
    pub grade: Option<String>,
    pub student_count: Option<i32>,
    /// 管理员代教师注册时指定
    pub teacher_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassRequest {
    pub name: Option<String>,
    pub grade: Option<String>,
    pub student_count: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassResponse {
    pub id: i64,
    pub name: String,
    pub class_code: String,
    pub teacher_id: i64,
    pub grade: Option<String>,
    pub student_count: Option<i32>,
    pub is_active: bool,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    pub stations_scanned: Vec<i64>,
}

impl From<class_entity::Model> for ClassResponse {
    fn from(m: class_entity::Model) -> Self {
        let stations_scanned = m.scanned_station_ids();
        Self {
            id: m.id,
            name: m.name,
            class_code: m.class_code,
            teacher_id: m.teacher_id,
            grade: m.grade,
            student_count: m.student_count,
            is_active: m.is_active,
            is_completed: m.is_completed,
            completed_at: m.completed_at,
            last_scan_at: m.last_scan_at,
            registered_at: m.registered_at,
            stations_scanned,
        }
    }
}

/// `GET /classes/{id}/progress`
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub completed_count: usize,
    pub total_stations: usize,
    pub progress_percentage: u32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
    /// Minutes from first to last station, once completed
    pub completion_time: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
}

impl ProgressResponse {
    /// Combines computed progress with the class's latched fields. A latched
    /// completion is reported even if the active roster grew since; its
    /// completion time is then measured up to the latched `completed_at`.
    pub fn new(progress: &ProgressResult, class: &class_entity::Model) -> Self {
        let completion_time = progress.completion_time_minutes.or_else(|| {
            match (class.is_completed, progress.start_time, class.completed_at) {
                (true, Some(start), Some(done)) if done >= start => {
                    Some(minutes_between(start, done))
                }
                _ => None,
            }
        });
        Self {
            completed_count: progress.completed_count,
            total_stations: progress.total_stations,
            progress_percentage: progress.progress_percentage,
            is_completed: class.is_completed || progress.is_completed,
            completed_at: class.completed_at.or(progress.end_time),
            last_scan_at: class.last_scan_at,
            completion_time,
            start_time: progress.start_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetailResponse {
    pub class: ClassResponse,
    pub progress: ProgressResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ScanPoint, compute_progress};
    use chrono::TimeZone;

    fn class_row(is_completed: bool, completed_at: Option<DateTime<Utc>>) -> class_entity::Model {
        let t = Utc.with_ymd_and_hms(2025, 5, 20, 9, 0, 0).unwrap();
        class_entity::Model {
            id: 1,
            name: "4B".into(),
            class_code: "ABC234".into(),
            teacher_id: 7,
            grade: None,
            student_count: Some(24),
            is_active: true,
            is_completed,
            completed_at,
            last_scan_at: None,
            registered_at: t,
            stations_scanned: serde_json::json!([1, 2]),
            created_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn test_latched_completion_survives_new_station() {
        let done = Utc.with_ymd_and_hms(2025, 5, 20, 10, 5, 0).unwrap();
        let scans = vec![
            ScanPoint {
                station_id: 1,
                scanned_at: Utc.with_ymd_and_hms(2025, 5, 20, 10, 0, 0).unwrap(),
            },
            ScanPoint {
                station_id: 2,
                scanned_at: done,
            },
        ];
        // 站点 3 在班级完成后启用
        let progress = compute_progress(&scans, &[1, 2, 3]);
        let resp = ProgressResponse::new(&progress, &class_row(true, Some(done)));
        assert!(resp.is_completed);
        assert_eq!(resp.completed_at, Some(done));
        assert_eq!(resp.completed_count, 2);
        assert_eq!(resp.total_stations, 3);
        assert_eq!(resp.progress_percentage, 67);
        assert_eq!(resp.completion_time, Some(5));
    }

    #[test]
    fn test_unfinished_class_has_no_completion_time() {
        let scans = vec![ScanPoint {
            station_id: 1,
            scanned_at: Utc.with_ymd_and_hms(2025, 5, 20, 10, 0, 0).unwrap(),
        }];
        let progress = compute_progress(&scans, &[1, 2]);
        let resp = ProgressResponse::new(&progress, &class_row(false, None));
        assert!(!resp.is_completed);
        assert_eq!(resp.completion_time, None);
    }

    #[test]
    fn test_progress_json_keys() {
        let progress = compute_progress(&[], &[1]);
        let v = serde_json::to_value(ProgressResponse::new(&progress, &class_row(false, None))).unwrap();
        for key in [
            "completedCount",
            "totalStations",
            "progressPercentage",
            "isCompleted",
            "completedAt",
            "lastScanAt",
            "completionTime",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }
}
