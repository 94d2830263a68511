use super::class_service::{cached_of, load_class_for, scan_points};
use super::is_unique_violation;
use super::station_service::{active_station_ids, find_station_by_code};
use crate::engine::progress::reconcile;
use crate::engine::{CachedProgress, ScanPoint, compute_progress};
use crate::entities::{class_entity as classes, scan_entity as scans};
use crate::error::{AppError, AppResult};
use crate::middlewares::AuthUser;
use crate::models::{ProgressResponse, RecordScanRequest, ScanResultResponse, StationDisplay};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};

/// Result of a scan attempt; `created` is false for a repeat scan.
#[derive(Debug)]
pub struct ScanOutcome {
    pub created: bool,
    pub result: ScanResultResponse,
}

/// Cached class fields after a scan, rebuilt from the full scan history
/// (which already contains the new scan). A cache left stale by an earlier
/// failed update cannot hold back the completion latch.
pub(crate) fn post_scan_cache(
    class: &classes::Model,
    history: &[ScanPoint],
    active_ids: &[i64],
) -> CachedProgress {
    reconcile(&cached_of(class), history, active_ids)
}

#[derive(Clone)]
pub struct ScanService {
    pool: DatabaseConnection,
}

impl ScanService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// 记录一次扫码
    ///
    /// 流程:
    /// 1. 校验参数，加载班级（教师只能为自己的班级扫码）
    /// 2. 按 qr 标识（或数字 id）查找启用的站点
    /// 3. 同一 (班级, 站点) 已有记录则直接返回 existing=true
    /// 4. 插入扫描记录；插入失败但记录已存在视为并发重复扫码
    /// 5. 按扫描历史更新班级缓存字段（失败只记录日志，不回滚扫描）
    pub async fn record_scan(
        &self,
        user: &AuthUser,
        request: RecordScanRequest,
    ) -> AppResult<ScanOutcome> {
        let class_id = request
            .class_id
            .ok_or_else(|| AppError::ValidationError("classId is required".to_string()))?;
        let code = request
            .station_qr_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::ValidationError("stationQRCode is required".to_string()))?;

        let class = load_class_for(&self.pool, user, class_id).await?;
        if !class.is_active {
            return Err(AppError::ValidationError("Class is not active".to_string()));
        }

        let station = find_station_by_code(&self.pool, code)
            .await?
            .ok_or_else(|| AppError::NotFound("Station not found".to_string()))?;
        if !station.is_active {
            return Err(AppError::ValidationError("Station is not active".to_string()));
        }

        let (scan, created) = match self.find_scan(class.id, station.id).await? {
            Some(scan) => (scan, false),
            None => {
                let inserted = scans::ActiveModel {
                    class_id: Set(class.id),
                    station_id: Set(station.id),
                    scanned_at: Set(Utc::now()),
                    device_info: Set(request.device_info),
                    ..Default::default()
                }
                .insert(&self.pool)
                .await;

                match inserted {
                    Ok(scan) => (scan, true),
                    Err(e) => match self.find_scan(class.id, station.id).await? {
                        // 并发重复扫码：另一请求先写入
                        Some(scan) => {
                            if !is_unique_violation(&e) {
                                log::warn!(
                                    "Scan insert failed but the row exists: class={}, station={}: {e}",
                                    class.id,
                                    station.id
                                );
                            }
                            (scan, false)
                        }
                        None => return Err(e.into()),
                    },
                }
            }
        };

        let active_ids = active_station_ids(&self.pool).await?;
        let points = scan_points(&self.pool, class.id).await?;

        let class = if created {
            log::info!(
                "Scan recorded: class={}, station={}, scan={}",
                class.id,
                station.id,
                scan.id
            );
            self.apply_scan_to_class(class, station.id, &points, &active_ids)
                .await
        } else {
            log::debug!(
                "Repeat scan ignored: class={}, station={}",
                class.id,
                station.id
            );
            class
        };

        let progress = compute_progress(&points, &active_ids);

        Ok(ScanOutcome {
            created,
            result: ScanResultResponse {
                existing: !created,
                scan_id: scan.id,
                scanned_at: scan.scanned_at,
                station: StationDisplay::from(&station),
                progress: ProgressResponse::new(&progress, &class),
            },
        })
    }

    async fn find_scan(&self, class_id: i64, station_id: i64) -> AppResult<Option<scans::Model>> {
        Ok(scans::Entity::find()
            .filter(scans::Column::ClassId.eq(class_id))
            .filter(scans::Column::StationId.eq(station_id))
            .one(&self.pool)
            .await?)
    }

    /// Read-then-write update of the cached class fields. Failures are logged
    /// and the in-memory view is returned so the response still reflects the
    /// scan; the reconcile task repairs the row later.
    async fn apply_scan_to_class(
        &self,
        class: classes::Model,
        station_id: i64,
        history: &[ScanPoint],
        active_ids: &[i64],
    ) -> classes::Model {
        let next = post_scan_cache(&class, history, active_ids);
        let newly_completed = next.is_completed && !class.is_completed;

        let mut expected = class.clone();
        expected.stations_scanned = serde_json::json!(next.stations_scanned);
        expected.last_scan_at = next.last_scan_at;
        expected.is_completed = next.is_completed;
        expected.completed_at = next.completed_at;
        expected.updated_at = Utc::now();

        let mut am = class.into_active_model();
        am.stations_scanned = Set(expected.stations_scanned.clone());
        am.last_scan_at = Set(expected.last_scan_at);
        am.is_completed = Set(expected.is_completed);
        am.completed_at = Set(expected.completed_at);
        am.updated_at = Set(expected.updated_at);

        match am.update(&self.pool).await {
            Ok(updated) => {
                if newly_completed {
                    log::info!("Class {} completed the hunt", updated.id);
                }
                updated
            }
            Err(e) => {
                log::error!(
                    "Failed to update class {} after scan of station {}: {}",
                    expected.id,
                    station_id,
                    e
                );
                expected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{UserRole, station_entity as stations};
    use chrono::{DateTime, TimeZone};
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, h, m, 0).unwrap()
    }

    fn teacher() -> AuthUser {
        AuthUser {
            id: 7,
            role: UserRole::Teacher,
        }
    }

    fn class_row(cached: &[i64]) -> classes::Model {
        classes::Model {
            id: 1,
            name: "4B".into(),
            class_code: "ABC234".into(),
            teacher_id: 7,
            grade: None,
            student_count: None,
            is_active: true,
            is_completed: false,
            completed_at: None,
            last_scan_at: Some(at(10, 0)),
            registered_at: at(9, 0),
            stations_scanned: serde_json::json!(cached),
            created_at: at(9, 0),
            updated_at: at(9, 0),
        }
    }

    fn station_row(id: i64) -> stations::Model {
        stations::Model {
            id,
            name: format!("Station {id}"),
            description: None,
            qr_identifier: format!("station-{id}"),
            location: None,
            image_url: None,
            tips: serde_json::json!([]),
            sort_order: 0,
            is_active: true,
            created_at: at(8, 0),
            updated_at: at(8, 0),
        }
    }

    fn scan_row(id: i64, station_id: i64, when: DateTime<Utc>) -> scans::Model {
        scans::Model {
            id,
            class_id: 1,
            station_id,
            scanned_at: when,
            device_info: None,
        }
    }

    fn id_rows(ids: &[i64]) -> Vec<BTreeMap<&'static str, Value>> {
        ids.iter()
            .map(|id| BTreeMap::from([("id", Value::from(*id))]))
            .collect()
    }

    fn request(code: &str) -> RecordScanRequest {
        RecordScanRequest {
            class_id: Some(1),
            station_qr_code: Some(code.to_string()),
            device_info: None,
        }
    }

    #[test]
    fn test_post_scan_cache_latches_from_history_not_stale_cache() {
        // 之前的缓存更新失败，只记录了站点 1
        let class = class_row(&[1]);
        let history = vec![
            ScanPoint {
                station_id: 1,
                scanned_at: at(10, 0),
            },
            ScanPoint {
                station_id: 2,
                scanned_at: at(10, 5),
            },
            ScanPoint {
                station_id: 3,
                scanned_at: at(10, 9),
            },
        ];
        let next = post_scan_cache(&class, &history, &[1, 2, 3]);
        assert!(next.is_completed);
        assert_eq!(next.completed_at, Some(at(10, 9)));
        assert_eq!(next.last_scan_at, Some(at(10, 9)));
        assert_eq!(next.stations_scanned, vec![1, 2, 3]);
    }

    #[actix_web::test]
    async fn test_first_scan_writes_latched_class_from_history() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![class_row(&[1])]])
            .append_query_results([vec![station_row(3)]])
            .append_query_results([Vec::<scans::Model>::new()])
            .append_query_results([vec![scan_row(30, 3, at(10, 9))]])
            .append_query_results([id_rows(&[1, 2, 3])])
            .append_query_results([vec![
                scan_row(10, 1, at(10, 0)),
                scan_row(20, 2, at(10, 5)),
                scan_row(30, 3, at(10, 9)),
            ]])
            .append_query_results([vec![classes::Model {
                is_completed: true,
                completed_at: Some(at(10, 9)),
                last_scan_at: Some(at(10, 9)),
                stations_scanned: serde_json::json!([1, 2, 3]),
                ..class_row(&[1])
            }]])
            .into_connection();
        let service = ScanService::new(db.clone());

        let outcome = service
            .record_scan(&teacher(), request("station-3"))
            .await
            .unwrap();
        assert!(outcome.created);
        assert!(!outcome.result.existing);
        assert_eq!(outcome.result.progress.completed_count, 3);
        assert!(outcome.result.progress.is_completed);
        assert_eq!(outcome.result.progress.completion_time, Some(9));

        let log = format!("{:?}", db.into_transaction_log());
        let update = log
            .split("UPDATE \"classes\"")
            .nth(1)
            .expect("class row is updated");
        assert!(update.contains("Bool(Some(true))"));
    }

    #[actix_web::test]
    async fn test_rescan_returns_existing_without_writes() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![class_row(&[1, 2])]])
            .append_query_results([vec![station_row(2)]])
            .append_query_results([vec![scan_row(20, 2, at(10, 5))]])
            .append_query_results([id_rows(&[1, 2, 3])])
            .append_query_results([vec![scan_row(10, 1, at(10, 0)), scan_row(20, 2, at(10, 5))]])
            .into_connection();
        let service = ScanService::new(db.clone());

        let outcome = service
            .record_scan(&teacher(), request("station-2"))
            .await
            .unwrap();
        assert!(!outcome.created);
        assert!(outcome.result.existing);
        assert_eq!(outcome.result.scan_id, 20);
        assert_eq!(outcome.result.scanned_at, at(10, 5));
        assert_eq!(outcome.result.progress.completed_count, 2);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(!log.contains("INSERT"));
        assert!(!log.contains("UPDATE"));
    }

    #[actix_web::test]
    async fn test_concurrent_duplicate_insert_degrades_to_existing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![class_row(&[1, 2])]])
            .append_query_results([vec![station_row(2)]])
            .append_query_results([Vec::<scans::Model>::new()])
            .append_query_errors([DbErr::Custom(
                "duplicate key value violates unique constraint".to_string(),
            )])
            .append_query_results([vec![scan_row(20, 2, at(10, 5))]])
            .append_query_results([id_rows(&[1, 2, 3])])
            .append_query_results([vec![scan_row(10, 1, at(10, 0)), scan_row(20, 2, at(10, 5))]])
            .into_connection();
        let service = ScanService::new(db.clone());

        let outcome = service
            .record_scan(&teacher(), request("station-2"))
            .await
            .unwrap();
        assert!(!outcome.created);
        assert!(outcome.result.existing);
        assert_eq!(outcome.result.scan_id, 20);

        // 没有对班级缓存做任何写入，stations_scanned 长度不变
        let log = format!("{:?}", db.into_transaction_log());
        assert!(!log.contains("UPDATE"));
    }

    #[actix_web::test]
    async fn test_teacher_cannot_scan_for_other_class() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![classes::Model {
                teacher_id: 99,
                ..class_row(&[])
            }]])
            .into_connection();
        let service = ScanService::new(db);

        let err = service
            .record_scan(&teacher(), request("station-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied));
    }
}
