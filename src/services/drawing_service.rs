use super::station_service::active_station_ids;
use crate::config::HuntConfig;
use crate::engine::drawing::{check_run_preconditions, draw_winners, eligible_entrants};
use crate::engine::{ClassEntry, Entrant, ScanPoint};
use crate::entities::drawings::{DrawingWinner, WeightingFactors};
use crate::entities::{
    DrawingStatus, class_entity as classes, drawing_entity as drawings, scan_entity as scans,
    user_entity as users,
};
use crate::error::{AppError, AppResult};
use crate::external::{MailService, winner_notification};
use crate::middlewares::AuthUser;
use crate::models::{
    CreateDrawingRequest, DrawingResponse, EligibleClassesResponse, NotifyWinnersResponse,
    RunDrawingRequest,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Checks a factor set against `0..=max`.
pub fn validate_factors(factors: &WeightingFactors, max: f64) -> AppResult<()> {
    for (name, value) in [
        ("completionTime", factors.completion_time),
        ("stationsFound", factors.stations_found),
    ] {
        if !value.is_finite() || value < 0.0 || value > max {
            return Err(AppError::ValidationError(format!(
                "weightingFactors.{name} must be between 0 and {max}"
            )));
        }
    }
    Ok(())
}

/// Drawings with a notification pass in flight in this process.
#[derive(Clone, Default)]
struct NotifyGuard {
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl NotifyGuard {
    fn try_claim(&self, drawing_id: i64) -> Option<NotifyClaim> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(drawing_id).then(|| NotifyClaim {
            drawing_id,
            in_flight: self.in_flight.clone(),
        })
    }
}

/// Held for the duration of one notification pass; released on drop.
struct NotifyClaim {
    drawing_id: i64,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl Drop for NotifyClaim {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.drawing_id);
    }
}

#[derive(Clone)]
pub struct DrawingService {
    pool: DatabaseConnection,
    mail_service: MailService,
    hunt: HuntConfig,
    notify_guard: NotifyGuard,
}

impl DrawingService {
    pub fn new(pool: DatabaseConnection, mail_service: MailService, hunt: HuntConfig) -> Self {
        Self {
            pool,
            mail_service,
            hunt,
            notify_guard: NotifyGuard::default(),
        }
    }

    pub async fn create(
        &self,
        user: &AuthUser,
        request: CreateDrawingRequest,
    ) -> AppResult<DrawingResponse> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Drawing name is required".to_string()));
        }
        let factors = request.weighting_factors.unwrap_or_default();
        validate_factors(&factors, self.hunt.max_weighting_factor)?;

        let now = Utc::now();
        let drawing = drawings::ActiveModel {
            name: Set(name.to_string()),
            description: Set(request.description),
            drawing_date: Set(request.drawing_date),
            eligible_class_ids: Set(serde_json::json!([])),
            winners: Set(serde_json::json!([])),
            weighting_factors: Set(serde_json::to_value(factors)?),
            status: Set(DrawingStatus::Pending),
            created_by: Set(user.id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!("Drawing created: id={}, by={}", drawing.id, user.id);
        Ok(drawing.into())
    }

    pub async fn list(&self) -> AppResult<Vec<DrawingResponse>> {
        let list = drawings::Entity::find()
            .order_by_desc(drawings::Column::DrawingDate)
            .order_by_desc(drawings::Column::Id)
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    pub async fn get(&self, id: i64) -> AppResult<DrawingResponse> {
        Ok(self.find(id).await?.into())
    }

    /// Classes that currently qualify, weighted with the default factors.
    pub async fn eligible_classes(&self) -> AppResult<EligibleClassesResponse> {
        let (active_ids, entries) = self.load_entries().await?;
        let entrants = eligible_entrants(&entries, &active_ids, &WeightingFactors::default())?;
        Ok(EligibleClassesResponse {
            total_stations: active_ids.len(),
            count: entrants.len(),
            classes: entrants.into_iter().map(Into::into).collect(),
        })
    }

    /// 运行抽奖
    ///
    /// 1. 校验参数与抽奖状态（已完成返回 409）
    /// 2. 按扫描历史重新计算每个班级的进度，筛选合格班级并计算权重
    /// 3. 洗牌抽取不重复的中奖班级
    /// 4. 条件更新（status = pending）写入结果，并发下只有一次能成功
    /// 5. 后台异步发送中奖通知
    pub async fn run_drawing(
        &self,
        drawing_id: i64,
        request: RunDrawingRequest,
    ) -> AppResult<DrawingResponse> {
        let number_of_winners = request.number_of_winners.ok_or_else(|| {
            AppError::ValidationError("numberOfWinners is required".to_string())
        })?;
        if number_of_winners < 1 {
            return Err(AppError::ValidationError(
                "numberOfWinners must be at least 1".to_string(),
            ));
        }

        let drawing = self.find(drawing_id).await?;
        check_run_preconditions(drawing.status, number_of_winners)?;

        let (active_ids, entries) = self.load_entries().await?;
        let entrants: Vec<Entrant> = eligible_entrants(&entries, &active_ids, &drawing.factors())?;

        let prize = request
            .prize_description
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.hunt.default_prize)
            .to_string();

        let winners = {
            let mut rng = rand::thread_rng();
            draw_winners(&entrants, number_of_winners as usize, &prize, &mut rng)?
        };
        let eligible_ids: Vec<i64> = entrants.iter().map(|e| e.class_id).collect();

        let result = drawings::Entity::update_many()
            .col_expr(
                drawings::Column::EligibleClassIds,
                Expr::value(serde_json::to_value(&eligible_ids)?),
            )
            .col_expr(
                drawings::Column::Winners,
                Expr::value(serde_json::to_value(&winners)?),
            )
            .col_expr(drawings::Column::Status, Expr::value(DrawingStatus::Completed))
            .col_expr(drawings::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(drawings::Column::Id.eq(drawing_id))
            .filter(drawings::Column::Status.eq(DrawingStatus::Pending))
            .exec(&self.pool)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict(
                "Drawing has already been completed".to_string(),
            ));
        }

        log::info!(
            "Drawing {} completed: {} eligible, {} winners",
            drawing_id,
            eligible_ids.len(),
            winners.len()
        );

        let completed = self.find(drawing_id).await?;

        // 通知失败不影响抽奖结果；同一抽奖同时只跑一轮通知
        match self.notify_guard.try_claim(drawing_id) {
            Some(claim) => {
                let svc = self.clone();
                tokio::spawn(async move {
                    let _claim = claim;
                    match svc.notify_pending_winners(drawing_id).await {
                        Ok((sent, failed)) => log::info!(
                            "Drawing {drawing_id} notifications: {sent} sent, {failed} failed"
                        ),
                        Err(e) => {
                            log::error!("Drawing {drawing_id} notification pass failed: {e}")
                        }
                    }
                });
            }
            None => log::warn!("Drawing {drawing_id} notification pass already running"),
        }

        Ok(completed.into())
    }

    /// Re-runs the notification pass for winners not yet notified. Returns
    /// 409 while another pass for the same drawing is running.
    pub async fn notify_winners(&self, drawing_id: i64) -> AppResult<NotifyWinnersResponse> {
        let drawing = self.find(drawing_id).await?;
        if !drawing.is_completed() {
            return Err(AppError::ValidationError(
                "Drawing has not been run yet".to_string(),
            ));
        }
        let _claim = self.notify_guard.try_claim(drawing_id).ok_or_else(|| {
            AppError::Conflict("Notification pass already in progress".to_string())
        })?;
        let (notified, failed) = self.notify_pending_winners(drawing_id).await?;
        Ok(NotifyWinnersResponse { notified, failed })
    }

    async fn find(&self, id: i64) -> AppResult<drawings::Model> {
        drawings::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Drawing not found".to_string()))
    }

    /// Active station roster plus every active class with its scan history.
    async fn load_entries(&self) -> AppResult<(Vec<i64>, Vec<ClassEntry>)> {
        let active_ids = active_station_ids(&self.pool).await?;
        let class_list = classes::Entity::find()
            .filter(classes::Column::IsActive.eq(true))
            .order_by_asc(classes::Column::Id)
            .all(&self.pool)
            .await?;

        let class_ids: Vec<i64> = class_list.iter().map(|c| c.id).collect();
        let mut by_class: HashMap<i64, Vec<ScanPoint>> = HashMap::new();
        if !class_ids.is_empty() {
            for scan in scans::Entity::find()
                .filter(scans::Column::ClassId.is_in(class_ids))
                .all(&self.pool)
                .await?
            {
                by_class
                    .entry(scan.class_id)
                    .or_default()
                    .push(ScanPoint::from(&scan));
            }
        }

        let entries = class_list
            .into_iter()
            .map(|c| ClassEntry {
                scans: by_class.remove(&c.id).unwrap_or_default(),
                class_id: c.id,
                class_name: c.name,
                class_code: c.class_code,
                teacher_id: c.teacher_id,
            })
            .collect();

        Ok((active_ids, entries))
    }

    /// Mails every winner whose `notified` flag is false. Each success is
    /// persisted on its own; failures are logged and counted.
    async fn notify_pending_winners(&self, drawing_id: i64) -> AppResult<(usize, usize)> {
        let drawing = self.find(drawing_id).await?;
        let pending: Vec<DrawingWinner> = drawing
            .winner_list()
            .into_iter()
            .filter(|w| !w.notified)
            .collect();

        let mut sent = 0;
        let mut failed = 0;
        for winner in pending {
            match self.notify_one(&drawing, &winner).await {
                Ok(true) => {
                    if let Err(e) = self.mark_notified(drawing_id, winner.class_id).await {
                        log::error!(
                            "Failed to flag winner class {} of drawing {drawing_id} as notified: {e}",
                            winner.class_id
                        );
                    }
                    sent += 1;
                }
                Ok(false) => failed += 1,
                Err(e) => {
                    log::warn!(
                        "Could not notify winner class {} of drawing {drawing_id}: {e}",
                        winner.class_id
                    );
                    failed += 1;
                }
            }
        }
        Ok((sent, failed))
    }

    async fn notify_one(&self, drawing: &drawings::Model, winner: &DrawingWinner) -> AppResult<bool> {
        let teacher = users::Entity::find_by_id(winner.teacher_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Teacher not found".to_string()))?;

        let message = winner_notification(
            &teacher.email,
            &teacher.name,
            &winner.class_name,
            &drawing.name,
            &winner.prize,
        );
        self.mail_service.send(&message).await
    }

    async fn mark_notified(&self, drawing_id: i64, class_id: i64) -> AppResult<()> {
        let drawing = self.find(drawing_id).await?;
        let mut winners = drawing.winner_list();
        for w in winners.iter_mut().filter(|w| w.class_id == class_id) {
            w.notified = true;
        }

        let mut am: drawings::ActiveModel = drawing.into();
        am.winners = Set(serde_json::to_value(&winners)?);
        am.updated_at = Set(Utc::now());
        am.update(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::entities::UserRole;
    use chrono::{DateTime, TimeZone};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, h, m, 0).unwrap()
    }

    fn admin() -> AuthUser {
        AuthUser {
            id: 1,
            role: UserRole::Admin,
        }
    }

    fn winner(class_id: i64, notified: bool) -> DrawingWinner {
        DrawingWinner {
            class_id,
            class_name: format!("Class {class_id}"),
            class_code: format!("CODE{class_id}"),
            teacher_id: 7,
            prize: "Pizza party".into(),
            notified,
        }
    }

    fn drawing_row(status: DrawingStatus, winners: &[DrawingWinner]) -> drawings::Model {
        drawings::Model {
            id: 5,
            name: "Spring draw".into(),
            description: None,
            drawing_date: at(12, 0),
            eligible_class_ids: serde_json::json!([]),
            winners: serde_json::to_value(winners).unwrap(),
            weighting_factors: serde_json::json!({}),
            status,
            created_by: 1,
            created_at: at(8, 0),
            updated_at: at(8, 0),
        }
    }

    fn class_row(id: i64) -> classes::Model {
        classes::Model {
            id,
            name: format!("Class {id}"),
            class_code: format!("CODE{id}"),
            teacher_id: 7,
            grade: None,
            student_count: None,
            is_active: true,
            is_completed: true,
            completed_at: Some(at(10, 5)),
            last_scan_at: Some(at(10, 5)),
            registered_at: at(9, 0),
            stations_scanned: serde_json::json!([1, 2]),
            created_at: at(9, 0),
            updated_at: at(9, 0),
        }
    }

    fn scan_row(id: i64, class_id: i64, station_id: i64, when: DateTime<Utc>) -> scans::Model {
        scans::Model {
            id,
            class_id,
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

    fn service(pool: DatabaseConnection) -> DrawingService {
        DrawingService::new(pool, MailService::new(MailConfig::default()), HuntConfig::default())
    }

    fn run_request(n: i64) -> RunDrawingRequest {
        RunDrawingRequest {
            number_of_winners: Some(n),
            prize_description: None,
        }
    }

    #[actix_web::test]
    async fn test_run_on_completed_drawing_conflicts_without_writing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![drawing_row(
                DrawingStatus::Completed,
                &[winner(11, true)],
            )]])
            .into_connection();
        let svc = service(db.clone());

        let err = svc.run_drawing(5, run_request(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let log = format!("{:?}", db.into_transaction_log());
        assert!(!log.contains("UPDATE"));
    }

    #[actix_web::test]
    async fn test_run_losing_pending_race_conflicts() {
        // 另一次运行已先一步把状态改为 completed，条件更新影响 0 行
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![drawing_row(DrawingStatus::Pending, &[])]])
            .append_query_results([id_rows(&[1, 2])])
            .append_query_results([vec![class_row(11)]])
            .append_query_results([vec![
                scan_row(1, 11, 1, at(10, 0)),
                scan_row(2, 11, 2, at(10, 5)),
            ]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let svc = service(db.clone());

        let err = svc.run_drawing(5, run_request(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // 只有一次带 status = pending 条件的 UPDATE，之后不再读取或通知
        let log = db.into_transaction_log();
        let text = format!("{:?}", log);
        assert_eq!(text.matches("UPDATE \"drawings\"").count(), 1);
        assert!(text.contains("\"pending\""));
        assert!(format!("{:?}", log.last().unwrap()).contains("UPDATE \"drawings\""));
        assert!(svc.notify_guard.try_claim(5).is_some());
    }

    #[actix_web::test]
    async fn test_notify_rejected_while_pass_in_flight() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![drawing_row(
                DrawingStatus::Completed,
                &[winner(11, false)],
            )]])
            .into_connection();
        let svc = service(db);

        let claim = svc.notify_guard.try_claim(5).unwrap();
        let err = svc.notify_winners(5).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        drop(claim);
    }

    #[actix_web::test]
    async fn test_notify_releases_claim_after_pass() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![drawing_row(
                DrawingStatus::Completed,
                &[winner(11, true)],
            )]])
            .append_query_results([vec![drawing_row(
                DrawingStatus::Completed,
                &[winner(11, true)],
            )]])
            .into_connection();
        let svc = service(db);

        let result = svc.notify_winners(5).await.unwrap();
        assert_eq!(result.notified, 0);
        assert_eq!(result.failed, 0);
        assert!(svc.notify_guard.try_claim(5).is_some());
    }

    #[test]
    fn test_notify_claim_is_exclusive_per_drawing() {
        let guard = NotifyGuard::default();
        let first = guard.try_claim(5).unwrap();
        assert!(guard.try_claim(5).is_none());
        assert!(guard.try_claim(6).is_some());
        drop(first);
        assert!(guard.try_claim(5).is_some());
    }

    #[actix_web::test]
    async fn test_create_rejects_out_of_range_factors() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let svc = service(db.clone());
        let err = svc
            .create(
                &admin(),
                CreateDrawingRequest {
                    name: "Spring draw".into(),
                    description: None,
                    drawing_date: at(12, 0),
                    weighting_factors: Some(WeightingFactors {
                        completion_time: 1.0,
                        stations_found: 500.0,
                    }),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(db.into_transaction_log().is_empty());
    }

    #[test]
    fn test_validate_factors() {
        assert!(validate_factors(&WeightingFactors::default(), 100.0).is_ok());
        assert!(
            validate_factors(
                &WeightingFactors {
                    completion_time: 0.0,
                    stations_found: 0.0
                },
                100.0
            )
            .is_ok()
        );
        assert!(
            validate_factors(
                &WeightingFactors {
                    completion_time: -1.0,
                    stations_found: 1.0
                },
                100.0
            )
            .is_err()
        );
        assert!(
            validate_factors(
                &WeightingFactors {
                    completion_time: 1.0,
                    stations_found: 101.0
                },
                100.0
            )
            .is_err()
        );
        assert!(
            validate_factors(
                &WeightingFactors {
                    completion_time: f64::NAN,
                    stations_found: 1.0
                },
                100.0
            )
            .is_err()
        );
    }
}
