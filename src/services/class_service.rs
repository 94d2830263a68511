use super::is_unique_violation;
use super::station_service::active_station_ids;
use crate::engine::progress::reconcile;
use crate::engine::{CachedProgress, ProgressResult, ScanPoint, compute_progress};
use crate::entities::{UserRole, class_entity as classes, scan_entity as scans, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::middlewares::AuthUser;
use crate::models::{
    ClassDetailResponse, ClassResponse, CreateClassRequest, PaginatedResponse, PaginationParams,
    ProgressResponse, ScanRecordResponse, UpdateClassRequest,
};
use crate::utils::generate_unique_class_code;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::HashMap;

/// Loads a class and checks that `user` may act on it. Teachers only reach
/// their own classes.
pub async fn load_class_for<C: ConnectionTrait>(
    db: &C,
    user: &AuthUser,
    class_id: i64,
) -> AppResult<classes::Model> {
    let class = classes::Entity::find_by_id(class_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;

    if !user.is_admin() && class.teacher_id != user.id {
        return Err(AppError::PermissionDenied);
    }
    Ok(class)
}

pub async fn scan_points<C: ConnectionTrait>(db: &C, class_id: i64) -> AppResult<Vec<ScanPoint>> {
    let list = scans::Entity::find()
        .filter(scans::Column::ClassId.eq(class_id))
        .all(db)
        .await?;
    Ok(list.iter().map(ScanPoint::from).collect())
}

pub(crate) fn cached_of(class: &classes::Model) -> CachedProgress {
    CachedProgress {
        stations_scanned: class.scanned_station_ids(),
        is_completed: class.is_completed,
        completed_at: class.completed_at,
        last_scan_at: class.last_scan_at,
    }
}

/// Recomputes progress from scan history and writes the cached class fields
/// back when they drifted. Returns the (possibly updated) class row.
pub async fn reconcile_class<C: ConnectionTrait>(
    db: &C,
    class: classes::Model,
    scans: &[ScanPoint],
    active_ids: &[i64],
) -> AppResult<(classes::Model, ProgressResult)> {
    let progress = compute_progress(scans, active_ids);
    let cached = cached_of(&class);
    let fixed = reconcile(&cached, scans, active_ids);

    if fixed.same_as(&cached) {
        return Ok((class, progress));
    }

    let class_id = class.id;
    let newly_completed = fixed.is_completed && !class.is_completed;
    let mut am = class.into_active_model();
    am.stations_scanned = Set(serde_json::to_value(&fixed.stations_scanned)?);
    am.is_completed = Set(fixed.is_completed);
    am.completed_at = Set(fixed.completed_at);
    am.last_scan_at = Set(fixed.last_scan_at);
    am.updated_at = Set(Utc::now());
    let updated = am.update(db).await?;

    log::info!("Reconciled cached progress for class {class_id}");
    if newly_completed {
        log::info!("Class {class_id} completed the hunt (detected on reconcile)");
    }
    Ok((updated, progress))
}

#[derive(Clone)]
pub struct ClassService {
    pool: DatabaseConnection,
}

impl ClassService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user: &AuthUser,
        request: CreateClassRequest,
    ) -> AppResult<ClassResponse> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Class name is required".to_string()));
        }
        if matches!(request.student_count, Some(n) if n < 0) {
            return Err(AppError::ValidationError(
                "studentCount cannot be negative".to_string(),
            ));
        }

        // 管理员可代教师登记班级
        let teacher_id = match request.teacher_id {
            Some(id) if user.is_admin() && id != user.id => {
                let teacher = users::Entity::find_by_id(id)
                    .one(&self.pool)
                    .await?
                    .filter(|u| u.is_active)
                    .ok_or_else(|| AppError::NotFound("Teacher not found".to_string()))?;
                teacher.id
            }
            Some(id) if !user.is_admin() && id != user.id => {
                return Err(AppError::PermissionDenied);
            }
            _ => user.id,
        };

        let class_code = generate_unique_class_code(&self.pool).await?;
        let now = Utc::now();

        let class = classes::ActiveModel {
            name: Set(name.to_string()),
            class_code: Set(class_code),
            teacher_id: Set(teacher_id),
            grade: Set(request.grade),
            student_count: Set(request.student_count),
            is_active: Set(true),
            is_completed: Set(false),
            completed_at: Set(None),
            last_scan_at: Set(None),
            registered_at: Set(now),
            stations_scanned: Set(serde_json::json!([])),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Class code collision, please retry".to_string())
            } else {
                e.into()
            }
        })?;

        log::info!(
            "Class registered: id={}, code={}, teacher={}",
            class.id,
            class.class_code,
            class.teacher_id
        );
        Ok(class.into())
    }

    /// 教师只能看到自己的班级，管理员看到全部
    pub async fn list(
        &self,
        user: &AuthUser,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<ClassResponse>> {
        let mut query = classes::Entity::find();
        if user.role == UserRole::Teacher {
            query = query.filter(classes::Column::TeacherId.eq(user.id));
        }

        let total = query.clone().count(&self.pool).await? as i64;
        let items = query
            .order_by_desc(classes::Column::RegisteredAt)
            .order_by_desc(classes::Column::Id)
            .limit(params.get_limit() as u64)
            .offset(params.get_offset() as u64)
            .all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(
            items.into_iter().map(Into::into).collect(),
            params,
            total,
        ))
    }

    pub async fn get_detail(&self, user: &AuthUser, class_id: i64) -> AppResult<ClassDetailResponse> {
        let (class, progress) = self.progress_for(user, class_id).await?;
        let progress = ProgressResponse::new(&progress, &class);
        Ok(ClassDetailResponse {
            class: class.into(),
            progress,
        })
    }

    pub async fn update(
        &self,
        user: &AuthUser,
        class_id: i64,
        request: UpdateClassRequest,
    ) -> AppResult<ClassResponse> {
        let class = load_class_for(&self.pool, user, class_id).await?;
        let mut am = class.into_active_model();

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::ValidationError(
                    "Class name cannot be empty".to_string(),
                ));
            }
            am.name = Set(name);
        }
        if let Some(grade) = request.grade {
            am.grade = Set(Some(grade));
        }
        if let Some(count) = request.student_count {
            if count < 0 {
                return Err(AppError::ValidationError(
                    "studentCount cannot be negative".to_string(),
                ));
            }
            am.student_count = Set(Some(count));
        }
        if let Some(is_active) = request.is_active {
            am.is_active = Set(is_active);
        }
        am.updated_at = Set(Utc::now());

        Ok(am.update(&self.pool).await?.into())
    }

    pub async fn deactivate(&self, user: &AuthUser, class_id: i64) -> AppResult<ClassResponse> {
        let class = load_class_for(&self.pool, user, class_id).await?;
        if !class.is_active {
            return Ok(class.into());
        }
        let mut am = class.into_active_model();
        am.is_active = Set(false);
        am.updated_at = Set(Utc::now());
        let class = am.update(&self.pool).await?;
        log::info!("Class deactivated: id={}", class.id);
        Ok(class.into())
    }

    /// Progress recomputed from scan history, with the cached class fields
    /// reconciled as a side effect.
    pub async fn get_progress(&self, user: &AuthUser, class_id: i64) -> AppResult<ProgressResponse> {
        let (class, progress) = self.progress_for(user, class_id).await?;
        Ok(ProgressResponse::new(&progress, &class))
    }

    pub async fn list_scans(
        &self,
        user: &AuthUser,
        class_id: i64,
    ) -> AppResult<Vec<ScanRecordResponse>> {
        let class = load_class_for(&self.pool, user, class_id).await?;
        let list = scans::Entity::find()
            .filter(scans::Column::ClassId.eq(class.id))
            .order_by_asc(scans::Column::ScannedAt)
            .order_by_asc(scans::Column::Id)
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    /// Reconciles the cached progress of every class. Returns how many rows
    /// were rewritten.
    pub async fn reconcile_all_progress(&self) -> AppResult<usize> {
        let active_ids = active_station_ids(&self.pool).await?;
        let all_classes = classes::Entity::find().all(&self.pool).await?;

        let mut by_class: HashMap<i64, Vec<ScanPoint>> = HashMap::new();
        for scan in scans::Entity::find().all(&self.pool).await? {
            by_class
                .entry(scan.class_id)
                .or_default()
                .push(ScanPoint::from(&scan));
        }

        let mut fixed = 0;
        for class in all_classes {
            let class_id = class.id;
            let before = cached_of(&class);
            let points = by_class.remove(&class_id).unwrap_or_default();
            match reconcile_class(&self.pool, class, &points, &active_ids).await {
                Ok((after, _)) if !before.same_as(&cached_of(&after)) => fixed += 1,
                Ok(_) => {}
                Err(e) => log::error!("Failed to reconcile class {class_id}: {e}"),
            }
        }
        Ok(fixed)
    }

    async fn progress_for(
        &self,
        user: &AuthUser,
        class_id: i64,
    ) -> AppResult<(classes::Model, ProgressResult)> {
        let class = load_class_for(&self.pool, user, class_id).await?;
        let points = scan_points(&self.pool, class.id).await?;
        let active_ids = active_station_ids(&self.pool).await?;
        reconcile_class(&self.pool, class, &points, &active_ids).await
    }
}
