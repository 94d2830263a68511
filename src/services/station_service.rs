use super::is_unique_violation;
use crate::entities::station_entity as stations;
use crate::error::{AppError, AppResult};
use crate::models::{CreateStationRequest, UpdateStationRequest};
use crate::utils::generate_unique_qr_identifier;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

/// Ids of every active station. This is the roster "total stations" is
/// measured against.
pub async fn active_station_ids<C: ConnectionTrait>(db: &C) -> Result<Vec<i64>, DbErr> {
    stations::Entity::find()
        .select_only()
        .column(stations::Column::Id)
        .filter(stations::Column::IsActive.eq(true))
        .into_tuple::<i64>()
        .all(db)
        .await
}

/// Resolves a scanned code to a station: first by qr identifier, then by
/// numeric id.
pub async fn find_station_by_code<C: ConnectionTrait>(
    db: &C,
    code: &str,
) -> Result<Option<stations::Model>, DbErr> {
    let by_qr = stations::Entity::find()
        .filter(stations::Column::QrIdentifier.eq(code))
        .one(db)
        .await?;
    if by_qr.is_some() {
        return Ok(by_qr);
    }

    match code.parse::<i64>() {
        Ok(id) => stations::Entity::find_by_id(id).one(db).await,
        Err(_) => Ok(None),
    }
}

fn tips_json(tips: &[String]) -> AppResult<serde_json::Value> {
    let cleaned: Vec<&str> = tips
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    Ok(serde_json::to_value(cleaned)?)
}

#[derive(Clone)]
pub struct StationService {
    pool: DatabaseConnection,
}

impl StationService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn list(&self, include_inactive: bool) -> AppResult<Vec<stations::Model>> {
        let mut query = stations::Entity::find();
        if !include_inactive {
            query = query.filter(stations::Column::IsActive.eq(true));
        }
        let list = query
            .order_by_asc(stations::Column::SortOrder)
            .order_by_asc(stations::Column::Id)
            .all(&self.pool)
            .await?;
        Ok(list)
    }

    /// Inactive stations are only visible when `include_inactive` is set.
    pub async fn get(&self, id: i64, include_inactive: bool) -> AppResult<stations::Model> {
        let station = stations::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .filter(|s| include_inactive || s.is_active)
            .ok_or_else(|| AppError::NotFound("Station not found".to_string()))?;
        Ok(station)
    }

    pub async fn create(&self, request: CreateStationRequest) -> AppResult<stations::Model> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Station name is required".to_string()));
        }

        let qr_identifier = match request
            .qr_identifier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(code) => {
                let taken = stations::Entity::find()
                    .filter(stations::Column::QrIdentifier.eq(code))
                    .count(&self.pool)
                    .await?;
                if taken > 0 {
                    return Err(AppError::Conflict(
                        "QR identifier is already in use".to_string(),
                    ));
                }
                code.to_string()
            }
            None => generate_unique_qr_identifier(&self.pool).await?,
        };

        let now = Utc::now();
        let station = stations::ActiveModel {
            name: Set(name.to_string()),
            description: Set(request.description),
            qr_identifier: Set(qr_identifier),
            location: Set(request.location),
            image_url: Set(request.image_url),
            tips: Set(tips_json(&request.tips)?),
            sort_order: Set(request.sort_order.unwrap_or(0)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("QR identifier is already in use".to_string())
            } else {
                e.into()
            }
        })?;

        log::info!(
            "Station created: id={}, qr={}",
            station.id,
            station.qr_identifier
        );
        Ok(station)
    }

    pub async fn update(
        &self,
        id: i64,
        request: UpdateStationRequest,
    ) -> AppResult<stations::Model> {
        let station = self.get(id, true).await?;
        let mut am = station.into_active_model();

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::ValidationError(
                    "Station name cannot be empty".to_string(),
                ));
            }
            am.name = Set(name);
        }
        if let Some(description) = request.description {
            am.description = Set(Some(description));
        }
        if let Some(location) = request.location {
            am.location = Set(Some(location));
        }
        if let Some(image_url) = request.image_url {
            am.image_url = Set(Some(image_url));
        }
        if let Some(tips) = request.tips {
            am.tips = Set(tips_json(&tips)?);
        }
        if let Some(sort_order) = request.sort_order {
            am.sort_order = Set(sort_order);
        }
        if let Some(is_active) = request.is_active {
            am.is_active = Set(is_active);
        }
        am.updated_at = Set(Utc::now());

        Ok(am.update(&self.pool).await?)
    }

    /// 站点只停用不删除，历史扫描仍然引用它
    pub async fn deactivate(&self, id: i64) -> AppResult<stations::Model> {
        let station = self.get(id, true).await?;
        if !station.is_active {
            return Ok(station);
        }
        let mut am = station.into_active_model();
        am.is_active = Set(false);
        am.updated_at = Set(Utc::now());
        let station = am.update(&self.pool).await?;
        log::info!("Station deactivated: id={}", station.id);
        Ok(station)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tips_json_drops_blank_entries() {
        let tips = vec![" Look up ".to_string(), "".to_string(), "  ".to_string()];
        assert_eq!(tips_json(&tips).unwrap(), serde_json::json!(["Look up"]));
    }
}
