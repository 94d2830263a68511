use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "snake_case")]
pub enum DrawingStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
}

impl std::fmt::Display for DrawingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawingStatus::Pending => write!(f, "pending"),
            DrawingStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Multipliers applied when weighting eligible classes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeightingFactors {
    /// Flat bonus for classes with a measurable completion time
    #[serde(default = "default_completion_time")]
    pub completion_time: f64,
    /// Bonus per station found
    #[serde(default = "default_stations_found")]
    pub stations_found: f64,
}

fn default_completion_time() -> f64 {
    1.0
}

fn default_stations_found() -> f64 {
    1.0
}

impl Default for WeightingFactors {
    fn default() -> Self {
        Self {
            completion_time: default_completion_time(),
            stations_found: default_stations_found(),
        }
    }
}

/// 中奖记录（存于 drawings.winners JSON 数组）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DrawingWinner {
    pub class_id: i64,
    pub class_name: String,
    pub class_code: String,
    pub teacher_id: i64,
    pub prize: String,
    #[serde(default)]
    pub notified: bool,
}

/// 抽奖活动
/// - status: pending -> completed，completed 之后不可再次运行
/// - eligible_class_ids / winners 在运行时写入
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "drawings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub drawing_date: DateTime<Utc>,
    #[sea_orm(column_type = "JsonBinary")]
    pub eligible_class_ids: JsonValue,
    #[sea_orm(column_type = "JsonBinary")]
    pub winners: JsonValue,
    #[sea_orm(column_type = "JsonBinary")]
    pub weighting_factors: JsonValue,
    pub status: DrawingStatus,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn eligible_ids(&self) -> Vec<i64> {
        serde_json::from_value(self.eligible_class_ids.clone()).unwrap_or_default()
    }

    pub fn winner_list(&self) -> Vec<DrawingWinner> {
        serde_json::from_value(self.winners.clone()).unwrap_or_default()
    }

    /// Stored factors; missing or malformed fields fall back to the defaults.
    pub fn factors(&self) -> WeightingFactors {
        serde_json::from_value(self.weighting_factors.clone()).unwrap_or_default()
    }

    pub fn is_completed(&self) -> bool {
        self.status == DrawingStatus::Completed
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CreatedBy",
        to = "super::users::Column::Id"
    )]
    Creator,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
