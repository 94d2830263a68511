use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 参赛班级
/// 说明:
/// - stations_scanned 是扫描过的站点 id 去重列表（冗余缓存，以 scans 表为准）
/// - is_completed 一旦为 true 不再回退
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "classes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    #[sea_orm(unique)]
    pub class_code: String,
    pub teacher_id: i64,
    pub grade: Option<String>,
    pub student_count: Option<i32>,
    pub is_active: bool,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    #[sea_orm(column_type = "JsonBinary")]
    pub stations_scanned: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Cached station ids; malformed JSON reads as empty.
    pub fn scanned_station_ids(&self) -> Vec<i64> {
        serde_json::from_value(self.stations_scanned.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::TeacherId",
        to = "super::users::Column::Id"
    )]
    Teacher,
    #[sea_orm(has_many = "super::scans::Entity")]
    Scans,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
}

impl Related<super::scans::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Scans.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
