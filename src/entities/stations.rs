use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 站点（实体二维码检查点）
/// - qr_identifier: 二维码内容，唯一
/// - is_active: 只有启用的站点计入总站点数；停用而不删除，保留历史扫描引用
/// - tips: JSON 字符串数组，仅用于展示
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "stations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[sea_orm(unique)]
    pub qr_identifier: String,
    pub location: Option<String>,
    pub image_url: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub tips: JsonValue,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn tip_list(&self) -> Vec<String> {
        serde_json::from_value(self.tips.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::scans::Entity")]
    Scans,
}

impl Related<super::scans::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Scans.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
