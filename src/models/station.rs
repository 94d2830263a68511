use crate::entities::station_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStationRequest {
    #[schema(example = "Old Oak Tree")]
    pub name: String,
    pub description: Option<String>,
    /// 为空时自动生成
    pub qr_identifier: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub tips: Option<Vec<String>>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationQuery {
    /// 仅管理员有效
    pub include_inactive: Option<bool>,
}

/// Station as listed to teachers and admins. `qrIdentifier` is only
/// filled in for admins so the codes can't be read off the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_identifier: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub tips: Vec<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl StationResponse {
    pub fn from_model(m: station_entity::Model, reveal_qr: bool) -> Self {
        let tips = m.tip_list();
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            qr_identifier: reveal_qr.then_some(m.qr_identifier),
            location: m.location,
            image_url: m.image_url,
            tips,
            sort_order: m.sort_order,
            is_active: m.is_active,
            created_at: m.created_at,
        }
    }
}

/// 扫码成功后展示给班级的站点信息
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationDisplay {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub tips: Vec<String>,
}

impl From<&station_entity::Model> for StationDisplay {
    fn from(m: &station_entity::Model) -> Self {
        Self {
            id: m.id,
            name: m.name.clone(),
            description: m.description.clone(),
            location: m.location.clone(),
            image_url: m.image_url.clone(),
            tips: m.tip_list(),
        }
    }
}
