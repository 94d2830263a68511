use super::{ProgressResponse, StationDisplay};
use crate::entities::scan_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordScanRequest {
    #[schema(example = 12)]
    pub class_id: Option<i64>,
    /// Station qr identifier, or the numeric station id
    #[serde(rename = "stationQRCode", alias = "stationQrCode")]
    #[schema(example = "station-3f0c2a")]
    pub station_qr_code: Option<String>,
    #[schema(value_type = Object)]
    pub device_info: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultResponse {
    /// true when this station had already been scanned by the class
    pub existing: bool,
    pub scan_id: i64,
    pub scanned_at: DateTime<Utc>,
    pub station: StationDisplay,
    pub progress: ProgressResponse,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecordResponse {
    pub id: i64,
    pub class_id: i64,
    pub station_id: i64,
    pub scanned_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub device_info: Option<JsonValue>,
}

impl From<scan_entity::Model> for ScanRecordResponse {
    fn from(m: scan_entity::Model) -> Self {
        Self {
            id: m.id,
            class_id: m.class_id,
            station_id: m.station_id,
            scanned_at: m.scanned_at,
            device_info: m.device_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_request_field_names() {
        let req: RecordScanRequest = serde_json::from_value(json!({
            "classId": 4,
            "stationQRCode": "station-abc",
            "deviceInfo": { "ua": "iPad" }
        }))
        .unwrap();
        assert_eq!(req.class_id, Some(4));
        assert_eq!(req.station_qr_code.as_deref(), Some("station-abc"));
        assert!(req.device_info.is_some());

        let alias: RecordScanRequest =
            serde_json::from_value(json!({ "classId": 4, "stationQrCode": "7" })).unwrap();
        assert_eq!(alias.station_qr_code.as_deref(), Some("7"));
        assert!(alias.device_info.is_none());
    }
}
