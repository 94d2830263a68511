use crate::engine::Entrant;
use crate::entities::{DrawingStatus, drawing_entity, drawings::DrawingWinner, drawings::WeightingFactors};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDrawingRequest {
    #[schema(example = "Spring Hunt Grand Prize")]
    pub name: String,
    pub description: Option<String>,
    pub drawing_date: DateTime<Utc>,
    pub weighting_factors: Option<WeightingFactors>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunDrawingRequest {
    #[schema(example = 3)]
    pub number_of_winners: Option<i64>,
    pub prize_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DrawingResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub drawing_date: DateTime<Utc>,
    pub eligible_classes: Vec<i64>,
    pub winners: Vec<DrawingWinner>,
    pub weighting_factors: WeightingFactors,
    pub status: DrawingStatus,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<drawing_entity::Model> for DrawingResponse {
    fn from(m: drawing_entity::Model) -> Self {
        Self {
            eligible_classes: m.eligible_ids(),
            winners: m.winner_list(),
            weighting_factors: m.factors(),
            id: m.id,
            name: m.name,
            description: m.description,
            drawing_date: m.drawing_date,
            status: m.status,
            created_by: m.created_by,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EligibleClassResponse {
    pub class_id: i64,
    pub class_name: String,
    pub class_code: String,
    pub teacher_id: i64,
    pub completed_count: usize,
    pub completion_time: Option<i64>,
    /// Tickets under the default weighting factors
    pub weight: u32,
}

impl From<Entrant> for EligibleClassResponse {
    fn from(e: Entrant) -> Self {
        Self {
            class_id: e.class_id,
            class_name: e.class_name,
            class_code: e.class_code,
            teacher_id: e.teacher_id,
            completed_count: e.completed_count,
            completion_time: e.completion_time_minutes,
            weight: e.weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EligibleClassesResponse {
    pub total_stations: usize,
    pub count: usize,
    pub classes: Vec<EligibleClassResponse>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotifyWinnersResponse {
    pub notified: usize,
    pub failed: usize,
}
