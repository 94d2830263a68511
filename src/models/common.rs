use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body produced by `AppError`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub success: bool,
    #[schema(example = "Station not found")]
    pub error: String,
    #[schema(example = "NOT_FOUND")]
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use actix_web::ResponseError;

    #[actix_web::test]
    async fn test_app_error_body_matches_schema() {
        let resp = AppError::NotFound("Station not found".into()).error_response();
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let parsed: ApiError = serde_json::from_slice(&body).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error, "Station not found");
        assert_eq!(parsed.code, "NOT_FOUND");
    }
}
