use actix_web::{HttpResponse, Result, web};
use sea_orm::DatabaseConnection;
use serde_json::json;

/// 存活探针，同时检查数据库连接
pub async fn health(pool: web::Data<DatabaseConnection>) -> Result<HttpResponse> {
    match pool.ping().await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": { "status": "ok", "database": "up" }
        }))),
        Err(e) => {
            log::error!("Health check failed: {e}");
            Ok(HttpResponse::ServiceUnavailable().json(json!({
                "success": false,
                "error": "Database unavailable",
                "code": "DATABASE_ERROR"
            })))
        }
    }
}

pub fn health_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}
