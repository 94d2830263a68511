use crate::middlewares::{ANY_ROLE, authorize};
use crate::models::*;
use crate::services::ScanService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/scans",
    tag = "scan",
    request_body = RecordScanRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "首次扫描该站点", body = ScanResultResponse),
        (status = 200, description = "重复扫描，existing = true", body = ScanResultResponse),
        (status = 400, description = "参数缺失或站点/班级已停用", body = ApiError),
        (status = 403, description = "不能为其他教师的班级扫码", body = ApiError),
        (status = 404, description = "站点或班级不存在", body = ApiError)
    )
)]
/// 班级扫描站点二维码
pub async fn record_scan(
    service: web::Data<ScanService>,
    req: HttpRequest,
    request: web::Json<RecordScanRequest>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service.record_scan(&user, request.into_inner()).await {
        Ok(outcome) if outcome.created => Ok(HttpResponse::Created().json(json!({
            "success": true,
            "data": outcome.result,
            "message": "Station found!"
        }))),
        Ok(outcome) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": outcome.result,
            "message": "Station already scanned"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn scan_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/scans").route("", web::post().to(record_scan)));
}
