use crate::middlewares::{ADMIN_ONLY, ANY_ROLE, authorize};
use crate::models::*;
use crate::services::StationService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/stations",
    tag = "station",
    params(
        ("includeInactive" = Option<bool>, Query, description = "包含已停用站点（仅管理员）")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "站点列表", body = [StationResponse]),
        (status = 401, description = "未授权", body = ApiError)
    )
)]
pub async fn list_stations(
    service: web::Data<StationService>,
    req: HttpRequest,
    query: web::Query<StationQuery>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    let include_inactive = user.is_admin() && query.include_inactive.unwrap_or(false);

    match service.list(include_inactive).await {
        Ok(list) => {
            let data: Vec<StationResponse> = list
                .into_iter()
                .map(|s| StationResponse::from_model(s, user.is_admin()))
                .collect();
            Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/stations/{id}",
    tag = "station",
    params(("id" = i64, Path, description = "站点ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "站点详情", body = StationResponse),
        (status = 404, description = "站点不存在", body = ApiError)
    )
)]
pub async fn get_station(
    service: web::Data<StationService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service.get(path.into_inner(), user.is_admin()).await {
        Ok(station) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": StationResponse::from_model(station, user.is_admin())
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/stations",
    tag = "station",
    request_body = CreateStationRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "站点已创建", body = StationResponse),
        (status = 403, description = "需要管理员权限", body = ApiError),
        (status = 409, description = "二维码标识已被占用", body = ApiError)
    )
)]
pub async fn create_station(
    service: web::Data<StationService>,
    req: HttpRequest,
    request: web::Json<CreateStationRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, ADMIN_ONLY) {
        return Ok(e.error_response());
    }
    match service.create(request.into_inner()).await {
        Ok(station) => Ok(HttpResponse::Created().json(json!({
            "success": true,
            "data": StationResponse::from_model(station, true)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/stations/{id}",
    tag = "station",
    params(("id" = i64, Path, description = "站点ID")),
    request_body = UpdateStationRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "站点已更新", body = StationResponse),
        (status = 403, description = "需要管理员权限", body = ApiError),
        (status = 404, description = "站点不存在", body = ApiError)
    )
)]
pub async fn update_station(
    service: web::Data<StationService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateStationRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, ADMIN_ONLY) {
        return Ok(e.error_response());
    }
    match service.update(path.into_inner(), request.into_inner()).await {
        Ok(station) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": StationResponse::from_model(station, true)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/stations/{id}",
    tag = "station",
    params(("id" = i64, Path, description = "站点ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "站点已停用", body = StationResponse),
        (status = 403, description = "需要管理员权限", body = ApiError),
        (status = 404, description = "站点不存在", body = ApiError)
    )
)]
/// 停用站点（不删除）
pub async fn deactivate_station(
    service: web::Data<StationService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, ADMIN_ONLY) {
        return Ok(e.error_response());
    }
    match service.deactivate(path.into_inner()).await {
        Ok(station) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": StationResponse::from_model(station, true),
            "message": "Station deactivated"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn station_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/stations")
            .route("", web::get().to(list_stations))
            .route("", web::post().to(create_station))
            .route("/{id}", web::get().to(get_station))
            .route("/{id}", web::put().to(update_station))
            .route("/{id}", web::delete().to(deactivate_station)),
    );
}
