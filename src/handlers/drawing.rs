use crate::middlewares::{ADMIN_ONLY, authorize};
use crate::models::*;
use crate::services::DrawingService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/drawings/eligible-classes",
    tag = "drawing",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "当前合格的班级及默认权重", body = EligibleClassesResponse),
        (status = 400, description = "没有启用的站点", body = ApiError),
        (status = 403, description = "需要管理员权限", body = ApiError)
    )
)]
pub async fn eligible_classes(
    service: web::Data<DrawingService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, ADMIN_ONLY) {
        return Ok(e.error_response());
    }
    match service.eligible_classes().await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/drawings",
    tag = "drawing",
    request_body = CreateDrawingRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "抽奖已创建", body = DrawingResponse),
        (status = 400, description = "请求参数错误", body = ApiError),
        (status = 403, description = "需要管理员权限", body = ApiError)
    )
)]
pub async fn create_drawing(
    service: web::Data<DrawingService>,
    req: HttpRequest,
    request: web::Json<CreateDrawingRequest>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ADMIN_ONLY) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service.create(&user, request.into_inner()).await {
        Ok(drawing) => Ok(HttpResponse::Created().json(json!({ "success": true, "data": drawing }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/drawings",
    tag = "drawing",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "抽奖列表", body = [DrawingResponse]),
        (status = 403, description = "需要管理员权限", body = ApiError)
    )
)]
pub async fn list_drawings(
    service: web::Data<DrawingService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, ADMIN_ONLY) {
        return Ok(e.error_response());
    }
    match service.list().await {
        Ok(list) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": list }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/drawings/{id}",
    tag = "drawing",
    params(("id" = i64, Path, description = "抽奖ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "抽奖详情", body = DrawingResponse),
        (status = 404, description = "抽奖不存在", body = ApiError)
    )
)]
pub async fn get_drawing(
    service: web::Data<DrawingService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, ADMIN_ONLY) {
        return Ok(e.error_response());
    }
    match service.get(path.into_inner()).await {
        Ok(drawing) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": drawing }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/drawings/{id}/run",
    tag = "drawing",
    params(("id" = i64, Path, description = "抽奖ID")),
    request_body = RunDrawingRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "抽奖完成", body = DrawingResponse),
        (status = 400, description = "人数无效、无启用站点或无合格班级", body = ApiError),
        (status = 404, description = "抽奖不存在", body = ApiError),
        (status = 409, description = "抽奖已完成", body = ApiError)
    )
)]
/// 运行抽奖：按权重抽取不重复的中奖班级，完成后不可再次运行
pub async fn run_drawing(
    service: web::Data<DrawingService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<RunDrawingRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, ADMIN_ONLY) {
        return Ok(e.error_response());
    }
    match service
        .run_drawing(path.into_inner(), request.into_inner())
        .await
    {
        Ok(drawing) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": drawing,
            "message": "Drawing completed"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/drawings/{id}/notify",
    tag = "drawing",
    params(("id" = i64, Path, description = "抽奖ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "重新通知未通知的中奖班级", body = NotifyWinnersResponse),
        (status = 400, description = "抽奖尚未运行", body = ApiError),
        (status = 404, description = "抽奖不存在", body = ApiError),
        (status = 409, description = "通知正在进行中", body = ApiError)
    )
)]
pub async fn notify_winners(
    service: web::Data<DrawingService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = authorize(&req, ADMIN_ONLY) {
        return Ok(e.error_response());
    }
    match service.notify_winners(path.into_inner()).await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn drawing_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/drawings")
            .route("", web::get().to(list_drawings))
            .route("", web::post().to(create_drawing))
            .route("/eligible-classes", web::get().to(eligible_classes))
            .route("/{id}", web::get().to(get_drawing))
            .route("/{id}/run", web::post().to(run_drawing))
            .route("/{id}/notify", web::post().to(notify_winners)),
    );
}
