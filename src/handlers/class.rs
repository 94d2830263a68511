use crate::middlewares::{ANY_ROLE, authorize};
use crate::models::*;
use crate::services::ClassService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/classes",
    tag = "class",
    request_body = CreateClassRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "班级已登记", body = ClassResponse),
        (status = 400, description = "请求参数错误", body = ApiError)
    )
)]
pub async fn create_class(
    service: web::Data<ClassService>,
    req: HttpRequest,
    request: web::Json<CreateClassRequest>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service.create(&user, request.into_inner()).await {
        Ok(class) => Ok(HttpResponse::Created().json(json!({ "success": true, "data": class }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/classes",
    tag = "class",
    params(
        ("page" = Option<i64>, Query, description = "页码 (默认1)"),
        ("page_size" = Option<i64>, Query, description = "每页数量 (默认20，最大100)")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "班级列表（教师仅自己的班级）"),
        (status = 401, description = "未授权", body = ApiError)
    )
)]
pub async fn list_classes(
    service: web::Data<ClassService>,
    req: HttpRequest,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service.list(&user, &query.into_inner()).await {
        Ok(page) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": page }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/classes/{id}",
    tag = "class",
    params(("id" = i64, Path, description = "班级ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "班级详情与进度", body = ClassDetailResponse),
        (status = 403, description = "无权访问该班级", body = ApiError),
        (status = 404, description = "班级不存在", body = ApiError)
    )
)]
pub async fn get_class(
    service: web::Data<ClassService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service.get_detail(&user, path.into_inner()).await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/classes/{id}",
    tag = "class",
    params(("id" = i64, Path, description = "班级ID")),
    request_body = UpdateClassRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "班级已更新", body = ClassResponse),
        (status = 403, description = "无权访问该班级", body = ApiError),
        (status = 404, description = "班级不存在", body = ApiError)
    )
)]
pub async fn update_class(
    service: web::Data<ClassService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateClassRequest>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service
        .update(&user, path.into_inner(), request.into_inner())
        .await
    {
        Ok(class) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": class }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/classes/{id}",
    tag = "class",
    params(("id" = i64, Path, description = "班级ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "班级已停用", body = ClassResponse),
        (status = 403, description = "无权访问该班级", body = ApiError),
        (status = 404, description = "班级不存在", body = ApiError)
    )
)]
pub async fn deactivate_class(
    service: web::Data<ClassService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service.deactivate(&user, path.into_inner()).await {
        Ok(class) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": class,
            "message": "Class deactivated"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/classes/{id}/progress",
    tag = "class",
    params(("id" = i64, Path, description = "班级ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "寻宝进度（按扫描记录重新计算）", body = ProgressResponse),
        (status = 403, description = "无权访问该班级", body = ApiError),
        (status = 404, description = "班级不存在", body = ApiError)
    )
)]
pub async fn get_progress(
    service: web::Data<ClassService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service.get_progress(&user, path.into_inner()).await {
        Ok(data) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/classes/{id}/scans",
    tag = "class",
    params(("id" = i64, Path, description = "班级ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "扫描记录（按时间正序）", body = [ScanRecordResponse]),
        (status = 403, description = "无权访问该班级", body = ApiError),
        (status = 404, description = "班级不存在", body = ApiError)
    )
)]
pub async fn list_class_scans(
    service: web::Data<ClassService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match authorize(&req, ANY_ROLE) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    match service.list_scans(&user, path.into_inner()).await {
        Ok(list) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": list }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn class_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/classes")
            .route("", web::get().to(list_classes))
            .route("", web::post().to(create_class))
            .route("/{id}", web::get().to(get_class))
            .route("/{id}", web::put().to(update_class))
            .route("/{id}", web::delete().to(deactivate_class))
            .route("/{id}/progress", web::get().to(get_progress))
            .route("/{id}/scans", web::get().to(list_class_scans)),
    );
}
