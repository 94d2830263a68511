use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::drawings::{DrawingWinner, WeightingFactors};
use crate::entities::{DrawingStatus, UserRole};
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::me,
        handlers::station::list_stations,
        handlers::station::get_station,
        handlers::station::create_station,
        handlers::station::update_station,
        handlers::station::deactivate_station,
        handlers::class::create_class,
        handlers::class::list_classes,
        handlers::class::get_class,
        handlers::class::update_class,
        handlers::class::deactivate_class,
        handlers::class::get_progress,
        handlers::class::list_class_scans,
        handlers::scan::record_scan,
        handlers::drawing::eligible_classes,
        handlers::drawing::create_drawing,
        handlers::drawing::list_drawings,
        handlers::drawing::get_drawing,
        handlers::drawing::run_drawing,
        handlers::drawing::notify_winners,
    ),
    components(
        schemas(
            UserRole,
            UserResponse,
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            StationResponse,
            StationDisplay,
            StationQuery,
            CreateStationRequest,
            UpdateStationRequest,
            ClassResponse,
            ClassDetailResponse,
            CreateClassRequest,
            UpdateClassRequest,
            ProgressResponse,
            PaginationParams,
            RecordScanRequest,
            ScanResultResponse,
            ScanRecordResponse,
            DrawingStatus,
            DrawingWinner,
            WeightingFactors,
            CreateDrawingRequest,
            RunDrawingRequest,
            DrawingResponse,
            EligibleClassResponse,
            EligibleClassesResponse,
            NotifyWinnersResponse,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Teacher authentication API"),
        (name = "station", description = "Hunt station API"),
        (name = "class", description = "Class registration and progress API"),
        (name = "scan", description = "QR scan API"),
        (name = "drawing", description = "Prize drawing API"),
    ),
    info(
        title = "QR Hunt Backend API",
        version = "1.0.0",
        description = "QR scavenger hunt REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_hunt_paths() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/scans"));
        assert!(paths.contains_key("/classes/{id}/progress"));
        assert!(paths.contains_key("/drawings/{id}/run"));
        assert!(doc.components.is_some());
    }
}
