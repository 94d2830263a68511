pub mod auth;
pub mod class;
pub mod drawing;
pub mod health;
pub mod scan;
pub mod station;

pub use auth::auth_config;
pub use class::class_config;
pub use drawing::drawing_config;
pub use health::health_config;
pub use scan::scan_config;
pub use station::station_config;

use crate::error::AppError;
use actix_web::{HttpRequest, error::JsonPayloadError};

/// Maps JSON body extraction failures onto the uniform error body.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::ValidationError(format!("Invalid JSON body: {err}")).into()
}
