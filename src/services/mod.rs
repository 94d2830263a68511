pub mod auth_service;
pub mod class_service;
pub mod drawing_service;
pub mod scan_service;
pub mod station_service;

pub use auth_service::*;
pub use class_service::ClassService;
pub use drawing_service::DrawingService;
pub use scan_service::{ScanOutcome, ScanService};
pub use station_service::StationService;

use sea_orm::{DbErr, SqlErr};

/// Whether a write failed on a unique index.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
