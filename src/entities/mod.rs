pub mod classes;
pub mod drawings;
pub mod scans;
pub mod stations;
pub mod users;

pub use classes as class_entity;
pub use drawings as drawing_entity;
pub use drawings::DrawingStatus;
pub use scans as scan_entity;
pub use stations as station_entity;
pub use users as user_entity;
pub use users::UserRole;
