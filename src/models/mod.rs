pub mod class;
pub mod common;
pub mod drawing;
pub mod pagination;
pub mod scan;
pub mod station;
pub mod user;

pub use class::*;
pub use common::*;
pub use drawing::*;
pub use pagination::*;
pub use scan::*;
pub use station::*;
pub use user::*;
