pub mod code_generator;
pub mod email;
pub mod jwt;
pub mod password;

pub use code_generator::{generate_unique_class_code, generate_unique_qr_identifier};
pub use email::*;
pub use jwt::*;
pub use password::*;
