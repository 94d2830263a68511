use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::OnceLock;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
            .expect("email regex is valid")
    })
}

/// 验证邮箱格式
pub fn validate_email(email: &str) -> AppResult<()> {
    if !email_regex().is_match(email) {
        return Err(AppError::ValidationError("Invalid email address".to_string()));
    }
    Ok(())
}

/// Lowercases and trims so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("teacher@school.org").is_ok());
        assert!(validate_email("first.last+hunt@sub.school.edu").is_ok());
        assert!(validate_email("teacher@school").is_err());
        assert!(validate_email("no-at-sign.org").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Teacher@School.ORG "), "teacher@school.org");
    }
}
