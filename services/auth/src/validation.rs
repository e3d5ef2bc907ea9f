//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Validate a login identifier (username or email as typed)
pub fn validate_identifier(identifier: &str) -> Result<(), String> {
    if identifier.trim().is_empty() {
        return Err("Username or email is required".to_string());
    }

    if identifier.len() > 254 {
        return Err("Username or email is too long".to_string());
    }

    Ok(())
}

/// Validate username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if username.len() < 3 {
        return Err("Username must be at least 3 characters long".to_string());
    }

    if username.len() > 64 {
        return Err("Username must be at most 64 characters long".to_string());
    }

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("Failed to compile username regex"));

    if !regex.is_match(username) {
        return Err(
            "Username can only contain letters, numbers, dots, dashes and underscores".to_string(),
        );
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a new password and its confirmation
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    if password != confirmation {
        return Err("Passwords do not match".to_string());
    }

    Ok(())
}

/// Accept only same-site relative redirect targets
pub fn safe_redirect_target(next: Option<&str>) -> Option<&str> {
    let next = next?.trim();
    let is_relative = next.starts_with('/') && !next.starts_with("//") && !next.contains('\\');
    is_relative.then_some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("student@uni.edu").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("store_admin").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("bad name").is_err());
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("secret", "secret").is_ok());
        assert!(validate_new_password("short", "short").is_err());
        assert_eq!(
            validate_new_password("secret1", "secret2").unwrap_err(),
            "Passwords do not match"
        );
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("alice").is_ok());
        assert!(validate_identifier("   ").is_err());
    }

    #[test]
    fn test_safe_redirect_target() {
        assert_eq!(safe_redirect_target(Some("/items/3")), Some("/items/3"));
        assert_eq!(safe_redirect_target(Some("//evil.example")), None);
        assert_eq!(safe_redirect_target(Some("https://evil.example")), None);
        assert_eq!(safe_redirect_target(None), None);
    }
}
