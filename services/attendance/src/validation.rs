//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::catalog::Catalog;
use crate::models::SlotKey;

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
    let regex = USERNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("Failed to compile username regex")
    });

    if !regex.is_match(username) {
        return Err(
            "Username can only contain letters, numbers, dots, dashes and underscores".to_string(),
        );
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    Ok(())
}

/// Every allow-list entry must name a slot of the catalog
pub fn validate_allowed_sections(sections: &[String], catalog: &Catalog) -> Result<(), String> {
    for entry in sections {
        let known = entry
            .split_once('-')
            .map(|(course, section)| catalog.contains(&SlotKey::new(course, section)))
            .unwrap_or(false);
        if !known {
            return Err(format!("Unknown section in allow-list: {entry}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("stud_1.a-b").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_validate_allowed_sections() {
        let catalog = Catalog::standard();
        assert!(validate_allowed_sections(&["C1-S1".to_string()], &catalog).is_ok());
        assert!(validate_allowed_sections(&["C1S1".to_string()], &catalog).is_err());
        assert!(validate_allowed_sections(&["C99-S1".to_string()], &catalog).is_err());
    }
}
