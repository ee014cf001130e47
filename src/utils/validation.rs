//! Validation Utilities
//!
//! Input validation functions for account data and API requests.

use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

/// Maximum accepted length of a practitioner linkage code
pub const MAX_LINKAGE_CODE_LENGTH: usize = 64;

/// Validates email address format using a comprehensive regex pattern
pub fn validate_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    regex.is_match(email.trim())
}

/// Normalizes email address to lowercase and removes whitespace
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates that a display name is non-empty, bounded and free of markup
pub fn validate_name(name: &str) -> bool {
    let trimmed = name.trim();

    if trimmed.is_empty() || trimmed.chars().count() > 255 {
        return false;
    }

    // Letters from any script, spaces, hyphens, apostrophes and dots
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = NAME_REGEX
        .get_or_init(|| Regex::new(r"^[\p{L}\s\-'.]+$").expect("Failed to compile name regex"));

    regex.is_match(trimmed)
}

/// Validates a practitioner linkage code (matricule)
pub fn validate_linkage_code(code: &str) -> bool {
    let trimmed = code.trim();
    !trimmed.is_empty()
        && trimmed.len() <= MAX_LINKAGE_CODE_LENGTH
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Trims a linkage code and treats an empty value as absent
pub fn normalize_linkage_code(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Custom validator for email fields using the validator crate
pub fn email_validator(email: &str) -> Result<(), ValidationError> {
    if validate_email(email) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_email"))
    }
}

/// Custom validator for name fields using the validator crate
pub fn name_validator(name: &str) -> Result<(), ValidationError> {
    if validate_name(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_name"))
    }
}

/// Custom validator for linkage codes; an empty code means "no linkage"
pub fn linkage_code_validator(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() || validate_linkage_code(code) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_matricule"))
    }
}

/// Flattens validator errors into a single readable message
pub fn describe_validation_errors(err: &validator::ValidationErrors) -> String {
    let mut messages = Vec::new();

    for (field, errors) in err.field_errors() {
        for error in errors {
            let message = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid value for field '{}'", field));
            messages.push(format!("{}: {}", field, message));
        }
    }

    messages.sort();
    messages.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com"));
        assert!(validate_email("test.user+tag@domain.co.uk"));
        assert!(!validate_email("invalid.email"));
        assert!(!validate_email("@domain.com"));
        assert!(!validate_email("user@"));
        assert!(!validate_email(""));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  USER@EXAMPLE.COM  "), "user@example.com");
        assert_eq!(normalize_email("Test@Domain.org"), "test@domain.org");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("John Doe"));
        assert!(validate_name("Mary-Jane O'Connor"));
        assert!(validate_name("Hélène Lefèvre"));
        assert!(!validate_name(""));
        assert!(!validate_name("   "));
        assert!(!validate_name("John<script>"));
        assert!(!validate_name(&"a".repeat(256)));
    }

    #[test]
    fn test_validate_linkage_code() {
        assert!(validate_linkage_code("M1"));
        assert!(validate_linkage_code("ORT-2024_17"));
        assert!(!validate_linkage_code(""));
        assert!(!validate_linkage_code("has space"));
        assert!(!validate_linkage_code(&"x".repeat(65)));
    }

    #[test]
    fn test_normalize_linkage_code() {
        assert_eq!(normalize_linkage_code(Some(" M1 ")), Some("M1".to_string()));
        assert_eq!(normalize_linkage_code(Some("   ")), None);
        assert_eq!(normalize_linkage_code(None), None);
    }

    #[test]
    fn test_linkage_code_validator_accepts_empty() {
        assert!(linkage_code_validator("").is_ok());
        assert!(linkage_code_validator("M1").is_ok());
        assert!(linkage_code_validator("M 1").is_err());
    }
}
