// Validation utilities module
// Provides custom validation functions for account fields

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{4,18}[0-9]$").expect("valid phone regex"));

/// Validates that a phone number is present and plausibly formatted
/// Accepts digits, spaces and dashes with an optional leading '+'
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if PHONE_PATTERN.is_match(phone.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone"))
    }
}
