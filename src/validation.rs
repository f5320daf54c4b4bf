use crate::error::{AppError, FieldErrors};
use regex::Regex;
use std::sync::LazyLock;

/// Upper bound for any single quantity (stock level, resupply, donation).
pub const MAX_QUANTITY: i32 = 1_000_000;
pub const MAX_NAME_LEN: usize = 120;
pub const MAX_TEXT_LEN: usize = 2000;
pub const MAX_PEOPLE_COUNT: i32 = 10_000;

static MOBILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\+91|91|0)?([6-9][0-9]{9})$").expect("valid mobile regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").expect("valid email regex")
});

/// Validate
///
/// Implemented by request payloads. Collects every problem rather than stopping at
/// the first, so the client can highlight all offending fields at once.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// Normalizes an Indian mobile number to `+91XXXXXXXXXX`.
/// Accepts spaces and dashes as separators and an optional `+91`, `91` or `0` prefix.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    MOBILE_RE
        .captures(&compact)
        .and_then(|caps| caps.get(1))
        .map(|m| format!("+91{}", m.as_str()))
}

pub fn is_valid_email(raw: &str) -> bool {
    raw.len() <= 254 && EMAIL_RE.is_match(raw.trim())
}

pub fn check_name(errors: &mut FieldErrors, field: &str, value: &str) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(field, "is required");
    } else if trimmed.chars().count() > MAX_NAME_LEN {
        errors.add(field, format!("must be at most {} characters", MAX_NAME_LEN));
    }
}

pub fn check_optional_text(errors: &mut FieldErrors, field: &str, value: Option<&str>) {
    if let Some(text) = value {
        if text.chars().count() > MAX_TEXT_LEN {
            errors.add(field, format!("must be at most {} characters", MAX_TEXT_LEN));
        }
    }
}

pub fn check_phone(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "is required");
    } else if normalize_phone(value).is_none() {
        errors.add(field, "must be a valid 10-digit mobile number");
    }
}

pub fn check_email(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "is required");
    } else if !is_valid_email(value) {
        errors.add(field, "must be a valid email address");
    }
}

pub fn check_password(errors: &mut FieldErrors, field: &str, value: &str) {
    let len = value.chars().count();
    if !(8..=128).contains(&len) {
        errors.add(field, "must be between 8 and 128 characters");
    }
    let has_letter = value.chars().any(|c| c.is_alphabetic());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        errors.add(field, "must contain at least one letter and one digit");
    }
}

pub fn check_quantity(errors: &mut FieldErrors, field: &str, value: i32) {
    if value <= 0 {
        errors.add(field, "must be greater than zero");
    } else if value > MAX_QUANTITY {
        errors.add(field, format!("must be at most {}", MAX_QUANTITY));
    }
}

pub fn check_stock_level(errors: &mut FieldErrors, field: &str, value: i32) {
    if !(0..=MAX_QUANTITY).contains(&value) {
        errors.add(field, format!("must be between 0 and {}", MAX_QUANTITY));
    }
}

/// Shorthand used by handlers that take a phone number from a payload.
pub fn require_phone(field: &str, value: &str) -> Result<String, AppError> {
    normalize_phone(value)
        .ok_or_else(|| AppError::validation(field, "must be a valid 10-digit mobile number"))
}
