//! Phone number utilities

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

// International phone number regex (E.164 format)
static INTERNATIONAL_PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").unwrap());

// Uzbek mobile number without country code (operator prefix + 7 digits)
static UZ_LOCAL_MOBILE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(33|50|55|77|88|90|91|93|94|95|97|98|99)\d{7}$").unwrap());

/// Minimum digits after the leading `+`
pub const MIN_PHONE_DIGITS: usize = 9;

/// Maximum digits after the leading `+` (E.164 limit)
pub const MAX_PHONE_DIGITS: usize = 15;

/// Reason a phone number was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneValidationError {
    Empty,
    MissingPlusPrefix,
    InvalidCharacters,
    TooShort,
    TooLong,
    InvalidCountryCode,
}

impl fmt::Display for PhoneValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            PhoneValidationError::Empty => "Phone number is required",
            PhoneValidationError::MissingPlusPrefix => {
                "Phone number must start with + and a country code"
            }
            PhoneValidationError::InvalidCharacters => {
                "Phone number may only contain digits after the + sign"
            }
            PhoneValidationError::TooShort => "Phone number is too short",
            PhoneValidationError::TooLong => "Phone number is too long",
            PhoneValidationError::InvalidCountryCode => "Country code cannot start with 0",
        };
        f.write_str(message)
    }
}

impl std::error::Error for PhoneValidationError {}

/// Normalize a phone number by removing common formatting characters
pub fn normalize_phone_number(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Normalize for duplicate detection: strips formatting and turns a local
/// Uzbek mobile number into its `+998` international form.
pub fn normalize_phone_for_comparison(phone: &str) -> String {
    let normalized = normalize_phone_number(phone.trim());
    if !normalized.starts_with('+') && UZ_LOCAL_MOBILE_REGEX.is_match(&normalized) {
        return format!("+998{}", normalized);
    }
    normalized
}

/// Validate a phone number and return its canonical E.164 form
///
/// Spaces, dashes, dots and parentheses are accepted as formatting; any other
/// non-digit character after the `+` is rejected.
pub fn validate_phone_number(phone: &str) -> Result<String, PhoneValidationError> {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return Err(PhoneValidationError::Empty);
    }
    if !trimmed.starts_with('+') {
        return Err(PhoneValidationError::MissingPlusPrefix);
    }

    let digits: String = trimmed[1..]
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PhoneValidationError::InvalidCharacters);
    }
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(PhoneValidationError::TooShort);
    }
    if digits.len() > MAX_PHONE_DIGITS {
        return Err(PhoneValidationError::TooLong);
    }

    let canonical = format!("+{}", digits);
    if !INTERNATIONAL_PHONE_REGEX.is_match(&canonical) {
        return Err(PhoneValidationError::InvalidCountryCode);
    }
    Ok(canonical)
}

/// Check if a phone number is valid (international E.164 format)
pub fn is_valid_phone(phone: &str) -> bool {
    validate_phone_number(phone).is_ok()
}

/// Mask a phone number for logging (e.g. +99****4567)
pub fn mask_phone_number(phone: &str) -> String {
    let normalized = normalize_phone_number(phone);
    if normalized.len() >= 7 {
        format!(
            "{}****{}",
            &normalized[0..3],
            &normalized[normalized.len() - 4..]
        )
    } else {
        "****".to_string()
    }
}
