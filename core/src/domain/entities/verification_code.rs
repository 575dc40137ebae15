//! Verification code value issued for a workflow delivery cycle.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use constant_time_eq::constant_time_eq;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default length of the verification code
pub const CODE_LENGTH: usize = 6;

/// Default expiration time for verification codes (5 minutes)
pub const DEFAULT_EXPIRATION_MINUTES: i64 = 5;

/// Short-lived numeric secret the user must echo back
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    /// The numeric code, always `code_length` ASCII digits
    pub digits: String,

    /// Timestamp when the code was issued
    pub issued_at: DateTime<Utc>,

    /// Timestamp after which the code never validates
    pub expires_at: DateTime<Utc>,
}

impl VerificationCode {
    /// Issue a new random code of `length` digits valid for `ttl`
    pub fn generate(length: usize, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            digits: Self::generate_digits(length),
            issued_at: now,
            expires_at: now + ttl,
        }
    }

    /// Build a code with known digits (fixtures and imports)
    pub fn with_digits(digits: impl Into<String>, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            digits: digits.into(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    /// Generates random digits using the OS CSPRNG
    fn generate_digits(length: usize) -> String {
        let mut rng = OsRng;
        (0..length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks expiry against an explicit instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Constant-time comparison of the submitted code
    ///
    /// Expiry is not checked here; callers decide how to report it.
    pub fn matches(&self, input: &str) -> bool {
        constant_time_eq(self.digits.as_bytes(), input.trim().as_bytes())
    }

    /// Time left until expiration, zero once expired
    pub fn time_until_expiration(&self) -> Duration {
        let now = Utc::now();
        if self.expires_at > now {
            self.expires_at - now
        } else {
            Duration::zero()
        }
    }
}

// Keeps the digits out of logs and panic messages.
impl fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationCode")
            .field("digits", &"******")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Checks that `input` has the shape of a code: exactly `length` ASCII digits
pub fn is_well_formed_code(input: &str, length: usize) -> bool {
    let input = input.trim();
    input.len() == length && input.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_code_format() {
        for _ in 0..100 {
            let code = VerificationCode::generate(CODE_LENGTH, Duration::minutes(5));
            assert_eq!(code.digits.len(), CODE_LENGTH);
            assert!(code.digits.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generate_respects_length() {
        let code = VerificationCode::generate(8, Duration::minutes(5));
        assert_eq!(code.digits.len(), 8);
    }

    #[test]
    fn test_code_uniqueness() {
        let codes: HashSet<String> = (0..100)
            .map(|_| VerificationCode::generate(CODE_LENGTH, Duration::minutes(5)).digits)
            .collect();
        assert!(codes.len() > 1);
    }

    #[test]
    fn test_matches() {
        let code = VerificationCode::with_digits("123456", Utc::now(), Duration::minutes(5));
        assert!(code.matches("123456"));
        assert!(code.matches(" 123456 "));
        assert!(!code.matches("123457"));
        assert!(!code.matches("12345"));
    }

    #[test]
    fn test_expiry() {
        let issued = Utc::now() - Duration::minutes(10);
        let code = VerificationCode::with_digits("123456", issued, Duration::minutes(5));
        assert!(code.is_expired());
        assert_eq!(code.time_until_expiration(), Duration::zero());

        let fresh = VerificationCode::generate(CODE_LENGTH, Duration::minutes(5));
        assert!(!fresh.is_expired());
        assert!(fresh.is_expired_at(fresh.expires_at + Duration::seconds(1)));
        assert!(!fresh.is_expired_at(fresh.expires_at));
    }

    #[test]
    fn test_debug_hides_digits() {
        let code = VerificationCode::with_digits("987654", Utc::now(), Duration::minutes(5));
        let debug = format!("{:?}", code);
        assert!(!debug.contains("987654"));
    }

    #[test]
    fn test_is_well_formed_code() {
        assert!(is_well_formed_code("012345", 6));
        assert!(!is_well_formed_code("01234", 6));
        assert!(!is_well_formed_code("01234a", 6));
        assert!(!is_well_formed_code("", 6));
    }
}
