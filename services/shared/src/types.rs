/// Type-safe wrappers for domain primitives
///
/// These types prevent common errors by enforcing validation at construction time
/// and providing checked arithmetic operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid credit amount: {0:?}")]
    InvalidAmount(String),

    #[error("Credit amount has more than two decimal places: {0:?}")]
    TooManyDecimals(String),

    #[error("Credit amount overflow in operation")]
    AmountOverflow,

    #[error("Account id must be 1..={max} characters, got {length}")]
    InvalidAccountId { length: usize, max: usize },
}

/// Fixed-point credit amount with overflow protection
///
/// Stored as signed minor units (hundredths). Balances are never negative;
/// signed ledger amounts use the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Credits(i64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    /// Create from minor units (hundredths of a credit)
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Create from whole credits
    pub fn from_whole(whole: i64) -> Result<Self, ValidationError> {
        whole
            .checked_mul(CREDIT_SCALE)
            .map(Self)
            .ok_or(ValidationError::AmountOverflow)
    }

    /// Get the raw minor-unit value
    pub const fn as_minor(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(&self, other: Credits) -> Result<Self, ValidationError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(ValidationError::AmountOverflow)
    }

    pub fn checked_sub(&self, other: Credits) -> Result<Self, ValidationError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(ValidationError::AmountOverflow)
    }

    pub fn checked_neg(&self) -> Result<Self, ValidationError> {
        self.0
            .checked_neg()
            .map(Self)
            .ok_or(ValidationError::AmountOverflow)
    }

    /// Multiply by a basis-point factor (10_000 = 1x), truncating toward zero
    pub fn checked_mul_bps(&self, bps: u32) -> Result<Self, ValidationError> {
        let scaled = (self.0 as i128) * (bps as i128) / (BASIS_POINTS_PER_UNIT as i128);
        i64::try_from(scaled)
            .map(Self)
            .map_err(|_| ValidationError::AmountOverflow)
    }

    /// Approximate value as a float, for ratios only
    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / CREDIT_SCALE as f64
    }
}

impl FromStr for Credits {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let invalid = || ValidationError::InvalidAmount(input.to_string());

        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 {
            return Err(ValidationError::TooManyDecimals(input.to_string()));
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| ValidationError::AmountOverflow)?
        };
        let fraction_value: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse::<i64>().map_err(|_| invalid())?,
        };

        let minor = whole_value
            .checked_mul(CREDIT_SCALE)
            .and_then(|v| v.checked_add(fraction_value))
            .ok_or(ValidationError::AmountOverflow)?;

        Ok(Self(if negative { -minor } else { minor }))
    }
}

impl TryFrom<String> for Credits {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Credits> for String {
    fn from(amount: Credits) -> Self {
        amount.to_string()
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = CREDIT_SCALE as u64;
        write!(f, "{}{}.{:02}", sign, abs / scale, abs % scale)
    }
}

/// Validate an externally supplied account identifier
pub fn validate_account_id(account_id: &str) -> Result<(), ValidationError> {
    let length = account_id.chars().count();
    if length == 0 || length > MAX_ACCOUNT_ID_LENGTH {
        return Err(ValidationError::InvalidAccountId {
            length,
            max: MAX_ACCOUNT_ID_LENGTH,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credits_parse() {
        assert_eq!("12.50".parse::<Credits>().unwrap().as_minor(), 1250);
        assert_eq!("12.5".parse::<Credits>().unwrap().as_minor(), 1250);
        assert_eq!("7".parse::<Credits>().unwrap().as_minor(), 700);
        assert_eq!(".05".parse::<Credits>().unwrap().as_minor(), 5);
        assert_eq!("-3.25".parse::<Credits>().unwrap().as_minor(), -325);
    }

    #[test]
    fn test_credits_parse_rejects_garbage() {
        assert!(matches!("".parse::<Credits>(), Err(ValidationError::InvalidAmount(_))));
        assert!(matches!("abc".parse::<Credits>(), Err(ValidationError::InvalidAmount(_))));
        assert!(matches!("1.2.3".parse::<Credits>(), Err(ValidationError::InvalidAmount(_))));
        assert!(matches!("1.234".parse::<Credits>(), Err(ValidationError::TooManyDecimals(_))));
        assert!(matches!(
            "99999999999999999999".parse::<Credits>(),
            Err(ValidationError::AmountOverflow)
        ));
    }

    #[test]
    fn test_credits_display() {
        assert_eq!(Credits::from_minor(1250).to_string(), "12.50");
        assert_eq!(Credits::from_minor(5).to_string(), "0.05");
        assert_eq!(Credits::from_minor(-325).to_string(), "-3.25");
        assert_eq!(Credits::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_credits_arithmetic() {
        let a = Credits::from_minor(1000);
        let b = Credits::from_minor(250);

        assert_eq!(a.checked_add(b).unwrap().as_minor(), 1250);
        assert_eq!(a.checked_sub(b).unwrap().as_minor(), 750);
        assert_eq!(b.checked_neg().unwrap().as_minor(), -250);
        // 2.5x
        assert_eq!(a.checked_mul_bps(25_000).unwrap().as_minor(), 2500);
        // fractional results truncate
        assert_eq!(Credits::from_minor(5).checked_mul_bps(15_000).unwrap().as_minor(), 7);
    }

    #[test]
    fn test_credits_overflow() {
        let max = Credits::from_minor(i64::MAX);
        assert!(max.checked_add(Credits::from_minor(1)).is_err());
        assert!(max.checked_mul_bps(20_000).is_err());
        assert!(Credits::from_minor(i64::MIN).checked_neg().is_err());
    }

    #[test]
    fn test_credits_serde_as_string() {
        let json = serde_json::to_string(&Credits::from_minor(1999)).unwrap();
        assert_eq!(json, "\"19.99\"");
        let back: Credits = serde_json::from_str("\"0.10\"").unwrap();
        assert_eq!(back.as_minor(), 10);
        assert!(serde_json::from_str::<Credits>("\"0.101\"").is_err());
    }

    #[test]
    fn test_account_id_validation() {
        assert!(validate_account_id("player-1").is_ok());
        assert!(validate_account_id("").is_err());
        assert!(validate_account_id(&"x".repeat(MAX_ACCOUNT_ID_LENGTH + 1)).is_err());
    }
}
