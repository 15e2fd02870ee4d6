//! Exact frame rates.
//!
//! Probers report rates as `N/D` text (`30000/1001`). The rate is kept as a
//! reduced rational for its whole lifetime and only turned into a float at the
//! point a value is emitted, so timestamp arithmetic across many graph nodes
//! never accumulates rounding error.

use std::fmt;
use std::str::FromStr;

use num_rational::Rational64;
use serde::{Deserialize, Serialize};

/// A strictly positive, reduced frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FrameRate(Rational64);

/// Why a frame-rate string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameRateError {
    #[error("empty frame rate")]
    Empty,

    #[error("malformed frame rate '{0}'")]
    Malformed(String),

    #[error("frame rate '{0}' is not strictly positive")]
    NotPositive(String),
}

impl FrameRate {
    /// Build a rate from numerator and denominator. Returns `None` for zero or
    /// negative components.
    pub fn new(numer: i64, denom: i64) -> Option<Self> {
        if numer <= 0 || denom <= 0 {
            return None;
        }
        Some(Self(Rational64::new(numer, denom)))
    }

    /// Whole-number rate, e.g. `FrameRate::integer(30)`.
    pub fn integer(fps: u32) -> Option<Self> {
        Self::new(i64::from(fps), 1)
    }

    /// Parse `"N/D"`, `"N"`, or an exact decimal such as `"29.97"`.
    pub fn parse(text: &str) -> Result<Self, FrameRateError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(FrameRateError::Empty);
        }

        let malformed = || FrameRateError::Malformed(trimmed.to_string());
        let not_positive = || FrameRateError::NotPositive(trimmed.to_string());

        let (numer, denom) = if let Some((n, d)) = trimmed.split_once('/') {
            let n = n.trim().parse::<i64>().map_err(|_| malformed())?;
            let d = d.trim().parse::<i64>().map_err(|_| malformed())?;
            (n, d)
        } else if let Some((whole, frac)) = trimmed.split_once('.') {
            if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            if whole.starts_with('-') {
                return Err(not_positive());
            }
            if !whole.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            let whole = if whole.is_empty() {
                0
            } else {
                whole.parse::<i64>().map_err(|_| malformed())?
            };
            let scale = 10i64.pow(frac.len() as u32);
            let frac = frac.parse::<i64>().map_err(|_| malformed())?;
            let numer = whole
                .checked_mul(scale)
                .and_then(|w| w.checked_add(frac))
                .ok_or_else(malformed)?;
            (numer, scale)
        } else {
            (trimmed.parse::<i64>().map_err(|_| malformed())?, 1)
        };

        Self::new(numer, denom).ok_or_else(not_positive)
    }

    pub fn numer(&self) -> i64 {
        *self.0.numer()
    }

    pub fn denom(&self) -> i64 {
        *self.0.denom()
    }

    /// Floating-point frames per second. Only call this when emitting a value.
    pub fn as_f64(&self) -> f64 {
        self.numer() as f64 / self.denom() as f64
    }

    /// Number of whole frames that start within `secs`.
    pub fn frames_in(&self, secs: f64) -> u64 {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        (secs * self.numer() as f64 / self.denom() as f64).ceil() as u64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom() == 1 {
            write!(f, "{}", self.numer())
        } else {
            write!(f, "{}/{}", self.numer(), self.denom())
        }
    }
}

impl FromStr for FrameRate {
    type Err = FrameRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FrameRate {
    type Error = FrameRateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FrameRate> for String {
    fn from(rate: FrameRate) -> Self {
        rate.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ntsc_fraction_stays_exact() {
        let rate = FrameRate::parse("30000/1001").unwrap();
        assert_eq!(rate.numer(), 30000);
        assert_eq!(rate.denom(), 1001);
        assert_eq!(rate.to_string(), "30000/1001");
        assert!((rate.as_f64() - 29.970_029_97).abs() < 1e-6);
    }

    #[test]
    fn test_parse_reduces_fraction() {
        let rate = FrameRate::parse("60/2").unwrap();
        assert_eq!(rate, FrameRate::integer(30).unwrap());
        assert_eq!(rate.to_string(), "30");
    }

    #[test]
    fn test_parse_decimal_is_exact() {
        let rate = FrameRate::parse("29.97").unwrap();
        assert_eq!(rate.numer(), 2997);
        assert_eq!(rate.denom(), 100);
    }

    #[test]
    fn test_parse_rejects_zero_and_garbage() {
        assert_eq!(
            FrameRate::parse("0/0"),
            Err(FrameRateError::NotPositive("0/0".to_string()))
        );
        assert!(matches!(
            FrameRate::parse("abc"),
            Err(FrameRateError::Malformed(_))
        ));
        assert_eq!(FrameRate::parse("  "), Err(FrameRateError::Empty));
    }

    #[test]
    fn test_parse_negative_decimal_keeps_sign() {
        assert_eq!(
            FrameRate::parse("-0.5"),
            Err(FrameRateError::NotPositive("-0.5".to_string()))
        );
        assert_eq!(
            FrameRate::parse("-29.97"),
            Err(FrameRateError::NotPositive("-29.97".to_string()))
        );
        assert!(matches!(
            FrameRate::parse("+1.5"),
            Err(FrameRateError::Malformed(_))
        ));
        assert_eq!(FrameRate::parse(".5").unwrap(), FrameRate::new(1, 2).unwrap());
    }

    #[test]
    fn test_serde_as_string() {
        let rate = FrameRate::parse("24000/1001").unwrap();
        let json = serde_json::to_string(&rate).unwrap();
        assert_eq!(json, "\"24000/1001\"");
        let back: FrameRate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rate);
        assert!(serde_json::from_str::<FrameRate>("\"0/1\"").is_err());
    }

    #[test]
    fn test_frames_in() {
        let rate = FrameRate::integer(30).unwrap();
        assert_eq!(rate.frames_in(60.0), 1800);
        assert_eq!(rate.frames_in(-1.0), 0);
    }
}
