//! Storage quantities ("150Gi", "500G", "1e3").
//!
//! Values are normalized to nano-units in an `i128` so binary and decimal
//! suffixes compare exactly. Sub-nano fractions round up.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from parsing a quantity string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unknown suffix {suffix:?} in quantity {value:?}")]
    UnknownSuffix { value: String, suffix: String },

    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// A parsed storage size.
///
/// Equality and ordering use the normalized value only, so `1Gi == 1024Mi`.
/// `Display` renders the string the quantity was parsed from.
#[derive(Debug, Clone)]
pub struct Quantity {
    nanos: i128,
    raw: String,
}

impl Quantity {
    pub fn parse(value: &str) -> Result<Self, QuantityError> {
        let raw = value.trim();
        if raw.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match raw.as_bytes()[0] {
            b'-' => (true, &raw[1..]),
            b'+' => (false, &raw[1..]),
            _ => (false, raw),
        };

        let number_end = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_end);

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if (int_part.is_empty() && frac_part.is_empty())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(QuantityError::InvalidNumber(raw.to_string()));
        }

        let digits = format!("{int_part}{frac_part}");
        let mantissa: i128 = digits
            .parse()
            .map_err(|_| QuantityError::OutOfRange(raw.to_string()))?;

        let (pow2, pow10) = suffix_factors(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
            value: raw.to_string(),
            suffix: suffix.to_string(),
        })?;

        let out_of_range = || QuantityError::OutOfRange(raw.to_string());

        let mut nanos = mantissa
            .checked_mul(1i128.checked_shl(pow2).ok_or_else(out_of_range)?)
            .ok_or_else(out_of_range)?;

        let scale = 9 + i64::from(pow10) - frac_part.len() as i64;
        if scale >= 0 {
            let factor = u32::try_from(scale)
                .ok()
                .and_then(|scale| 10i128.checked_pow(scale))
                .ok_or_else(out_of_range)?;
            nanos = nanos.checked_mul(factor).ok_or_else(out_of_range)?;
        } else {
            let divisor = u32::try_from(scale.unsigned_abs())
                .ok()
                .and_then(|scale| 10i128.checked_pow(scale));
            nanos = match divisor {
                Some(divisor) => ceil_div(nanos, divisor),
                // Anything below 10^-38 of a nano-unit.
                None => i128::from(nanos > 0),
            };
        }

        if negative {
            nanos = -nanos;
        }

        Ok(Self {
            nanos,
            raw: raw.to_string(),
        })
    }

    /// The value in nano-units.
    pub fn as_nanos(&self) -> i128 {
        self.nanos
    }

    /// Whole units, rounded up.
    pub fn as_units(&self) -> i128 {
        ceil_div(self.nanos, 1_000_000_000)
    }
}

/// Maps a suffix to (power of two, power of ten).
fn suffix_factors(suffix: &str) -> Option<(u32, i32)> {
    let factors = match suffix {
        "" => (0, 0),
        "Ki" => (10, 0),
        "Mi" => (20, 0),
        "Gi" => (30, 0),
        "Ti" => (40, 0),
        "Pi" => (50, 0),
        "Ei" => (60, 0),
        "n" => (0, -9),
        "u" => (0, -6),
        "m" => (0, -3),
        "k" => (0, 3),
        "M" => (0, 6),
        "G" => (0, 9),
        "T" => (0, 12),
        "P" => (0, 15),
        "E" => (0, 18),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            (0, exponent.parse::<i32>().ok()?)
        }
    };
    Some(factors)
}

fn ceil_div(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d > 0 {
        q + 1
    } else {
        q
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    #[test]
    fn test_binary_suffixes() {
        assert_eq!(q("1Ki").as_units(), 1024);
        assert_eq!(q("150Gi").as_units(), 150 * (1 << 30));
        assert_eq!(q("1Ei").as_units(), 1 << 60);
    }

    #[test]
    fn test_decimal_suffixes() {
        assert_eq!(q("1k").as_units(), 1_000);
        assert_eq!(q("100G").as_units(), 100_000_000_000);
        assert_eq!(q("500m").as_nanos(), 500_000_000);
    }

    #[test]
    fn test_exponent_form() {
        assert_eq!(q("1e3"), q("1k"));
        assert_eq!(q("15E-1").as_nanos(), 1_500_000_000);
    }

    #[test]
    fn test_mixed_units_compare_by_value() {
        assert_eq!(q("1Gi"), q("1024Mi"));
        assert_eq!(q("1.5Gi"), q("1536Mi"));
        assert!(q("1G") < q("1Gi"));
        assert!(q("150Gi") > q("100Gi"));
        assert!(q("200Gi") > q("150Gi"));
    }

    #[test]
    fn test_display_keeps_original_text() {
        assert_eq!(q(" 150Gi ").to_string(), "150Gi");
    }

    #[test]
    fn test_sign() {
        assert!(q("-1Gi") < q("0"));
        assert_eq!(q("+2Gi"), q("2Gi"));
    }

    #[test]
    fn test_sub_nano_rounds_up() {
        assert_eq!(q("1e-12").as_nanos(), 1);
        assert_eq!(q("0.0000000001").as_nanos(), 1);
    }

    #[test]
    fn test_invalid_quantities() {
        assert_eq!(Quantity::parse(""), Err(QuantityError::Empty));
        assert!(matches!(
            Quantity::parse("Gi"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            Quantity::parse("10Xi"),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(matches!(
            Quantity::parse("1e999"),
            Err(QuantityError::OutOfRange(_))
        ));
        assert!(matches!(
            Quantity::parse("1e2147483647"),
            Err(QuantityError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_extreme_negative_exponent_rounds_up() {
        let tiny = Quantity::parse("1e-2147483648").unwrap();
        assert_eq!(tiny.as_nanos(), 1);
        assert_eq!(Quantity::parse("0e-2147483648").unwrap().as_nanos(), 0);
        assert_eq!(Quantity::parse("1.5e-2147483648").unwrap().as_nanos(), 1);
    }
}
