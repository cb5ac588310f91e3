// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resource Quantity Value Object
//!
//! Parses the fixed-point resource notation used for container limits and
//! node allocatable resources:
//!
//! | Form | Example | Meaning |
//! |------|---------|---------|
//! | plain | `2`, `0.5` | base units |
//! | decimal SI | `500m`, `1k`, `2G` | powers of 1000 (`n u m k M G T P E`) |
//! | binary SI | `128Mi`, `1Gi` | powers of 1024 (`Ki Mi Gi Ti Pi Ei`) |
//! | exponent | `1e3`, `5E-3` | powers of ten |
//!
//! Quantities are held as an exact count of milli-units. Conversions that
//! lose precision round up, so a request is never reported smaller than what
//! was declared.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity '{0}'")]
    Invalid(String),

    #[error("unknown quantity suffix '{suffix}' in '{input}'")]
    UnknownSuffix { input: String, suffix: String },

    #[error("quantity '{0}' is out of range")]
    OutOfRange(String),
}

/// Exact resource quantity
#[derive(Clone)]
pub struct Quantity {
    millis: i128,
    original: String,
}

impl Quantity {
    /// Parse a quantity string
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match trimmed.as_bytes()[0] {
            b'-' => (true, &trimmed[1..]),
            b'+' => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(QuantityError::Invalid(input.to_string()));
        }
        if fraction.contains('.') {
            return Err(QuantityError::Invalid(input.to_string()));
        }

        let out_of_range = || QuantityError::OutOfRange(input.to_string());

        let digits = format!("{}{}", whole, fraction);
        let mantissa: i128 = digits.parse().map_err(|_| out_of_range())?;
        let fraction_scale = pow10(fraction.len() as u32).ok_or_else(out_of_range)?;

        let (num, den) = suffix_multiplier(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
            input: input.to_string(),
            suffix: suffix.to_string(),
        })?;

        let numerator = mantissa
            .checked_mul(num)
            .and_then(|v| v.checked_mul(1000))
            .ok_or_else(out_of_range)?;
        let denominator = den.checked_mul(fraction_scale).ok_or_else(out_of_range)?;

        let millis = ceil_div(numerator, denominator);

        Ok(Self {
            millis: if negative { -millis } else { millis },
            original: trimmed.to_string(),
        })
    }

    /// Build a quantity from a milli-unit count
    pub fn from_millis(millis: i128) -> Self {
        Self {
            millis,
            original: format!("{}m", millis),
        }
    }

    /// Value in milli-units
    pub fn milli_value(&self) -> i128 {
        self.millis
    }

    /// Value in base units, rounded up
    pub fn value(&self) -> i128 {
        ceil_div(self.millis, 1000)
    }
}

/// Division rounding toward positive infinity; `divisor` must be positive
pub(crate) fn ceil_div(dividend: i128, divisor: i128) -> i128 {
    let quotient = dividend / divisor;
    if dividend % divisor != 0 && dividend > 0 {
        quotient + 1
    } else {
        quotient
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

/// Returns the multiplier of a suffix as a (numerator, denominator) pair
fn suffix_multiplier(suffix: &str) -> Option<(i128, i128)> {
    let binary = |shift: u32| Some((1i128 << shift, 1));
    let decimal = |exp: u32| pow10(exp).map(|n| (n, 1));

    match suffix {
        "" => Some((1, 1)),
        "n" => pow10(9).map(|d| (1, d)),
        "u" => pow10(6).map(|d| (1, d)),
        "m" => Some((1, 1000)),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        "Ki" => binary(10),
        "Mi" => binary(20),
        "Gi" => binary(30),
        "Ti" => binary(40),
        "Pi" => binary(50),
        "Ei" => binary(60),
        _ => {
            let exponent = suffix.strip_prefix(['e', 'E'])?;
            let exp: i32 = exponent.parse().ok()?;
            if exp.unsigned_abs() > 18 {
                return None;
            }
            if exp >= 0 {
                decimal(exp as u32)
            } else {
                pow10(exp.unsigned_abs()).map(|d| (1, d))
            }
        }
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.millis == other.millis
    }
}

impl Eq for Quantity {}

impl fmt::Debug for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quantity({})", self.original)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

/// Accepts both strings (`"500m"`) and bare YAML numbers (`2`, `0.5`)
impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuantityVisitor;

        impl de::Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a resource quantity such as \"500m\", \"128Mi\" or 2")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
                Quantity::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
                Quantity::parse(&v.to_string()).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
                Quantity::parse(&v.to_string()).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
                Quantity::parse(&v.to_string()).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    #[test]
    fn test_parse_cpu_forms() {
        assert_eq!(q("500m").milli_value(), 500);
        assert_eq!(q("2").milli_value(), 2000);
        assert_eq!(q("0.5").milli_value(), 500);
        assert_eq!(q("1.5").value(), 2);
        assert_eq!(q("250m").value(), 1);
    }

    #[test]
    fn test_parse_memory_forms() {
        assert_eq!(q("128Mi").value(), 128 * 1024 * 1024);
        assert_eq!(q("1Gi").value(), 1 << 30);
        assert_eq!(q("1G").value(), 1_000_000_000);
        assert_eq!(q("64k").value(), 64_000);
        assert_eq!(q("1e3").value(), 1000);
        assert_eq!(q("5E-3").milli_value(), 5);
    }

    #[test]
    fn test_sub_milli_rounds_up() {
        assert_eq!(q("1n").milli_value(), 1);
        assert_eq!(q("1500u").milli_value(), 2);
    }

    #[test]
    fn test_equality_ignores_notation() {
        assert_eq!(q("1000m"), q("1"));
        assert_eq!(q("1Ki"), q("1024"));
        assert_ne!(q("1k"), q("1Ki"));
    }

    #[test]
    fn test_invalid_quantities() {
        assert_eq!(Quantity::parse(""), Err(QuantityError::Empty));
        assert!(matches!(Quantity::parse("abc"), Err(QuantityError::Invalid(_))));
        assert!(matches!(Quantity::parse("1.2.3"), Err(QuantityError::Invalid(_))));
        assert!(matches!(Quantity::parse("12Qi"), Err(QuantityError::UnknownSuffix { .. })));
    }

    #[test]
    fn test_deserialize_numbers_and_strings() {
        let values: Vec<Quantity> = serde_yaml::from_str("[2, \"500m\", 0.25, 64Mi]").unwrap();
        assert_eq!(values[0].milli_value(), 2000);
        assert_eq!(values[1].milli_value(), 500);
        assert_eq!(values[2].milli_value(), 250);
        assert_eq!(values[3].value(), 64 * 1024 * 1024);
    }
}
