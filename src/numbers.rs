//! Exact decimal numbers
//!
//! Every token amount, share price and USD value flows through `DecimalNumber`.
//! A value is a sign, a 256-bit magnitude and a base-10 scale:
//! `value = ±magnitude / 10^scale`. Values are kept normalized (no trailing
//! fractional zeros, zero is never negative), so derived equality and hashing
//! are numeric equality.
//!
//! # Rounding
//!
//! - Addition, subtraction and multiplication are exact. Results that do not fit
//!   fail with [`DecimalError::Overflow`]; nothing wraps.
//! - Division rounds half-up (ties away from zero) to
//!   [`DIVISION_DECIMAL_PLACES`] fractional digits. Share-price divisions rarely
//!   terminate in base 10, so this is the one place precision is cut.
//! - Conversion to a raw integer amount (`to_raw`) rounds half-up when the value
//!   has more fractional digits than the token.

use alloy::primitives::{U256, U512};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Fractional digits kept by [`DecimalNumber::checked_div`].
pub const DIVISION_DECIMAL_PLACES: u32 = 20;

/// Largest scale a value can carry (10^77 is the largest power of ten in a U256).
pub const MAX_SCALE: u32 = 77;

/// Errors from decimal arithmetic and parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecimalError {
    #[error("decimal overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid decimal number: '{0}'")]
    Invalid(String),

    #[error("negative value cannot be converted to a token amount")]
    Negative,
}

/// Exact base-10 number
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DecimalNumber {
    negative: bool,
    magnitude: U256,
    scale: u32,
}

fn ten() -> U256 {
    U256::from(10u64)
}

fn pow10(exp: u32) -> Result<U256, DecimalError> {
    ten()
        .checked_pow(U256::from(exp))
        .ok_or(DecimalError::Overflow)
}

fn scale_up(value: U256, digits: u32) -> Result<U256, DecimalError> {
    if digits == 0 || value.is_zero() {
        return Ok(value);
    }
    value
        .checked_mul(pow10(digits)?)
        .ok_or(DecimalError::Overflow)
}

/// Divide by `10^digits`, rounding half-up.
fn scale_down_half_up(value: U256, digits: u32) -> Result<U256, DecimalError> {
    if digits == 0 {
        return Ok(value);
    }
    if digits > MAX_SCALE {
        // Every U256 is below half of 10^78.
        return Ok(U256::ZERO);
    }
    let divisor = pow10(digits)?;
    div_half_up(value, divisor)
}

fn pow10_wide(exp: u32) -> Result<U512, DecimalError> {
    U512::from(10u64)
        .checked_pow(U512::from(exp))
        .ok_or(DecimalError::Overflow)
}

/// Half-up quotient of 512-bit operands, narrowed back to 256 bits.
fn div_half_up_wide(numerator: U512, denominator: U512) -> Result<U256, DecimalError> {
    if denominator.is_zero() {
        return Err(DecimalError::DivisionByZero);
    }
    let mut quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder >= denominator - remainder {
        quotient += U512::from(1u64);
    }
    U256::checked_from_limbs_slice(quotient.as_limbs()).ok_or(DecimalError::Overflow)
}

fn div_half_up(numerator: U256, denominator: U256) -> Result<U256, DecimalError> {
    if denominator.is_zero() {
        return Err(DecimalError::DivisionByZero);
    }
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    // remainder * 2 >= denominator, without overflowing.
    if remainder >= denominator - remainder {
        quotient
            .checked_add(U256::from(1u64))
            .ok_or(DecimalError::Overflow)
    } else {
        Ok(quotient)
    }
}

impl DecimalNumber {
    fn from_parts(negative: bool, magnitude: U256, scale: u32) -> Self {
        let mut value = Self {
            negative,
            magnitude,
            scale,
        };
        while value.scale > 0 && !value.magnitude.is_zero() && (value.magnitude % ten()).is_zero()
        {
            value.magnitude = value.magnitude / ten();
            value.scale -= 1;
        }
        if value.magnitude.is_zero() {
            value.negative = false;
            value.scale = 0;
        }
        value
    }

    pub fn zero() -> Self {
        Self::from_parts(false, U256::ZERO, 0)
    }

    pub fn one() -> Self {
        Self::from_parts(false, U256::from(1u64), 0)
    }

    /// Interpret an on-chain integer amount with `decimals` fractional digits.
    ///
    /// This is exact: `from_raw(1_500_000, 6)` is `1.5`.
    pub fn from_raw(raw: U256, decimals: u8) -> Self {
        Self::from_parts(false, raw, u32::from(decimals))
    }

    /// Convert to an on-chain integer amount with `decimals` fractional digits.
    ///
    /// Digits beyond `decimals` are rounded half-up.
    pub fn to_raw(&self, decimals: u8) -> Result<U256, DecimalError> {
        if self.negative {
            return Err(DecimalError::Negative);
        }
        let decimals = u32::from(decimals);
        if self.scale <= decimals {
            scale_up(self.magnitude, decimals - self.scale)
        } else {
            scale_down_half_up(self.magnitude, self.scale - decimals)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Number of fractional digits in the normalized value
    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn negated(&self) -> Self {
        Self::from_parts(!self.negative, self.magnitude, self.scale)
    }

    /// Round half-up to at most `decimal_places` fractional digits.
    pub fn round_dp(&self, decimal_places: u32) -> Result<Self, DecimalError> {
        if self.scale <= decimal_places {
            return Ok(self.clone());
        }
        let magnitude = scale_down_half_up(self.magnitude, self.scale - decimal_places)?;
        Ok(Self::from_parts(self.negative, magnitude, decimal_places))
    }

    pub fn checked_add(&self, other: &Self) -> Result<Self, DecimalError> {
        let scale = self.scale.max(other.scale);
        let a = scale_up(self.magnitude, scale - self.scale)?;
        let b = scale_up(other.magnitude, scale - other.scale)?;

        if self.negative == other.negative {
            let sum = a.checked_add(b).ok_or(DecimalError::Overflow)?;
            return Ok(Self::from_parts(self.negative, sum, scale));
        }

        match a.cmp(&b) {
            Ordering::Less => Ok(Self::from_parts(other.negative, b - a, scale)),
            _ => Ok(Self::from_parts(self.negative, a - b, scale)),
        }
    }

    pub fn checked_sub(&self, other: &Self) -> Result<Self, DecimalError> {
        self.checked_add(&other.negated())
    }

    /// Exact product; results finer than `MAX_SCALE` are rounded half-up.
    pub fn checked_mul(&self, other: &Self) -> Result<Self, DecimalError> {
        let product = self
            .magnitude
            .checked_mul(other.magnitude)
            .ok_or(DecimalError::Overflow)?;
        let scale = self.scale + other.scale;
        let (product, scale) = if scale > MAX_SCALE {
            (scale_down_half_up(product, scale - MAX_SCALE)?, MAX_SCALE)
        } else {
            (product, scale)
        };
        Ok(Self::from_parts(
            self.negative != other.negative,
            product,
            scale,
        ))
    }

    /// Quotient rounded half-up to [`DIVISION_DECIMAL_PLACES`] fractional digits.
    pub fn checked_div(&self, other: &Self) -> Result<Self, DecimalError> {
        if other.is_zero() {
            return Err(DecimalError::DivisionByZero);
        }

        // quotient * 10^P = a * 10^(sb + P - sa) / b, computed in 512 bits.
        // A numerator past 512 bits over a 256-bit divisor cannot fit a U256 anyway.
        let exponent = i64::from(other.scale) + i64::from(DIVISION_DECIMAL_PLACES)
            - i64::from(self.scale);
        let mut numerator = U512::from(self.magnitude);
        let mut denominator = U512::from(other.magnitude);
        if exponent >= 0 {
            numerator = numerator
                .checked_mul(pow10_wide(exponent as u32)?)
                .ok_or(DecimalError::Overflow)?;
        } else {
            denominator = denominator
                .checked_mul(pow10_wide(exponent.unsigned_abs() as u32)?)
                .ok_or(DecimalError::Overflow)?;
        }

        let quotient = div_half_up_wide(numerator, denominator)?;
        Ok(Self::from_parts(
            self.negative != other.negative,
            quotient,
            DIVISION_DECIMAL_PLACES,
        ))
    }

    /// Sum of all values, failing on the first overflow
    pub fn checked_sum<'a, I>(values: I) -> Result<Self, DecimalError>
    where
        I: IntoIterator<Item = &'a DecimalNumber>,
    {
        values
            .into_iter()
            .try_fold(Self::zero(), |acc, value| acc.checked_add(value))
    }
}

fn cmp_magnitudes(a: &DecimalNumber, b: &DecimalNumber) -> Ordering {
    match a.scale.cmp(&b.scale) {
        Ordering::Equal => a.magnitude.cmp(&b.magnitude),
        // An aligned magnitude that overflows is larger than any U256.
        Ordering::Less => match scale_up(a.magnitude, b.scale - a.scale) {
            Ok(aligned) => aligned.cmp(&b.magnitude),
            Err(_) => Ordering::Greater,
        },
        Ordering::Greater => match scale_up(b.magnitude, a.scale - b.scale) {
            Ok(aligned) => a.magnitude.cmp(&aligned),
            Err(_) => Ordering::Less,
        },
    }
}

impl Ord for DecimalNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => cmp_magnitudes(self, other),
            (true, true) => cmp_magnitudes(other, self),
        }
    }
}

impl PartialOrd for DecimalNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for DecimalNumber {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<u64> for DecimalNumber {
    fn from(value: u64) -> Self {
        Self::from_parts(false, U256::from(value), 0)
    }
}

impl From<U256> for DecimalNumber {
    fn from(value: U256) -> Self {
        Self::from_parts(false, value, 0)
    }
}

impl FromStr for DecimalNumber {
    type Err = DecimalError;

    /// Parses plain (`-12.5`) and exponent (`1.25e-3`) notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecimalError::Invalid(s.to_string());
        let trimmed = s.trim();

        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(pos) => {
                let exponent: i64 = unsigned[pos + 1..].parse().map_err(|_| invalid())?;
                (&unsigned[..pos], exponent)
            }
            None => (unsigned, 0),
        };

        let (integer, fraction) = match mantissa.split_once('.') {
            Some((integer, fraction)) => (integer, fraction),
            None => (mantissa, ""),
        };
        if integer.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let mut magnitude = U256::ZERO;
        for c in integer.chars().chain(fraction.chars()) {
            let digit = c.to_digit(10).ok_or_else(invalid)?;
            magnitude = magnitude
                .checked_mul(ten())
                .and_then(|m| m.checked_add(U256::from(digit)))
                .ok_or(DecimalError::Overflow)?;
        }

        // i128 holds any digit count minus any i64 exponent
        let scale = fraction.len() as i128 - i128::from(exponent);
        if scale < 0 {
            let digits = u32::try_from(-scale).map_err(|_| DecimalError::Overflow)?;
            return Ok(Self::from_parts(negative, scale_up(magnitude, digits)?, 0));
        }
        let scale = u32::try_from(scale).map_err(|_| DecimalError::Overflow)?;
        if scale > MAX_SCALE {
            let magnitude = scale_down_half_up(magnitude, scale - MAX_SCALE)?;
            return Ok(Self::from_parts(negative, magnitude, MAX_SCALE));
        }
        Ok(Self::from_parts(negative, magnitude, scale))
    }
}

impl fmt::Display for DecimalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative { "-" } else { "" };
        let digits = self.magnitude.to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = if digits.len() <= scale {
            format!("{:0>width$}", digits, width = scale + 1)
        } else {
            digits
        };
        let (integer, fraction) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, integer, fraction)
    }
}

impl fmt::Debug for DecimalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecimalNumber({})", self)
    }
}

impl Serialize for DecimalNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct DecimalVisitor;

impl<'de> de::Visitor<'de> for DecimalVisitor {
    type Value = DecimalNumber;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal number or a decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(DecimalNumber::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        let magnitude = DecimalNumber::from(v.unsigned_abs());
        Ok(if v < 0 { magnitude.negated() } else { magnitude })
    }

    // JSON numbers arrive as f64; the shortest round-trip representation is the
    // closest decimal to what the upstream wrote.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() {
            return Err(E::custom(format!("non-finite number {}", v)));
        }
        v.to_string().parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for DecimalNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> DecimalNumber {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display_are_canonical() {
        assert_eq!(d("1.500").to_string(), "1.5");
        assert_eq!(d("-0.000").to_string(), "0");
        assert_eq!(d(".25").to_string(), "0.25");
        assert_eq!(d("1.25e-3").to_string(), "0.00125");
        assert_eq!(d("12e3").to_string(), "12000");
        assert_eq!(d("-42").to_string(), "-42");
        assert!("abc".parse::<DecimalNumber>().is_err());
        assert!("1.2.3".parse::<DecimalNumber>().is_err());
        assert!(".".parse::<DecimalNumber>().is_err());
    }

    #[test]
    fn test_raw_conversion_is_lossless() {
        let raw = U256::from(160_006_517_430_032_680_046u128);
        let value = DecimalNumber::from_raw(raw, 18);
        assert_eq!(value.to_string(), "160.006517430032680046");
        assert_eq!(value.to_raw(18).unwrap(), raw);
        assert_eq!(d("1.5").to_raw(6).unwrap(), U256::from(1_500_000u64));
    }

    #[test]
    fn test_to_raw_rounds_half_up() {
        assert_eq!(d("1.0000005").to_raw(6).unwrap(), U256::from(1_000_001u64));
        assert_eq!(d("1.0000004").to_raw(6).unwrap(), U256::from(1_000_000u64));
        assert_eq!(d("-1").to_raw(6), Err(DecimalError::Negative));
    }

    #[test]
    fn test_add_sub_mixed_signs() {
        assert_eq!(d("1.25").checked_add(&d("-3.5")).unwrap(), d("-2.25"));
        assert_eq!(d("0.1").checked_add(&d("0.2")).unwrap(), d("0.3"));
        assert_eq!(d("5").checked_sub(&d("5.000")).unwrap(), DecimalNumber::zero());
    }

    #[test]
    fn test_mul_is_exact() {
        assert_eq!(
            d("160.006517430032680046")
                .checked_mul(&d("0.0130404016454077124"))
                .unwrap()
                .to_string(),
            "2.0865492531705559745126575317299867704"
        );
        assert_eq!(d("-2").checked_mul(&d("0.5")).unwrap(), d("-1"));
    }

    #[test]
    fn test_division_rounds_half_up_to_twenty_places() {
        assert_eq!(
            d("2").checked_div(&d("3")).unwrap().to_string(),
            "0.66666666666666666667"
        );
        assert_eq!(
            d("12445.060074286696111325")
                .checked_div(&d("160.006517430032680046"))
                .unwrap()
                .to_string(),
            "77.77845724145984437582"
        );
        assert_eq!(
            d("1").checked_div(&d("0")),
            Err(DecimalError::DivisionByZero)
        );
    }

    #[test]
    fn test_share_price_from_raw_amounts_is_not_float_rounded() {
        let reserve = DecimalNumber::from_raw(
            U256::from_str("12345678901234567890123").unwrap(),
            18,
        );
        let supply = DecimalNumber::from_raw(
            U256::from_str("3000000000000000000000").unwrap(),
            18,
        );
        let price = reserve.checked_div(&supply).unwrap();
        assert_eq!(price.to_string(), "4.11522630041152263004");

        let float = 12345.678901234567890123_f64 / 3000.0;
        assert_ne!(price.to_string(), float.to_string());
    }

    #[test]
    fn test_ordering() {
        assert!(d("-1") < d("0"));
        assert!(d("0.001") < d("0.01"));
        assert!(d("-0.5") > d("-1.5"));
        assert_eq!(d("2.50").cmp(&d("2.5")), Ordering::Equal);
        let mut values = vec![d("3"), d("-2"), d("0.5")];
        values.sort();
        assert_eq!(values, vec![d("-2"), d("0.5"), d("3")]);
    }

    #[test]
    fn test_overflow_is_reported() {
        let huge = DecimalNumber::from(U256::MAX);
        assert_eq!(huge.checked_add(&d("1")), Err(DecimalError::Overflow));
        assert_eq!(huge.checked_mul(&d("2")), Err(DecimalError::Overflow));
        assert_eq!(huge.checked_div(&d("0.5")), Err(DecimalError::Overflow));
    }

    #[test]
    fn test_extreme_exponents_are_rejected() {
        assert_eq!(
            "1.55e-9223372036854775807".parse::<DecimalNumber>(),
            Err(DecimalError::Overflow)
        );
        assert_eq!(
            "1.55e-9223372036854775808".parse::<DecimalNumber>(),
            Err(DecimalError::Overflow)
        );
        assert_eq!(
            "1e9223372036854775807".parse::<DecimalNumber>(),
            Err(DecimalError::Overflow)
        );
        assert_eq!(d("1.5e-80"), DecimalNumber::zero());
    }

    #[test]
    fn test_division_by_a_finely_scaled_divisor() {
        // 1e-18 + 1e-77: a 60-digit magnitude at scale 77
        let divisor = d(&format!("0.{}1{}1", "0".repeat(17), "0".repeat(58)));
        assert_eq!(divisor.scale(), 77);
        assert_eq!(d("3e-18").checked_div(&divisor).unwrap(), d("3"));
        assert_eq!(
            d("1").checked_div(&divisor).unwrap(),
            d("1000000000000000000")
        );
    }

    #[test]
    fn test_serde_uses_strings() {
        let value = d("0.00015738574843135427");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"0.00015738574843135427\"");
        let back: DecimalNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
        let from_number: DecimalNumber = serde_json::from_str("1.5").unwrap();
        assert_eq!(from_number, d("1.5"));
        let from_int: DecimalNumber = serde_json::from_str("-3").unwrap();
        assert_eq!(from_int, d("-3"));
    }
}
