//! Rational voting thresholds and the required-power computation.
//!
//! All threshold math is exact integer arithmetic so that every node computes
//! the same required power regardless of platform.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// A fraction `num/den` in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThreshold")]
pub struct Threshold {
    num: u64,
    den: u64,
}

#[derive(Deserialize)]
struct RawThreshold {
    num: u64,
    den: u64,
}

impl TryFrom<RawThreshold> for Threshold {
    type Error = TypesError;

    fn try_from(raw: RawThreshold) -> Result<Self, Self::Error> {
        Threshold::new(raw.num, raw.den)
    }
}

impl Threshold {
    /// Default confirmation threshold.
    pub const TWO_THIRDS: Self = Self { num: 2, den: 3 };
    /// Default refund threshold.
    pub const ONE: Self = Self { num: 1, den: 1 };

    pub fn new(num: u64, den: u64) -> Result<Self, TypesError> {
        if den == 0 || num > den {
            return Err(TypesError::InvalidThreshold { num, den });
        }
        Ok(Self { num, den })
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn den(&self) -> u64 {
        self.den
    }

    /// Power needed to meet this threshold out of `total_power`.
    pub fn required_power(&self, total_power: i64) -> i64 {
        required_power(*self, total_power)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// `ceil(total_power * num / den)`, computed as
/// `floor((total_power * num + den - 1) / den)` in 128-bit arithmetic.
///
/// A negative total is treated as zero. The result never exceeds
/// `total_power` because `num <= den`.
pub fn required_power(threshold: Threshold, total_power: i64) -> i64 {
    let total = total_power.max(0) as u128;
    let num = threshold.num as u128;
    let den = threshold.den as u128;
    let required = (total * num + den - 1) / den;
    // bounded by total_power, so the narrowing is lossless
    required as i64
}
