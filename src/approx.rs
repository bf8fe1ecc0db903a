//! Value Canonicalization
//!
//! Collapses numerically-close floating point values into one canonical bit
//! pattern by zeroing low mantissa bits, so that "same value" redundancy is
//! detectable modulo the configured precision. Integer and unresolved kinds
//! pass through untouched.

use crate::error::{AnalysisError, Result};
use crate::inst::{AccessKind, DataType};
use serde::{Deserialize, Serialize};

/// Mantissa width of an IEEE 754 single
pub const FULL_FLOAT_DIGITS: u32 = 23;
/// Mantissa width of an IEEE 754 double
pub const FULL_DOUBLE_DIGITS: u32 = 52;

/// How aggressively close float values are merged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApproxLevel {
    /// Exact bit equality
    #[default]
    None,
    /// Keep 20 / 46 mantissa bits
    Min,
    /// Keep 17 / 40 mantissa bits
    Low,
    /// Keep 14 / 34 mantissa bits
    Mid,
    /// Keep 11 / 28 mantissa bits
    High,
    /// Keep 8 / 22 mantissa bits
    Max,
}

impl ApproxLevel {
    /// Mantissa digits retained at this level
    #[must_use]
    pub const fn precision(self) -> Precision {
        let (f32_digits, f64_digits) = match self {
            Self::None => (FULL_FLOAT_DIGITS, FULL_DOUBLE_DIGITS),
            Self::Min => (20, 46),
            Self::Low => (17, 40),
            Self::Mid => (14, 34),
            Self::High => (11, 28),
            Self::Max => (8, 22),
        };
        Precision {
            f32_digits,
            f64_digits,
        }
    }
}

impl TryFrom<u32> for ApproxLevel {
    type Error = AnalysisError;

    fn try_from(level: u32) -> Result<Self> {
        match level {
            0 => Ok(Self::None),
            1 => Ok(Self::Min),
            2 => Ok(Self::Low),
            3 => Ok(Self::Mid),
            4 => Ok(Self::High),
            5 => Ok(Self::Max),
            other => Err(AnalysisError::NoSuchApprox(other)),
        }
    }
}

/// Retained mantissa digits for each float width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precision {
    /// Mantissa digits kept for 32-bit floats
    pub f32_digits: u32,
    /// Mantissa digits kept for 64-bit floats
    pub f64_digits: u32,
}

impl Default for Precision {
    fn default() -> Self {
        ApproxLevel::None.precision()
    }
}

/// Canonicalize one unit value according to its kind and the precision
///
/// 32- and 64-bit float units get their low mantissa bits cleared; every
/// other kind returns `value` unchanged.
#[must_use]
pub fn canonicalize(value: u64, kind: AccessKind, precision: Precision) -> u64 {
    match (kind.data_type, kind.unit_size) {
        (DataType::Float, 32) => clear_low_bits(value, FULL_FLOAT_DIGITS - precision.f32_digits),
        (DataType::Float, 64) => clear_low_bits(value, FULL_DOUBLE_DIGITS - precision.f64_digits),
        _ => value,
    }
}

fn clear_low_bits(value: u64, bits: u32) -> u64 {
    if bits == 0 {
        value
    } else {
        value & (u64::MAX << bits)
    }
}
