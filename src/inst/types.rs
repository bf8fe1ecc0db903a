//! Access Kind Model
//!
//! Describes the shape of a memory access: how wide the whole vector access
//! is, how wide one element unit is, and whether the bits are integer or
//! floating point.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive interpretation of the accessed bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    /// Interpretation could not be resolved
    #[default]
    Unknown,
    /// Integer bits
    Integer,
    /// Floating point bits
    Float,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
        }
    }
}

/// Shape of one memory access
///
/// Field order matters: map keys compare lexicographically by
/// `(vec_size, unit_size, data_type)`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AccessKind {
    /// Total access width in bits (8, 16, 32, 64, or 128)
    pub vec_size: u32,
    /// Element unit width in bits (8, 16, 32, or 64), never above `vec_size`
    pub unit_size: u32,
    /// Primitive interpretation of each unit
    pub data_type: DataType,
}

impl AccessKind {
    /// Create a kind; the unit width is clamped to the vector width
    #[must_use]
    pub fn new(unit_size: u32, vec_size: u32, data_type: DataType) -> Self {
        Self {
            vec_size,
            unit_size: unit_size.min(vec_size),
            data_type,
        }
    }

    /// The unresolved kind
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            vec_size: 0,
            unit_size: 0,
            data_type: DataType::Unknown,
        }
    }

    /// Whether the interpretation is still unresolved
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self.data_type, DataType::Unknown)
    }

    /// Unit width in bytes
    #[must_use]
    pub const fn unit_bytes(&self) -> usize {
        (self.unit_size / 8) as usize
    }

    /// Number of element units in one access
    #[must_use]
    pub const fn units(&self) -> u32 {
        if self.unit_size == 0 {
            0
        } else {
            self.vec_size / self.unit_size
        }
    }

    /// The same kind narrowed to a single element unit
    #[must_use]
    pub const fn unit(&self) -> Self {
        Self {
            vec_size: self.unit_size,
            unit_size: self.unit_size,
            data_type: self.data_type,
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}, v: {}, u: {}}}",
            self.data_type, self.vec_size, self.unit_size
        )
    }
}
