//! # Data types declared in the metadata
//!
//! A column is declared with a [DataType] and possibly a numeric range.
//! Combined, they give the [Bounds] used to compute sensitivities.
//!

pub mod value;

use serde::{Deserialize, Serialize};
use std::{fmt, hash};

pub use value::Value;

/// The declared type of a column
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Integer,
    Float,
    Boolean,
    /// Text or any other discrete type taking values in a set
    Categorical,
    /// A numeric type without any known bound
    Unbounded,
}

impl DataType {
    /// Numeric types can be summed, averaged and compared
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Integer | DataType::Float | DataType::Unbounded
        )
    }

    /// The SQL type used to create tables in exact backends
    pub fn sql_type(&self) -> &'static str {
        match self {
            DataType::Integer => "BIGINT",
            DataType::Float | DataType::Unbounded => "DOUBLE PRECISION",
            DataType::Boolean => "BOOLEAN",
            DataType::Categorical => "TEXT",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "integer"),
            DataType::Float => write!(f, "float"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::Categorical => write!(f, "categorical"),
            DataType::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// What is known of the range of a column
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bounds {
    Bounded { min: f64, max: f64 },
    Unbounded,
    Undeclared,
}

impl Bounds {
    pub fn bounded(min: f64, max: f64) -> Self {
        Bounds::Bounded { min, max }
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self, Bounds::Bounded { .. })
    }

    /// The largest absolute value a record can take: max(|min|, |max|)
    pub fn absolute_upper_bound(&self) -> Option<f64> {
        match self {
            Bounds::Bounded { min, max } => Some(min.abs().max(max.abs())),
            _ => None,
        }
    }

    /// max - min
    pub fn width(&self) -> Option<f64> {
        match self {
            Bounds::Bounded { min, max } => Some(max - min),
            _ => None,
        }
    }

    pub fn midpoint(&self) -> Option<f64> {
        match self {
            Bounds::Bounded { min, max } => Some((min + max) / 2.),
            _ => None,
        }
    }

    /// Clamp a value into the bounds, if any
    pub fn clamp(&self, value: f64) -> f64 {
        match self {
            Bounds::Bounded { min, max } => value.clamp(*min, *max),
            _ => value,
        }
    }
}

impl Eq for Bounds {}

impl hash::Hash for Bounds {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        match self {
            Bounds::Bounded { min, max } => {
                min.to_be_bytes().hash(state);
                max.to_be_bytes().hash(state);
            }
            other => std::mem::discriminant(other).hash(state),
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bounds::Bounded { min, max } => write!(f, "[{min} {max}]"),
            Bounds::Unbounded => write!(f, "unbounded"),
            Bounds::Undeclared => write!(f, "undeclared"),
        }
    }
}
