use serde::{Deserialize, Serialize};
use std::fmt;

/// The aggregations a private reader can release
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Count,
    Sum,
    /// `AVG` in SQL
    Mean,
    Min,
    Max,
}

impl Aggregate {
    /// Recognize a SQL aggregate function name (case insensitive)
    pub fn from_name(name: &str) -> Option<Aggregate> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(Aggregate::Count),
            "sum" => Some(Aggregate::Sum),
            "avg" | "mean" => Some(Aggregate::Mean),
            "min" => Some(Aggregate::Min),
            "max" => Some(Aggregate::Max),
            _ => None,
        }
    }

    /// Only `COUNT` can aggregate non numeric columns
    pub fn requires_numeric(&self) -> bool {
        !matches!(self, Aggregate::Count)
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Count => write!(f, "COUNT"),
            Aggregate::Sum => write!(f, "SUM"),
            Aggregate::Mean => write!(f, "AVG"),
            Aggregate::Min => write!(f, "MIN"),
            Aggregate::Max => write!(f, "MAX"),
        }
    }
}
