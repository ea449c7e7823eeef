//! # Sensitivity and noise calibration
//!
//! Compute the sensitivity of each released aggregate, split the privacy
//! budget between them and perturb exact results with the Laplace mechanism.
//!

pub mod aggregates;
pub mod budget;
pub mod dp_event;
pub mod dp_parameters;
pub mod mechanisms;

use crate::{expr::Aggregate, metadata::Column};
use std::{error, fmt, result};

/// Some exports
pub use aggregates::NoisePlan;
pub use budget::Budget;
pub use dp_event::DpEvent;
pub use dp_parameters::DpParameters;
pub use mechanisms::{laplace_variance, sample_noise};

#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    MissingRange(String),
    InvalidBudget(String),
    Other(String),
}

impl Error {
    pub fn missing_range(column: impl fmt::Display) -> Error {
        Error::MissingRange(format!("no range is declared for column {column}"))
    }
    pub fn invalid_budget(desc: impl fmt::Display) -> Error {
        Error::InvalidBudget(desc.to_string())
    }
    pub fn other(desc: impl fmt::Display) -> Error {
        Error::Other(desc.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingRange(desc) => write!(f, "MissingRange: {}", desc),
            Error::InvalidBudget(desc) => write!(f, "InvalidBudget: {}", desc),
            Error::Other(err) => write!(f, "{}", err),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// The sensitivity of an aggregate to the addition or removal of one record.
/// `column` is `None` for `COUNT(*)`.
pub fn sensitivity(aggregate: Aggregate, column: Option<&Column>) -> Result<f64> {
    let bounds = column.map(Column::bounds);
    let missing_range = || Error::missing_range(column.map_or("*", Column::name));
    match aggregate {
        Aggregate::Count => Ok(1.),
        Aggregate::Sum => bounds
            .and_then(|b| b.absolute_upper_bound())
            .ok_or_else(missing_range),
        Aggregate::Min | Aggregate::Max => {
            bounds.and_then(|b| b.width()).ok_or_else(missing_range)
        }
        Aggregate::Mean => Err(Error::other(
            "AVG has no sensitivity of its own, it is released as a SUM and a COUNT",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::DataType;

    #[test]
    fn test_sensitivity() -> Result<()> {
        let age = Column::integer("age", 0, 100);
        let balance = Column::float("balance", -2000., 500.);
        let pid = Column::unbounded("pid").with_private_id();
        let height = Column::new("height", DataType::Float);
        for column in [None, Some(&age), Some(&pid), Some(&height)] {
            assert_eq!(sensitivity(Aggregate::Count, column)?, 1.);
        }
        assert_eq!(sensitivity(Aggregate::Sum, Some(&age))?, 100.);
        assert_eq!(sensitivity(Aggregate::Sum, Some(&balance))?, 2000.);
        assert_eq!(sensitivity(Aggregate::Min, Some(&balance))?, 2500.);
        assert_eq!(sensitivity(Aggregate::Max, Some(&age))?, 100.);
        assert!(matches!(sensitivity(Aggregate::Mean, Some(&age)), Err(Error::Other(_))));
        Ok(())
    }

    #[test]
    fn test_missing_range() {
        let pid = Column::unbounded("pid").with_private_id();
        let height = Column::new("height", DataType::Float);
        for (aggregate, column) in [
            (Aggregate::Sum, &pid),
            (Aggregate::Sum, &height),
            (Aggregate::Min, &height),
            (Aggregate::Max, &pid),
        ] {
            let result = sensitivity(aggregate, Some(column));
            println!("{aggregate}({}) => {result:?}", column.name());
            assert_eq!(result, Err(Error::missing_range(column.name())));
        }
    }
}
