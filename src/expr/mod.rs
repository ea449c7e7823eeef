//! # Aggregate expressions
//!
//! The (aggregate function, source column) pairs a query releases.
//!

pub mod aggregate;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use aggregate::Aggregate;

/// The argument of an aggregate function
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argument {
    /// `COUNT(*)`
    Star,
    /// A declared column, named as in the metadata
    Column(String),
}

impl Argument {
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Argument::Star => None,
            Argument::Column(name) => Some(name),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Star => write!(f, "*"),
            Argument::Column(name) => write!(f, "{name}"),
        }
    }
}

/// An aggregate function applied to an argument
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateColumn {
    aggregate: Aggregate,
    argument: Argument,
}

impl AggregateColumn {
    pub fn new(aggregate: Aggregate, argument: Argument) -> Self {
        AggregateColumn {
            aggregate,
            argument,
        }
    }

    pub fn count_star() -> Self {
        AggregateColumn::new(Aggregate::Count, Argument::Star)
    }

    pub fn count<S: Into<String>>(column: S) -> Self {
        AggregateColumn::new(Aggregate::Count, Argument::Column(column.into()))
    }

    pub fn sum<S: Into<String>>(column: S) -> Self {
        AggregateColumn::new(Aggregate::Sum, Argument::Column(column.into()))
    }

    pub fn mean<S: Into<String>>(column: S) -> Self {
        AggregateColumn::new(Aggregate::Mean, Argument::Column(column.into()))
    }

    pub fn min<S: Into<String>>(column: S) -> Self {
        AggregateColumn::new(Aggregate::Min, Argument::Column(column.into()))
    }

    pub fn max<S: Into<String>>(column: S) -> Self {
        AggregateColumn::new(Aggregate::Max, Argument::Column(column.into()))
    }

    pub fn aggregate(&self) -> Aggregate {
        self.aggregate
    }

    pub fn argument(&self) -> &Argument {
        &self.argument
    }

    pub fn column_name(&self) -> Option<&str> {
        self.argument.column_name()
    }

    /// The same argument with another aggregate
    pub fn with_aggregate(&self, aggregate: Aggregate) -> Self {
        AggregateColumn::new(aggregate, self.argument.clone())
    }
}

impl fmt::Display for AggregateColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.aggregate, self.argument)
    }
}
