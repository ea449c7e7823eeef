use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Error, Result};
use crate::data_type::{Bounds, DataType};

/// A column as declared by the data owner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    data_type: DataType,
    /// Declared (min, max) range of numeric values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<(f64, f64)>,
    #[serde(default = "nullable_default")]
    nullable: bool,
    /// Number of distinct values of a categorical column, 0 when unknown or high
    #[serde(default)]
    cardinality: usize,
    /// The column identifies the individual a row belongs to
    #[serde(default)]
    private_id: bool,
}

fn nullable_default() -> bool {
    true
}

impl Column {
    /// Constructor
    pub fn new<S: Into<String>>(name: S, data_type: DataType) -> Column {
        Column {
            name: name.into(),
            data_type,
            range: None,
            nullable: true,
            cardinality: 0,
            private_id: false,
        }
    }

    /// Shorthand for an integer column with a declared range
    pub fn integer<S: Into<String>>(name: S, min: i64, max: i64) -> Column {
        Column::new(name, DataType::Integer).with_range(min as f64, max as f64)
    }

    /// Shorthand for a float column with a declared range
    pub fn float<S: Into<String>>(name: S, min: f64, max: f64) -> Column {
        Column::new(name, DataType::Float).with_range(min, max)
    }

    pub fn boolean<S: Into<String>>(name: S) -> Column {
        Column::new(name, DataType::Boolean)
    }

    pub fn categorical<S: Into<String>>(name: S, cardinality: usize) -> Column {
        Column::new(name, DataType::Categorical).with_cardinality(cardinality)
    }

    pub fn unbounded<S: Into<String>>(name: S) -> Column {
        Column::new(name, DataType::Unbounded)
    }

    /// Return the `Column`'s name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn range(&self) -> Option<(f64, f64)> {
        self.range
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn is_numeric(&self) -> bool {
        self.data_type.is_numeric()
    }

    pub fn is_identifier(&self) -> bool {
        self.private_id
    }

    /// The range or the absence of range, as used for sensitivity computation
    pub fn bounds(&self) -> Bounds {
        match (self.data_type, self.range) {
            (DataType::Unbounded, _) => Bounds::Unbounded,
            (_, Some((min, max))) => Bounds::bounded(min, max),
            (_, None) => Bounds::Undeclared,
        }
    }

    /// Create a new Column with a declared range
    pub fn with_range(self, min: f64, max: f64) -> Column {
        Column {
            range: Some((min, max)),
            ..self
        }
    }

    pub fn with_cardinality(self, cardinality: usize) -> Column {
        Column {
            cardinality,
            ..self
        }
    }

    /// Mark the column as the private identifier
    pub fn with_private_id(self) -> Column {
        Column {
            private_id: true,
            ..self
        }
    }

    pub fn not_null(self) -> Column {
        Column {
            nullable: false,
            ..self
        }
    }

    /// Check the declaration is consistent
    pub fn validate(&self) -> Result<()> {
        if let Some((min, max)) = self.range {
            if !self.is_numeric() || self.data_type == DataType::Unbounded {
                return Err(Error::invalid_metadata(format!(
                    "column {} of type {} cannot declare a range",
                    self.name, self.data_type
                )));
            }
            if !(min.is_finite() && max.is_finite() && min <= max) {
                return Err(Error::invalid_metadata(format!(
                    "column {} declares an invalid range [{min}, {max}]",
                    self.name
                )));
            }
        }
        if self.cardinality > 0 && self.data_type != DataType::Categorical {
            log::warn!(
                "Cardinality hint {} ignored on non categorical column {}",
                self.cardinality,
                self.name
            );
        }
        Ok(())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)?;
        if let Some((min, max)) = self.range {
            write!(f, "[{min} {max}]")?;
        }
        if self.private_id {
            write!(f, " (private_id)")?;
        }
        Ok(())
    }
}

impl<S: Into<String>> From<(S, DataType)> for Column {
    fn from(name_data_type: (S, DataType)) -> Self {
        Column::new(name_data_type.0, name_data_type.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let column = Column::integer("age", 0, 100);
        println!("column = {column}");
        assert!(column.is_numeric());
        assert!(!column.is_identifier());
        assert_eq!(column.bounds(), Bounds::bounded(0., 100.));
        let column = Column::unbounded("pid").with_private_id();
        println!("column = {column}");
        assert!(column.is_identifier());
        assert_eq!(column.bounds(), Bounds::Unbounded);
        let column: Column = ("income", DataType::Float).into();
        assert_eq!(column.bounds(), Bounds::Undeclared);
    }

    #[test]
    fn test_validate() {
        assert!(Column::float("income", 0., 500000.).validate().is_ok());
        assert!(Column::float("income", 10., 0.).validate().is_err());
        assert!(Column::float("income", 0., f64::INFINITY).validate().is_err());
        assert!(Column::boolean("married").with_range(0., 1.).validate().is_err());
        assert!(Column::unbounded("pid").with_range(0., 1.).validate().is_err());
    }

    #[test]
    fn test_deserialize() {
        let column: Column =
            serde_json::from_str(r#"{"name": "age", "data_type": "integer", "range": [0, 100]}"#)
                .unwrap();
        assert_eq!(column, Column::integer("age", 0, 100));
        assert!(column.is_nullable());
    }
}
