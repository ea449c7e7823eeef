//! # Schema metadata
//!
//! The static, data-independent description of the tables a private reader
//! may query: column types, declared ranges and private identifiers.
//! Metadata are supplied by the data owner and never derived from the data.
//!

pub mod column;
pub mod table;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, error, fmt, result};

pub use column::Column;
pub use table::{Table, TableBuilder};

// Error management

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    NotFound(String),
    InvalidMetadata(String),
    Other(String),
}

impl Error {
    pub fn not_found(name: impl fmt::Display) -> Error {
        Error::NotFound(format!("{name} not found"))
    }
    pub fn invalid_metadata(desc: impl fmt::Display) -> Error {
        Error::InvalidMetadata(desc.to_string())
    }
    pub fn other(desc: impl fmt::Display) -> Error {
        Error::Other(desc.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(desc) => write!(f, "NotFound: {}", desc),
            Error::InvalidMetadata(desc) => write!(f, "InvalidMetadata: {}", desc),
            Error::Other(desc) => write!(f, "{}", desc),
        }
    }
}

impl error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidMetadata(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;

/// The collection of declared tables
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    tables: Vec<Table>,
}

impl Metadata {
    /// Build metadata, checking every table and the uniqueness of table names
    pub fn new(tables: Vec<Table>) -> Result<Metadata> {
        let metadata = Metadata { tables };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Load metadata from their JSON representation
    pub fn from_json(json: &str) -> Result<Metadata> {
        let metadata: Metadata = serde_json::from_str(json)?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Describe a table by name, SQL identifiers being case insensitive
    pub fn describe(&self, table: &str) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(table))
            .ok_or_else(|| Error::not_found(format!("table {table}")))
    }

    /// Shorthand for `describe(table)?.column(column)`
    pub fn column(&self, table: &str, column: &str) -> Result<&Column> {
        self.describe(table)?.column(column)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for table in &self.tables {
            if !names.insert(table.name().to_ascii_lowercase()) {
                return Err(Error::invalid_metadata(format!(
                    "table {} is declared twice",
                    table.name()
                )));
            }
            table.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tables.iter().join("\n"))
    }
}

impl From<Table> for Metadata {
    fn from(table: Table) -> Self {
        Metadata {
            tables: vec![table],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::{Bounds, DataType};

    const CENSUS: &str = r#"{
        "tables": [{
            "name": "T",
            "size": 1000,
            "columns": [
                {"name": "pid", "data_type": "unbounded", "private_id": true},
                {"name": "age", "data_type": "integer", "range": [0, 100]},
                {"name": "income", "data_type": "float", "range": [0, 500000]},
                {"name": "married", "data_type": "boolean"},
                {"name": "city", "data_type": "categorical", "cardinality": 3}
            ]
        }]
    }"#;

    #[test]
    fn test_from_json() -> Result<()> {
        let metadata = Metadata::from_json(CENSUS)?;
        println!("{metadata}");
        let table = metadata.describe("t")?;
        assert_eq!(table.size(), Some(1000));
        assert_eq!(table.max_ids(), 1);
        assert_eq!(table.column("income")?.bounds(), Bounds::bounded(0., 500000.));
        assert_eq!(table.column("city")?.cardinality(), 3);
        assert_eq!(metadata.column("T", "pid")?.data_type(), DataType::Unbounded);
        assert!(matches!(metadata.describe("users"), Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_round_trip_through_json() -> Result<()> {
        let metadata = Metadata::from_json(CENSUS)?;
        assert_eq!(Metadata::from_json(&metadata.to_json()?)?, metadata);
        Ok(())
    }

    #[test]
    fn test_invalid_json_metadata() {
        let no_identifier = r#"{"tables": [{"name": "T", "columns": [
            {"name": "age", "data_type": "integer", "range": [0, 100]}
        ]}]}"#;
        assert!(matches!(
            Metadata::from_json(no_identifier),
            Err(Error::InvalidMetadata(_))
        ));
        let twice = Table::new("T", vec![Column::unbounded("pid").with_private_id()]).unwrap();
        assert!(Metadata::new(vec![twice.clone(), twice]).is_err());
    }
}
