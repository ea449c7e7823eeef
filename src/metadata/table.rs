use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, ops::Index};

use super::{column::Column, Error, Result};
use crate::builder::{Ready, With, WithIterator};

fn max_ids_default() -> usize {
    1
}

/// A table declared by the data owner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    /// Row count estimate, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
    columns: Vec<Column>,
    /// Maximum number of rows a single individual contributes
    #[serde(default = "max_ids_default")]
    max_ids: usize,
    /// Each row is a distinct individual
    #[serde(default)]
    row_privacy: bool,
}

impl Table {
    /// Table constructor, checking the declaration
    pub fn new<S: Into<String>>(name: S, columns: Vec<Column>) -> Result<Table> {
        let table = Table {
            name: name.into(),
            size: None,
            columns,
            max_ids: 1,
            row_privacy: false,
        };
        table.validate()?;
        Ok(table)
    }

    /// Builder
    pub fn builder() -> TableBuilder {
        TableBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn max_ids(&self) -> usize {
        self.max_ids
    }

    pub fn row_privacy(&self) -> bool {
        self.row_privacy
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Access a column by name, SQL identifiers being case insensitive
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::not_found(format!("column {name} in table {}", self.name)))
    }

    /// The private identifier column if any
    pub fn identifier(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_identifier())
    }

    /// Check the invariants of the declaration
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::invalid_metadata(format!(
                "table {} declares no column",
                self.name
            )));
        }
        let mut names = HashSet::new();
        for column in &self.columns {
            if !names.insert(column.name().to_ascii_lowercase()) {
                return Err(Error::invalid_metadata(format!(
                    "table {} declares column {} twice",
                    self.name,
                    column.name()
                )));
            }
            column.validate()?;
        }
        let identifiers = self.columns.iter().filter(|c| c.is_identifier()).count();
        match (identifiers, self.row_privacy) {
            (0, false) => Err(Error::invalid_metadata(format!(
                "table {} declares no private identifier column and is not row_privacy",
                self.name
            ))),
            (0, true) | (1, _) => Ok(()),
            (n, _) => Err(Error::invalid_metadata(format!(
                "table {} declares {n} private identifier columns, at most one is allowed",
                self.name
            ))),
        }?;
        if self.max_ids == 0 {
            return Err(Error::invalid_metadata(format!(
                "table {} declares max_ids = 0",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{{}}}",
            self.name,
            self.columns.iter().map(|c| format!("{c}")).join(", ")
        )
    }
}

impl Index<&str> for Table {
    type Output = Column;

    fn index(&self, name: &str) -> &Self::Output {
        match self.column(name) {
            Ok(column) => column,
            Err(err) => panic!("{err}"),
        }
    }
}

/// A builder for [Table]
#[derive(Clone, Debug, Default)]
pub struct TableBuilder {
    name: Option<String>,
    size: Option<usize>,
    columns: Vec<Column>,
    max_ids: Option<usize>,
    row_privacy: bool,
}

impl TableBuilder {
    pub fn new() -> Self {
        TableBuilder::default()
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn columns<I: IntoIterator<Item = Column>>(self, columns: I) -> Self {
        self.with_iter(columns)
    }

    pub fn max_ids(mut self, max_ids: usize) -> Self {
        self.max_ids = Some(max_ids);
        self
    }

    pub fn row_privacy(mut self, row_privacy: bool) -> Self {
        self.row_privacy = row_privacy;
        self
    }
}

impl With<Column> for TableBuilder {
    fn with(mut self, input: Column) -> Self {
        self.columns.push(input);
        self
    }
}

impl Ready<Table> for TableBuilder {
    type Error = Error;

    fn try_build(self) -> Result<Table> {
        let name = self
            .name
            .ok_or_else(|| Error::invalid_metadata("a table needs a name"))?;
        let table = Table {
            name,
            size: self.size,
            columns: self.columns,
            max_ids: self.max_ids.unwrap_or(1),
            row_privacy: self.row_privacy,
        };
        table.validate()?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn census() -> TableBuilder {
        Table::builder()
            .name("T")
            .size(1000)
            .with(Column::integer("age", 0, 100))
            .with(Column::float("income", 0., 500000.))
            .with(Column::boolean("married"))
    }

    #[test]
    fn test_builder() {
        let table = census().with(Column::unbounded("pid").with_private_id()).build();
        println!("table = {table}");
        assert_eq!(table.size(), Some(1000));
        assert_eq!(table.max_ids(), 1);
        assert_eq!(table.identifier().map(Column::name), Some("pid"));
        assert_eq!(table["INCOME"].name(), "income");
        assert!(table.column("sex").is_err());
    }

    #[test]
    fn test_identifier_invariant() {
        assert!(census().try_build().is_err());
        assert!(census().row_privacy(true).try_build().is_ok());
        assert!(census()
            .with(Column::unbounded("pid").with_private_id())
            .with(Column::unbounded("ssn").with_private_id())
            .try_build()
            .is_err());
    }

    #[test]
    fn test_duplicate_columns() {
        let result = Table::new(
            "T",
            vec![
                Column::unbounded("pid").with_private_id(),
                Column::integer("age", 0, 100),
                Column::integer("Age", 0, 100),
            ],
        );
        assert!(result.is_err());
    }
}
