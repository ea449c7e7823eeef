//! # Result sets
//!
//! What exact readers return and what private readers give back:
//! named columns and ordered rows of values.
//!

use itertools::Itertools;
use serde::Serialize;
use std::{fmt, ops::Index};

use crate::data_type::Value;

/// An ordered sequence of rows sharing the same named columns
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// ResultSet constructor, all rows must have one value per column
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        assert!(
            rows.iter().all(|row| row.len() == columns.len()),
            "Every row must have {} values",
            columns.len()
        );
        ResultSet { columns, rows }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        ResultSet::new(columns, vec![])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<Value>> {
        self.rows.iter()
    }

    /// Position of a column (case insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// The value of the named column in a row
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// All the values of a column
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[index]).collect())
    }

    /// A row as an ordered mapping from column name to value
    pub fn record(&self, row: usize) -> Option<Vec<(&str, &Value)>> {
        self.rows.get(row).map(|r| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(r.iter())
                .collect()
        })
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Index<usize> for ResultSet {
    type Output = Vec<Value>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.rows[index]
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.iter().join(" | "))?;
        for row in &self.rows {
            writeln!(f, "{}", row.iter().join(" | "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn married_counts() -> ResultSet {
        ResultSet::new(
            vec!["married".into(), "n".into()],
            vec![
                vec![Value::boolean(false), Value::integer(451)],
                vec![Value::boolean(true), Value::integer(549)],
            ],
        )
    }

    #[test]
    fn test_access() {
        let result_set = married_counts();
        println!("{result_set}");
        assert_eq!(result_set.len(), 2);
        assert_eq!(result_set.get(1, "N"), Some(&Value::integer(549)));
        assert_eq!(result_set.get(2, "n"), None);
        assert_eq!(result_set.column("married").unwrap().len(), 2);
        assert_eq!(
            result_set.record(0),
            Some(vec![
                ("married", &Value::boolean(false)),
                ("n", &Value::integer(451))
            ])
        );
        assert_eq!(
            result_set.to_json().unwrap(),
            r#"{"columns":["married","n"],"rows":[[false,451],[true,549]]}"#
        );
    }

    #[test]
    #[should_panic]
    fn test_ragged_rows() {
        ResultSet::new(vec!["n".into()], vec![vec![Value::integer(1), Value::null()]]);
    }
}
