//! # Exact readers
//!
//! The data sources a private reader queries. Any type able to run a SQL query
//! and return a [ResultSet] is an [ExactReader].
//!
//! For now supports:
//! - An in-memory evaluator of the aggregate SQL subset
//! - Postgresql
//! - SQLite using the ["sqlite"] feature.
//!

pub mod memory;
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::{
    builder::{Ready, With},
    data_type::{self, Value},
    metadata::{self, Column, Metadata, Table},
    result_set::ResultSet,
};
use itertools::Itertools;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::{convert::Infallible, error, fmt, io, result};

const DATA_GENERATION_SEED: u64 = 1234;

// Error management
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Database(String),
    Dataset(String),
    Query(String),
    Other(String),
}

impl Error {
    pub fn database(database: impl fmt::Display) -> Error {
        Error::Database(format!("Database error {}", database))
    }
    pub fn dataset(dataset: impl fmt::Display) -> Error {
        Error::Dataset(format!("Dataset error {}", dataset))
    }
    pub fn query(desc: impl fmt::Display) -> Error {
        Error::Query(desc.to_string())
    }
    pub fn other(desc: impl fmt::Display) -> Error {
        Error::Other(format!("{}", desc))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(database) => write!(f, "Database: {}", database),
            Error::Dataset(dataset) => write!(f, "Dataset: {}", dataset),
            Error::Query(desc) => write!(f, "Query: {}", desc),
            Error::Other(desc) => write!(f, "{}", desc),
        }
    }
}

impl error::Error for Error {}

impl From<Infallible> for Error {
    fn from(err: Infallible) -> Self {
        Error::Other(err.to_string())
    }
}
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Other(err.to_string())
    }
}
impl From<data_type::value::Error> for Error {
    fn from(err: data_type::value::Error) -> Self {
        Error::Other(err.to_string())
    }
}
impl From<metadata::Error> for Error {
    fn from(err: metadata::Error) -> Self {
        Error::Dataset(err.to_string())
    }
}
impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Database(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Anything able to run a plain SQL query and return its exact result
pub trait ExactReader {
    fn execute(&mut self, query: &str) -> Result<ResultSet>;
}

/// A declared table with its rows
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    table: Table,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Every row must have one value per declared column
    pub fn new(table: Table, rows: Vec<Vec<Value>>) -> Result<Dataset> {
        let width = table.columns().len();
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(Error::dataset(format!(
                "table {} has {width} columns but a row has {} values",
                table.name(),
                row.len()
            )));
        }
        Ok(Dataset { table, rows })
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// The `CREATE TABLE` statement of the dataset
    pub fn create(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name(),
            self.table
                .iter()
                .map(|column| format!(
                    "{} {}{}",
                    column.name(),
                    column.data_type().sql_type(),
                    if column.is_nullable() { "" } else { " NOT NULL" }
                ))
                .join(", ")
        )
    }

    /// The parametrized `INSERT` statement of the dataset.
    /// Parameters are `?` or numbered from `$1`.
    pub fn insert(&self, prefix: char) -> String {
        let parameters = (1..=self.table.columns().len())
            .map(|i| match prefix {
                '?' => "?".to_string(),
                prefix => format!("{prefix}{i}"),
            })
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({parameters})",
            self.name(),
            self.table.iter().map(Column::name).join(", ")
        )
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} rows)", self.table, self.rows.len())
    }
}

pub trait Database: Sized {
    /// Create a database
    fn new(name: String, datasets: Vec<Dataset>) -> Result<Self>;
    /// Get the name
    fn name(&self) -> &str;
    /// Get the datasets
    fn datasets(&self) -> &[Dataset];
    /// Get a mutable reference to the datasets
    fn datasets_mut(&mut self) -> &mut Vec<Dataset>;
    /// The metadata of the tables
    fn metadata(&self) -> Result<Metadata> {
        Ok(Metadata::new(
            self.datasets().iter().map(|d| d.table().clone()).collect(),
        )?)
    }
    /// Create an empty db
    fn empty(name: String) -> Result<Self> {
        Self::new(name, vec![])
    }
    /// Create a table from a dataset
    fn create_table(&mut self, dataset: &Dataset) -> Result<usize>;
    /// Insert data in the tables
    fn insert_data(&mut self, dataset: &Dataset) -> Result<()>;
    /// Execute a query
    fn query(&mut self, query: &str) -> Result<ResultSet>;
    /// Test the equivalence of queries regarding the output with this DB
    fn eq(&mut self, left: &str, right: &str) -> bool {
        if let (Ok(left), Ok(right)) = (self.query(left), self.query(right)) {
            left.rows() == right.rows()
        } else {
            false
        }
    }
    /// A basic test DB: the census table `T`
    fn test_datasets() -> Vec<Dataset> {
        vec![census()]
    }

    /// Add a vec of datasets
    fn with_datasets(self, datasets: Vec<Dataset>) -> Result<Self> {
        datasets.into_iter().fold(Ok(self), |db, d| db?.with(d))
    }

    /// A basic test DB
    fn with_test_datasets(self) -> Result<Self> {
        self.with_datasets(Self::test_datasets())
    }
}

impl<D: Database> With<Dataset, Result<Self>> for D {
    fn with(mut self, input: Dataset) -> Result<Self> {
        self.create_table(&input)?;
        self.insert_data(&input)?;
        self.datasets_mut().push(input);
        Ok(self)
    }
}

/// Every database is an exact reader
impl<D: Database> ExactReader for D {
    fn execute(&mut self, query: &str) -> Result<ResultSet> {
        log::debug!("Exact query on {}: {query}", self.name());
        self.query(query)
    }
}

/// The census metadata: 1000 individuals, 451 of whom are not married
pub fn census_table() -> Table {
    Table::builder()
        .name("T")
        .size(1000)
        .columns([
            Column::unbounded("pid").with_private_id().not_null(),
            Column::integer("age", 0, 100),
            Column::float("income", 0., 500000.),
            Column::boolean("married"),
            Column::categorical("city", 3),
        ])
        .build()
}

/// The census data, generated with a fixed seed
pub fn census() -> Dataset {
    let mut rng = StdRng::seed_from_u64(DATA_GENERATION_SEED);
    let cities = ["Paris", "New-York", "Rome"];
    let rows = (0..1000)
        .map(|pid| {
            let age: i64 = rng.gen_range(18..=100);
            let income: f64 = (rng.gen_range(0.0..100000.0) + 1000. * age as f64).round();
            vec![
                Value::integer(pid),
                Value::integer(age),
                Value::float(income),
                Value::boolean(pid >= 451),
                cities
                    .choose(&mut rng)
                    .map_or(Value::null(), |city| Value::text(*city)),
            ]
        })
        .collect();
    Dataset {
        table: census_table(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_census() {
        let census = census();
        println!("{census}");
        assert_eq!(census.rows().len(), 1000);
        assert_eq!(
            census
                .rows()
                .iter()
                .filter(|row| row[3] == Value::boolean(false))
                .count(),
            451
        );
        assert!(census.rows().iter().all(|row| {
            row[1] >= Value::integer(0) && row[1] <= Value::integer(100) && row[2] <= Value::float(500000.)
        }));
        // Reproducible
        assert_eq!(census, super::census());
    }

    #[test]
    fn test_statements() {
        let census = census();
        assert_eq!(
            census.create(),
            "CREATE TABLE IF NOT EXISTS T (pid DOUBLE PRECISION NOT NULL, age BIGINT, \
            income DOUBLE PRECISION, married BOOLEAN, city TEXT)"
        );
        assert_eq!(
            census.insert('$'),
            "INSERT INTO T (pid, age, income, married, city) VALUES ($1, $2, $3, $4, $5)"
        );
        assert_eq!(
            census.insert('?'),
            "INSERT INTO T (pid, age, income, married, city) VALUES (?, ?, ?, ?, ?)"
        );
    }

    #[test]
    fn test_dataset_width() {
        assert!(matches!(
            Dataset::new(census_table(), vec![vec![Value::integer(1)]]),
            Err(Error::Dataset(_))
        ));
    }
}
