use super::{Database as DatabaseTrait, Dataset, Error, Result};
use crate::{data_type::Value, result_set::ResultSet};
use rusqlite::{
    self, params_from_iter,
    types::{FromSql, FromSqlResult, Null, ToSql, ToSqlOutput, ValueRef},
    Connection,
};
use std::result;

const DB: &str = "qrlew-sqlite";

/// Converts sqlite errors to io errors
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Query(err.to_string())
    }
}

/// An in-memory SQLite database
#[derive(Debug)]
pub struct Database {
    name: String,
    datasets: Vec<Dataset>,
    connection: Connection,
}

impl DatabaseTrait for Database {
    fn new(name: String, datasets: Vec<Dataset>) -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Database {
            name,
            datasets: vec![],
            connection,
        }
        .with_datasets(datasets)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    fn datasets_mut(&mut self) -> &mut Vec<Dataset> {
        &mut self.datasets
    }

    fn create_table(&mut self, dataset: &Dataset) -> Result<usize> {
        Ok(self.connection.execute(&dataset.create(), ())?)
    }

    fn insert_data(&mut self, dataset: &Dataset) -> Result<()> {
        let transaction = self.connection.transaction()?;
        {
            let mut statement = transaction.prepare(&dataset.insert('?'))?;
            for row in dataset.rows() {
                statement.execute(params_from_iter(row.iter()))?;
            }
        }
        transaction.commit()?;
        Ok(())
    }

    fn query(&mut self, query: &str) -> Result<ResultSet> {
        let mut statement = self.connection.prepare(query)?;
        let columns = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        let rows: result::Result<Vec<Vec<Value>>, rusqlite::Error> = statement
            .query_map([], |row| {
                (0..row.as_ref().column_count())
                    .map(|i| row.get(i))
                    .collect()
            })?
            .collect();
        Ok(ResultSet::new(columns, rows?))
    }
}

/// Implement the conversion of a Value to ToSqlOutput
impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Null.to_sql(),
            Value::Boolean(b) => b.to_sql(),
            Value::Integer(i) => i.to_sql(),
            Value::Float(f) => f.to_sql(),
            Value::Text(t) => t.to_sql(),
        }
    }
}

/// Read sql results as value
impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::null(),
            ValueRef::Integer(i) => Value::integer(i),
            ValueRef::Real(f) => Value::float(f),
            ValueRef::Text(s) => Value::text(String::from_utf8_lossy(s)),
            ValueRef::Blob(b) => Value::text(String::from_utf8_lossy(b)),
        })
    }
}

pub fn test_database() -> Database {
    Database::new(DB.into(), Database::test_datasets()).expect("Database")
}
