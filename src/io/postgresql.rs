//! A Postgresql database reached through a connection pool
//!
//! A postgresql instance must exist, e.g.
//! `docker run --name qrlew-test -p 5432:5432 -e POSTGRES_PASSWORD=qrlew-test -e POSTGRES_DB=qrlew-test -d postgres`
//! Connection settings are read from `POSTGRES_HOST`, `POSTGRES_PORT`,
//! `POSTGRES_USER`, `POSTGRES_PASSWORD` and `POSTGRES_DB`.
//!

use super::{Database as DatabaseTrait, Dataset, Error, Result};
use crate::{
    data_type::{DataType, Value},
    result_set::ResultSet,
};
use colored::Colorize;
use postgres::types::{FromSql, IsNull, ToSql, Type};
use r2d2::Pool;
use r2d2_postgres::{postgres::NoTls, PostgresConnectionManager};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use std::{env, fmt, str::FromStr};

const DB: &str = "qrlew-test";
const HOST: &str = "localhost";
const PORT: u16 = 5432;
const USER: &str = "postgres";
const PASSWORD: &str = "qrlew-test";

/// Converts postgres errors to io errors
impl From<postgres::Error> for Error {
    fn from(err: postgres::Error) -> Self {
        Error::Query(err.to_string())
    }
}

pub struct Database {
    name: String,
    datasets: Vec<Dataset>,
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl Database {
    fn db() -> String {
        env::var("POSTGRES_DB").unwrap_or(DB.into())
    }

    fn host() -> String {
        env::var("POSTGRES_HOST").unwrap_or(HOST.into())
    }

    fn port() -> u16 {
        match env::var("POSTGRES_PORT") {
            Ok(port) => u16::from_str(&port).unwrap_or(PORT),
            Err(_) => PORT,
        }
    }

    fn user() -> String {
        env::var("POSTGRES_USER").unwrap_or(USER.into())
    }

    fn password() -> String {
        env::var("POSTGRES_PASSWORD").unwrap_or(PASSWORD.into())
    }

    fn build_pool() -> Result<Pool<PostgresConnectionManager<NoTls>>> {
        let mut config = postgres::Config::new();
        config
            .host(&Database::host())
            .port(Database::port())
            .user(&Database::user())
            .password(Database::password())
            .dbname(&Database::db());
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = r2d2::Pool::builder().max_size(10).build(manager)?;
        log::info!(
            "{}",
            format!(
                "Connected to postgresql://{}:{}/{}",
                Database::host(),
                Database::port(),
                Database::db()
            )
            .green()
        );
        Ok(pool)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("datasets", &self.datasets)
            .finish()
    }
}

impl DatabaseTrait for Database {
    fn new(name: String, datasets: Vec<Dataset>) -> Result<Self> {
        Database {
            name,
            datasets: vec![],
            pool: Database::build_pool()?,
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

    /// Tables are recreated from scratch
    fn create_table(&mut self, dataset: &Dataset) -> Result<usize> {
        let mut client = self.pool.get()?;
        client.execute(&format!("DROP TABLE IF EXISTS {}", dataset.name()), &[])?;
        Ok(client.execute(&dataset.create(), &[])? as usize)
    }

    fn insert_data(&mut self, dataset: &Dataset) -> Result<()> {
        let mut client = self.pool.get()?;
        let mut transaction = client.transaction()?;
        let statement = transaction.prepare(&dataset.insert('$'))?;
        let data_types: Vec<DataType> = dataset.table().iter().map(|c| c.data_type()).collect();
        for row in dataset.rows() {
            let values = row
                .iter()
                .zip(&data_types)
                .map(|(value, data_type)| SqlValue::new(value, *data_type))
                .collect::<Result<Vec<SqlValue>>>()?;
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            transaction.execute(&statement, &params)?;
        }
        transaction.commit()?;
        Ok(())
    }

    fn query(&mut self, query: &str) -> Result<ResultSet> {
        let mut client = self.pool.get()?;
        let statement = client.prepare(query)?;
        let columns = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        let rows = client
            .query(&statement, &[])?
            .into_iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row.try_get::<_, SqlValue>(i).map(Value::from))
                    .collect::<std::result::Result<Vec<Value>, _>>()
            })
            .collect::<std::result::Result<Vec<Vec<Value>>, _>>()?;
        Ok(ResultSet::new(columns, rows))
    }
}

/// Values as exchanged with postgresql
#[derive(Debug, Clone)]
enum SqlValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Integers are inserted as floats in float columns
    fn new(value: &Value, data_type: DataType) -> Result<Self> {
        match (value, data_type) {
            (Value::Null, _) => Ok(SqlValue::Null),
            (Value::Integer(i), DataType::Float | DataType::Unbounded) => {
                Ok(SqlValue::Float(*i as f64))
            }
            (Value::Boolean(b), _) => Ok(SqlValue::Boolean(*b)),
            (Value::Integer(i), _) => Ok(SqlValue::Integer(*i)),
            (Value::Float(f), _) => Ok(SqlValue::Float(*f)),
            (Value::Text(t), _) => Ok(SqlValue::Text(t.clone())),
        }
    }
}

impl From<SqlValue> for Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Value::Null,
            SqlValue::Boolean(b) => Value::Boolean(b),
            SqlValue::Integer(i) => Value::Integer(i),
            SqlValue::Float(f) => Value::Float(f),
            SqlValue::Text(t) => Value::Text(t),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut postgres::types::private::BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>>
    where
        Self: Sized,
    {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Boolean(b) => b.to_sql(ty, out),
            SqlValue::Integer(i) => i.to_sql(ty, out),
            SqlValue::Float(f) => f.to_sql(ty, out),
            SqlValue::Text(t) => t.to_sql(ty, out),
        }
    }

    postgres::types::accepts!(BOOL, INT8, FLOAT8, VARCHAR, TEXT);

    postgres::types::to_sql_checked!();
}

impl<'a> FromSql<'a> for SqlValue {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        match ty {
            &Type::BOOL => bool::from_sql(ty, raw).map(SqlValue::Boolean),
            &Type::INT2 => i16::from_sql(ty, raw).map(|i| SqlValue::Integer(i as i64)),
            &Type::INT4 => i32::from_sql(ty, raw).map(|i| SqlValue::Integer(i as i64)),
            &Type::INT8 => i64::from_sql(ty, raw).map(SqlValue::Integer),
            &Type::FLOAT4 => f32::from_sql(ty, raw).map(|f| SqlValue::Float(f as f64)),
            &Type::FLOAT8 => f64::from_sql(ty, raw).map(SqlValue::Float),
            // SUM over integers is a NUMERIC of scale 0
            &Type::NUMERIC => Decimal::from_sql(ty, raw).map(|d| match d.to_i64() {
                Some(i) if d.scale() == 0 => SqlValue::Integer(i),
                _ => SqlValue::Float(d.to_f64().unwrap_or_default()),
            }),
            _ => String::from_sql(ty, raw).map(SqlValue::Text),
        }
    }

    fn from_sql_null(
        _ty: &Type,
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(SqlValue::Null)
    }

    postgres::types::accepts!(
        BOOL, INT2, INT4, INT8, FLOAT4, FLOAT8, NUMERIC, VARCHAR, TEXT, BPCHAR, NAME
    );
}

pub fn test_database() -> Database {
    Database::new(DB.into(), Database::test_datasets()).expect("Database")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory;

    #[ignore]
    #[test]
    fn database_display() -> Result<()> {
        let mut database = test_database();
        for query in [
            "SELECT married, COUNT(pid) AS n FROM T GROUP BY married",
            "SELECT city, SUM(age), AVG(income) FROM T GROUP BY city",
            "SELECT * FROM T LIMIT 5",
        ] {
            println!("\n{query}");
            println!("{}", database.query(query)?);
        }
        Ok(())
    }

    #[ignore]
    #[test]
    fn database_test() -> Result<()> {
        let mut database = test_database();
        let query = "SELECT married, COUNT(pid) AS n, SUM(age) AS s FROM T GROUP BY married ORDER BY married";
        let result = database.query(query)?;
        assert_eq!(result.columns(), &["married".to_string(), "n".to_string(), "s".to_string()]);
        assert_eq!(result.rows(), memory::test_database().query(query)?.rows());
        Ok(())
    }
}
