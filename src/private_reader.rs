//! # Private reader
//!
//! A [PrivateReader] wraps an [ExactReader] and answers aggregate SQL queries
//! with Laplace noise calibrated on the declared [Metadata] and a privacy budget.
//!
//! Small true counts may come out negative or null after noise, unless
//! `clamp_counts` is set in the [DpParameters].
//!

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{error, fmt, ops::Deref, result};

use crate::{
    builder::Ready,
    differential_privacy::{self, DpEvent, DpParameters, NoisePlan},
    io::{self, ExactReader},
    metadata::{self, Metadata},
    result_set::ResultSet,
    sql,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    UnsupportedQuery(String),
    MissingRange(String),
    InvalidBudget(String),
    InvalidMetadata(String),
    /// The exact reader returned a result not matching the query
    UnexpectedResult(String),
    /// The exact reader failed
    Execution(io::Error),
    Other(String),
}

impl Error {
    pub fn unsupported_query(desc: impl fmt::Display) -> Error {
        Error::UnsupportedQuery(desc.to_string())
    }
    pub fn invalid_budget(desc: impl fmt::Display) -> Error {
        Error::InvalidBudget(desc.to_string())
    }
    pub fn invalid_metadata(desc: impl fmt::Display) -> Error {
        Error::InvalidMetadata(desc.to_string())
    }
    pub fn unexpected_result(desc: impl fmt::Display) -> Error {
        Error::UnexpectedResult(desc.to_string())
    }
    pub fn other(desc: impl fmt::Display) -> Error {
        Error::Other(desc.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedQuery(desc) => write!(f, "UnsupportedQuery: {}", desc),
            Error::MissingRange(desc) => write!(f, "MissingRange: {}", desc),
            Error::InvalidBudget(desc) => write!(f, "InvalidBudget: {}", desc),
            Error::InvalidMetadata(desc) => write!(f, "InvalidMetadata: {}", desc),
            Error::UnexpectedResult(desc) => write!(f, "UnexpectedResult: {}", desc),
            Error::Execution(err) => write!(f, "Execution: {}", err),
            Error::Other(desc) => write!(f, "{}", desc),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Execution(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sql::Error> for Error {
    fn from(err: sql::Error) -> Self {
        match err {
            sql::Error::ParsingError(desc) | sql::Error::UnsupportedQuery(desc) => {
                Error::UnsupportedQuery(desc)
            }
            sql::Error::Other(desc) => Error::Other(desc),
        }
    }
}
impl From<metadata::Error> for Error {
    fn from(err: metadata::Error) -> Self {
        Error::InvalidMetadata(err.to_string())
    }
}
impl From<differential_privacy::Error> for Error {
    fn from(err: differential_privacy::Error) -> Self {
        match err {
            differential_privacy::Error::MissingRange(desc) => Error::MissingRange(desc),
            differential_privacy::Error::InvalidBudget(desc) => Error::InvalidBudget(desc),
            differential_privacy::Error::Other(desc) => Error::Other(desc),
        }
    }
}
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Execution(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// A private result with the privacy event it results from
#[derive(Clone, Debug, PartialEq)]
pub struct DpResultSet {
    result_set: ResultSet,
    dp_event: DpEvent,
}

impl DpResultSet {
    pub fn new(result_set: ResultSet, dp_event: DpEvent) -> Self {
        DpResultSet {
            result_set,
            dp_event,
        }
    }

    pub fn result_set(&self) -> &ResultSet {
        &self.result_set
    }

    pub fn dp_event(&self) -> &DpEvent {
        &self.dp_event
    }
}

impl Deref for DpResultSet {
    type Target = ResultSet;

    fn deref(&self) -> &Self::Target {
        &self.result_set
    }
}

impl From<DpResultSet> for ResultSet {
    fn from(value: DpResultSet) -> Self {
        value.result_set
    }
}

impl From<DpResultSet> for (ResultSet, DpEvent) {
    fn from(value: DpResultSet) -> Self {
        (value.result_set, value.dp_event)
    }
}

/// Answer aggregate queries with differential privacy
#[derive(Debug)]
pub struct PrivateReader<R: ExactReader> {
    reader: R,
    metadata: Metadata,
    parameters: DpParameters,
}

impl<R: ExactReader> PrivateReader<R> {
    /// A reader spending `epsilon` per query unless told otherwise
    pub fn new(reader: R, metadata: Metadata, epsilon: f64) -> Result<Self> {
        PrivateReader::with_parameters(reader, metadata, DpParameters::from_epsilon(epsilon))
    }

    pub fn with_parameters(reader: R, metadata: Metadata, parameters: DpParameters) -> Result<Self> {
        parameters.budget()?;
        Ok(PrivateReader {
            reader,
            metadata,
            parameters,
        })
    }

    pub fn builder() -> PrivateReaderBuilder<R> {
        PrivateReaderBuilder::new()
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn parameters(&self) -> &DpParameters {
        &self.parameters
    }

    pub fn into_reader(self) -> R {
        self.reader
    }

    /// Run an aggregate query privately.
    /// `epsilon` overrides the default budget for this call.
    /// Each call draws fresh noise.
    pub fn execute(&mut self, query: &str, epsilon: Option<f64>) -> Result<ResultSet> {
        let mut rng = StdRng::from_entropy();
        self.execute_with_rng(query, epsilon, &mut rng)
    }

    /// Run an aggregate query privately, drawing noise from `rng`
    pub fn execute_with_rng<G: Rng + ?Sized>(
        &mut self,
        query: &str,
        epsilon: Option<f64>,
        rng: &mut G,
    ) -> Result<ResultSet> {
        Ok(self.private_query_with_rng(query, epsilon, rng)?.into())
    }

    /// Run an aggregate query privately and report the mechanisms applied
    pub fn private_query(&mut self, query: &str, epsilon: Option<f64>) -> Result<DpResultSet> {
        let mut rng = StdRng::from_entropy();
        self.private_query_with_rng(query, epsilon, &mut rng)
    }

    pub fn private_query_with_rng<G: Rng + ?Sized>(
        &mut self,
        query: &str,
        epsilon: Option<f64>,
        rng: &mut G,
    ) -> Result<DpResultSet> {
        let parameters = match epsilon {
            Some(epsilon) => self.parameters.clone().with_epsilon(epsilon),
            None => self.parameters.clone(),
        };
        parameters.budget()?;
        let descriptor = sql::classify(query, &self.metadata)?;
        let table = self.metadata.describe(descriptor.table())?;
        let plan = NoisePlan::new(&descriptor, table, &parameters)?;
        log::debug!("Exact query: {}", descriptor.exact_query());
        let exact = self.reader.execute(descriptor.exact_query())?;
        if exact.columns().len() != plan.exact_width() {
            return Err(Error::unexpected_result(format!(
                "{} columns were returned for {}, {} were expected",
                exact.columns().len(),
                descriptor.exact_query(),
                plan.exact_width()
            )));
        }
        let rows = exact
            .iter()
            .map(|row| plan.privatize_row(row, &mut *rng))
            .collect::<differential_privacy::Result<Vec<_>>>()
            .map_err(|err| match err {
                differential_privacy::Error::Other(desc) => Error::UnexpectedResult(desc),
                err => err.into(),
            })?;
        let columns = descriptor
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        log::info!(
            "Released {} rows of {} spending ε={}",
            exact.len(),
            descriptor.table(),
            plan.epsilon()
        );
        Ok(DpResultSet::new(
            ResultSet::new(columns, rows),
            plan.dp_event(),
        ))
    }
}

/// A builder for [PrivateReader]
#[derive(Debug)]
pub struct PrivateReaderBuilder<R: ExactReader> {
    reader: Option<R>,
    metadata: Option<Metadata>,
    epsilon: Option<f64>,
    parameters: DpParameters,
}

impl<R: ExactReader> PrivateReaderBuilder<R> {
    pub fn new() -> Self {
        PrivateReaderBuilder {
            reader: None,
            metadata: None,
            epsilon: None,
            parameters: DpParameters::default(),
        }
    }

    pub fn reader(mut self, reader: R) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = Some(epsilon);
        self
    }

    pub fn clamp_counts(mut self, clamp_counts: bool) -> Self {
        self.parameters = self.parameters.with_clamp_counts(clamp_counts);
        self
    }

    pub fn avg_sum_share(mut self, avg_sum_share: f64) -> Self {
        self.parameters = self.parameters.with_avg_sum_share(avg_sum_share);
        self
    }

    /// Set all the parameters, epsilon included
    pub fn parameters(mut self, parameters: DpParameters) -> Self {
        self.epsilon = Some(parameters.epsilon());
        self.parameters = parameters;
        self
    }
}

impl<R: ExactReader> Default for PrivateReaderBuilder<R> {
    fn default() -> Self {
        PrivateReaderBuilder::new()
    }
}

impl<R: ExactReader> Ready<PrivateReader<R>> for PrivateReaderBuilder<R> {
    type Error = Error;

    fn try_build(self) -> Result<PrivateReader<R>> {
        let reader = self
            .reader
            .ok_or_else(|| Error::other("a private reader needs an exact reader"))?;
        let metadata = self
            .metadata
            .ok_or_else(|| Error::invalid_metadata("a private reader needs metadata"))?;
        let epsilon = self
            .epsilon
            .ok_or_else(|| Error::invalid_budget("a private reader needs a default epsilon"))?;
        PrivateReader::with_parameters(reader, metadata, self.parameters.with_epsilon(epsilon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_type::Value,
        io::{memory, Database},
    };

    fn private_reader(epsilon: f64) -> PrivateReader<memory::Database> {
        let database = memory::test_database();
        let metadata = database.metadata().unwrap();
        PrivateReader::new(database, metadata, epsilon).unwrap()
    }

    #[test]
    fn test_execute() -> Result<()> {
        crate::setup::try_init();
        let mut reader = private_reader(1.);
        let mut rng = StdRng::seed_from_u64(1234);
        let query = "SELECT married, COUNT(pid) AS n FROM T GROUP BY married";
        let result = reader.execute_with_rng(query, None, &mut rng)?;
        println!("{result}");
        assert_eq!(result.columns(), &["married".to_string(), "n".to_string()]);
        assert_eq!(
            result.column("married").unwrap(),
            vec![&Value::boolean(false), &Value::boolean(true)]
        );
        let Value::Integer(n) = result[0][1] else {
            panic!("integer count expected")
        };
        assert!((n - 451).abs() < 50);
        // Same seed, same result
        let mut rng = StdRng::seed_from_u64(1234);
        assert_eq!(reader.execute_with_rng(query, None, &mut rng)?, result);
        Ok(())
    }

    #[test]
    fn test_private_query() -> Result<()> {
        let mut reader = private_reader(2.);
        let result = reader.private_query(
            "SELECT city, AVG(income) AS m, COUNT(*) AS n FROM T GROUP BY city",
            Some(1.),
        )?;
        println!("{}\n{}", result.result_set(), result.dp_event());
        assert_eq!(result.len(), 3);
        assert!((result.dp_event().epsilon() - 1.).abs() < 1e-9);
        assert!(result
            .column("m")
            .unwrap()
            .iter()
            .all(|m| **m >= Value::float(0.) && **m <= Value::float(500000.)));
        Ok(())
    }

    #[test]
    fn test_errors() {
        let mut reader = private_reader(1.);
        assert!(matches!(
            reader.execute("SELECT COUNT(*) FROM T", Some(0.)),
            Err(Error::InvalidBudget(_))
        ));
        assert!(matches!(
            reader.execute("SELECT SUM(pid) FROM T", None),
            Err(Error::MissingRange(_))
        ));
        assert!(matches!(
            reader.execute("SELECT * FROM T", None),
            Err(Error::UnsupportedQuery(_))
        ));
        assert!(matches!(
            reader.execute("SELEC COUNT(*) FROM T", None),
            Err(Error::UnsupportedQuery(_))
        ));
        assert!(matches!(
            PrivateReader::new(memory::test_database(), Metadata::default(), -1.),
            Err(Error::InvalidBudget(_))
        ));
    }

    #[test]
    fn test_builder() -> Result<()> {
        let database = memory::test_database();
        let metadata = database.metadata()?;
        let mut reader = PrivateReader::builder()
            .reader(database)
            .metadata(metadata.clone())
            .epsilon(1.)
            .clamp_counts(true)
            .try_build()?;
        assert!(reader.parameters().clamp_counts());
        let result = reader.execute("SELECT COUNT(*) AS n FROM T WHERE age > 200", Some(0.01))?;
        assert!(result[0][0] >= Value::integer(0));
        assert!(matches!(
            PrivateReader::builder()
                .reader(memory::test_database())
                .metadata(metadata)
                .try_build(),
            Err(Error::InvalidBudget(_))
        ));
        Ok(())
    }
}
