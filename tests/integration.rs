use colored::Colorize;
use itertools::Itertools;
use qrlew_private_reader::{
    io::{self, memory, Database, ExactReader},
    private_reader::{Error, PrivateReader},
    metadata::{Column, Metadata, Table},
    setup, Ready, ResultSet, Value,
};
#[cfg(feature = "sqlite")]
use qrlew_private_reader::io::sqlite;
use rand::{rngs::StdRng, SeedableRng};
use statrs::statistics::Statistics;

const RUNS: usize = 200;

const QUERIES: &[&str] = &[
    "SELECT married, COUNT(pid) AS n FROM T GROUP BY married",
    "SELECT COUNT(*) AS n, SUM(age) AS s FROM T",
    "SELECT city, COUNT(*), SUM(income), MIN(age), MAX(age) FROM T GROUP BY city",
    "SELECT city, married, AVG(age) AS a FROM T WHERE income > 50000 GROUP BY city, married",
    "SELECT t.married, SUM(t.income) AS s FROM T AS t GROUP BY t.married ORDER BY married",
];

/// Display the exact and the private result of a query
fn test_private_eq<R: ExactReader>(reader: &PrivateReader<R>, exact: &ResultSet, private: &ResultSet, query: &str) {
    println!(
        "{}\n{}\n{}\n{}",
        query.red(),
        exact.iter().map(|row| row.iter().join(", ")).join("\n"),
        format!("private ε={}", reader.parameters().epsilon()).yellow(),
        private.iter().map(|row| row.iter().join(", ")).join("\n"),
    );
    assert_eq!(exact.columns(), private.columns());
    assert_eq!(exact.len(), private.len());
}

fn private_reader(epsilon: f64) -> PrivateReader<memory::Database> {
    let database = memory::test_database();
    let metadata = database.metadata().unwrap();
    PrivateReader::new(database, metadata, epsilon).unwrap()
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        value => panic!("numeric value expected, got {value}"),
    }
}

#[test]
fn test_queries() {
    setup::try_init();
    let mut database = memory::test_database();
    let mut reader = private_reader(1.);
    for query in QUERIES {
        let exact = database.query(query).unwrap();
        let private = reader.execute(query, None).unwrap();
        test_private_eq(&reader, &exact, &private, query);
    }
}

#[test]
fn test_grouping_keys_are_kept() {
    let mut database = memory::test_database();
    let mut reader = private_reader(1.);
    let query = "SELECT married, COUNT(pid) AS n FROM T GROUP BY married";
    let exact = database.query(query).unwrap();
    let private = reader.execute(query, None).unwrap();
    test_private_eq(&reader, &exact, &private, query);
    assert_eq!(private.columns(), &["married".to_string(), "n".to_string()]);
    assert_eq!(exact.column("married"), private.column("married"));
    for (e, p) in exact.iter().zip(private.iter()) {
        // A few hundred standard deviations away would be a bug
        assert!((as_f64(&e[1]) - as_f64(&p[1])).abs() < 300.);
    }
}

/// Smaller budgets give noisier counts
#[test]
fn test_variance_decreases_with_epsilon() {
    let mut database = memory::test_database();
    let query = "SELECT married, COUNT(pid) AS n FROM T GROUP BY married";
    let exact = database.query(query).unwrap();
    let mut rng = StdRng::seed_from_u64(1234);
    let variances = [0.1, 1., 4.]
        .into_iter()
        .map(|epsilon| {
            let mut reader = private_reader(epsilon);
            let errors = (0..RUNS)
                .map(|_| {
                    let private = reader.execute_with_rng(query, None, &mut rng).unwrap();
                    assert_eq!(private.column("married"), exact.column("married"));
                    as_f64(&private[0][1]) - as_f64(&exact[0][1])
                })
                .collect::<Vec<f64>>();
            let variance = errors.variance();
            println!("ε={epsilon} variance={variance}");
            variance
        })
        .collect::<Vec<f64>>();
    assert!(variances[0] > variances[1]);
    assert!(variances[1] > variances[2]);
    // Laplace variance of a count at ε=0.1 is 200
    assert!(variances[0] > 100. && variances[0] < 400.);
}

/// Each call draws fresh noise on the same groups
#[test]
fn test_repeated_executions_differ() {
    let mut reader = private_reader(1.);
    let query = "SELECT married, COUNT(pid) AS n FROM T GROUP BY married";
    let results = (0..10)
        .map(|_| reader.execute(query, None).unwrap())
        .collect::<Vec<ResultSet>>();
    for result in &results {
        assert_eq!(result.columns(), results[0].columns());
        assert_eq!(result.column("married"), results[0].column("married"));
    }
    let counts = results
        .iter()
        .map(|result| result[0][1].clone())
        .unique()
        .count();
    assert!(counts > 1);
}

/// The census table declared with other contribution bounds
fn census_metadata(max_ids: usize, row_privacy: bool) -> Metadata {
    let pid = if row_privacy {
        Column::unbounded("pid").not_null()
    } else {
        Column::unbounded("pid").with_private_id().not_null()
    };
    Metadata::from(
        Table::builder()
            .name("T")
            .size(1000)
            .max_ids(max_ids)
            .row_privacy(row_privacy)
            .columns([
                pid,
                Column::integer("age", 0, 100),
                Column::float("income", 0., 500000.),
                Column::boolean("married"),
                Column::categorical("city", 3),
            ])
            .build(),
    )
}

/// More rows per individual means more noise
#[test]
fn test_contribution_bounds() {
    let query = "SELECT married, COUNT(*) AS n, SUM(age) AS s FROM T GROUP BY married";
    let mut rng = StdRng::seed_from_u64(1234);
    let variances = [(1, true), (1, false), (2, false)]
        .into_iter()
        .map(|(max_ids, row_privacy)| {
            let mut reader =
                PrivateReader::new(memory::test_database(), census_metadata(max_ids, row_privacy), 1.)
                    .unwrap();
            let counts = (0..RUNS)
                .map(|_| {
                    let result = reader.execute_with_rng(query, None, &mut rng).unwrap();
                    assert_eq!(result.columns(), &["married".to_string(), "n".to_string(), "s".to_string()]);
                    as_f64(&result[0][1])
                })
                .collect::<Vec<f64>>();
            let variance = counts.variance();
            println!("max_ids={max_ids} row_privacy={row_privacy} variance={variance}");
            variance
        })
        .collect::<Vec<f64>>();
    // Counts get ε/2: the variance is 8 for one row per individual, 32 for two
    assert!(variances[0] > 4. && variances[0] < 16.);
    assert!(variances[1] > 4. && variances[1] < 16.);
    assert!(variances[2] > 2. * variances[1]);
}

#[test]
fn test_mean_stays_in_range() {
    let mut reader = private_reader(0.5);
    let mut rng = StdRng::seed_from_u64(1234);
    for _ in 0..20 {
        let result = reader
            .execute_with_rng("SELECT city, AVG(age) AS a FROM T GROUP BY city", None, &mut rng)
            .unwrap();
        assert_eq!(result.columns(), &["city".to_string(), "a".to_string()]);
        for a in result.column("a").unwrap() {
            let a = as_f64(a);
            assert!((0. ..=100.).contains(&a));
        }
    }
}

#[test]
fn test_budget_override() {
    let mut reader = private_reader(1.);
    let result = reader
        .private_query("SELECT COUNT(*) AS n, SUM(age) AS s FROM T", Some(3.))
        .unwrap();
    println!("{}", result.dp_event());
    assert!((result.dp_event().epsilon() - 3.).abs() < 1e-9);
    assert_eq!(reader.parameters().epsilon(), 1.);
}

/// Counts the queries reaching the exact reader
struct CountingReader {
    database: memory::Database,
    executions: usize,
}

impl ExactReader for CountingReader {
    fn execute(&mut self, query: &str) -> io::Result<ResultSet> {
        self.executions += 1;
        self.database.query(query)
    }
}

#[test]
fn test_rejected_queries_are_not_executed() {
    let database = memory::test_database();
    let metadata = database.metadata().unwrap();
    let mut reader = PrivateReader::new(
        CountingReader {
            database,
            executions: 0,
        },
        metadata,
        1.,
    )
    .unwrap();
    for query in [
        "SELECT COUNT(*) FROM (SELECT * FROM T) AS s",
        "SELECT age FROM T",
        "SELECT COUNT(*) FROM T JOIN T AS u ON T.pid = u.pid",
        "SELECT MEDIAN(age) FROM T",
        "SELECT COUNT(*) FROM T; SELECT COUNT(*) FROM T",
        "SELECT COUNT(DISTINCT city) FROM T",
        "SELECT married, COUNT(*) FROM T GROUP BY married HAVING COUNT(*) > 10",
        "SELECT COUNT(*) FROM U",
    ] {
        assert!(
            matches!(reader.execute(query, None), Err(Error::UnsupportedQuery(_))),
            "{query}"
        );
    }
    assert!(matches!(
        reader.execute("SELECT SUM(pid) FROM T", None),
        Err(Error::MissingRange(_))
    ));
    assert!(matches!(
        reader.execute("SELECT COUNT(*) FROM T", Some(0.)),
        Err(Error::InvalidBudget(_))
    ));
    assert!(matches!(
        reader.execute("SELECT COUNT(*) FROM T", Some(-1.)),
        Err(Error::InvalidBudget(_))
    ));
    assert_eq!(reader.reader().executions, 0);
    reader.execute("SELECT COUNT(*) FROM T", None).unwrap();
    assert_eq!(reader.into_reader().executions, 1);
}

/// Always fails
struct FailingReader;

impl ExactReader for FailingReader {
    fn execute(&mut self, _query: &str) -> io::Result<ResultSet> {
        Err(io::Error::query("connection reset"))
    }
}

#[test]
fn test_execution_errors_are_propagated() {
    let metadata = memory::test_database().metadata().unwrap();
    let mut reader = PrivateReader::new(FailingReader, metadata, 1.).unwrap();
    assert_eq!(
        reader.execute("SELECT COUNT(*) FROM T", None),
        Err(Error::Execution(io::Error::query("connection reset")))
    );
}

/// Returns a constant result whatever the query
struct ConstantReader(ResultSet);

impl ExactReader for ConstantReader {
    fn execute(&mut self, _query: &str) -> io::Result<ResultSet> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_unexpected_results() {
    let metadata = memory::test_database().metadata().unwrap();
    let mut reader = PrivateReader::new(
        ConstantReader(ResultSet::new(
            vec!["a".into(), "b".into()],
            vec![vec![Value::integer(1), Value::integer(2)]],
        )),
        metadata.clone(),
        1.,
    )
    .unwrap();
    assert!(matches!(
        reader.execute("SELECT COUNT(*) FROM T", None),
        Err(Error::UnexpectedResult(_))
    ));
    let mut reader = PrivateReader::new(
        ConstantReader(ResultSet::new(
            vec!["n".into()],
            vec![vec![Value::text("many")]],
        )),
        metadata,
        1.,
    )
    .unwrap();
    assert!(matches!(
        reader.execute("SELECT COUNT(*) AS n FROM T", None),
        Err(Error::UnexpectedResult(_))
    ));
}

#[cfg(feature = "sqlite")]
#[test]
fn test_on_sqlite() {
    let mut database = sqlite::test_database();
    let metadata = database.metadata().unwrap();
    let exact = database
        .query("SELECT city, COUNT(*) AS n, AVG(income) AS m FROM T GROUP BY city ORDER BY city")
        .unwrap();
    let mut reader = PrivateReader::new(database, metadata, 1.).unwrap();
    for query in QUERIES {
        let private = reader.execute(query, None).unwrap();
        println!("{}\n{}", query.red(), private);
    }
    let private = reader
        .execute(
            "SELECT city, COUNT(*) AS n, AVG(income) AS m FROM T GROUP BY city ORDER BY city",
            None,
        )
        .unwrap();
    assert_eq!(exact.columns(), private.columns());
    assert_eq!(exact.column("city"), private.column("city"));
}
