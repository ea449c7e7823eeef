//! Run a few private queries on the census test table, e.g.
//! `cargo run --example census` or `cargo run --example census --features sqlite -- sqlite`

use qrlew_private_reader::{
    io::{memory, Database, ExactReader},
    setup, PrivateReader,
};

const QUERIES: &[&str] = &[
    "SELECT married, COUNT(pid) AS n FROM T GROUP BY married",
    "SELECT city, COUNT(*) AS n, AVG(income) AS mean_income FROM T GROUP BY city ORDER BY city",
    "SELECT MIN(age), MAX(age), SUM(age) FROM T WHERE married",
];

fn run<R: ExactReader>(reader: &mut PrivateReader<R>) {
    for epsilon in [0.1, 1., 10.] {
        for query in QUERIES {
            println!("{query} (ε={epsilon})");
            match reader.private_query(query, Some(epsilon)) {
                Ok(result) => println!("{}\n{}\n", result.result_set(), result.dp_event()),
                Err(err) => println!("{err}\n"),
            }
        }
    }
}

fn main() {
    setup::init();
    let backend = std::env::args().nth(1).unwrap_or_else(|| "memory".to_string());
    match backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let database = qrlew_private_reader::io::sqlite::test_database();
            let metadata = database.metadata().unwrap();
            run(&mut PrivateReader::new(database, metadata, 1.).unwrap());
        }
        "postgresql" => {
            let database = qrlew_private_reader::io::postgresql::test_database();
            let metadata = database.metadata().unwrap();
            run(&mut PrivateReader::new(database, metadata, 1.).unwrap());
        }
        _ => {
            let database = memory::test_database();
            let metadata = database.metadata().unwrap();
            run(&mut PrivateReader::new(database, metadata, 1.).unwrap());
        }
    }
}
