//! # Differentially private SQL reader (by [Sarus](https://www.sarus.tech/))
//! A query layer answering SQL aggregate queries with differential privacy
//!
//! ## What does it do?
//! A [PrivateReader] sits between a SQL client and any data source able to run
//! plain SQL (an [io::ExactReader]). Given [Metadata] declaring the range of each
//! column and a privacy budget epsilon, it:
//! - checks the query is an aggregation it can release (one table, grouping keys,
//!   COUNT, SUM, AVG, MIN, MAX),
//! - computes the sensitivity of each aggregate,
//! - runs the exact query on the data source,
//! - adds Laplace noise calibrated on the sensitivities and the budget.
//!
//! The private result has the same columns, rows and grouping keys as the exact one.
//!
//! ```
//! use qrlew_private_reader::{io::{memory, Database}, PrivateReader};
//!
//! let database = memory::test_database();
//! let metadata = database.metadata().unwrap();
//! let mut reader = PrivateReader::new(database, metadata, 1.0).unwrap();
//! let result = reader
//!     .execute("SELECT married, COUNT(pid) AS n FROM T GROUP BY married", None)
//!     .unwrap();
//! assert_eq!(result.len(), 2);
//! ```
//!

pub mod builder;
pub mod data_type;
pub mod differential_privacy;
pub mod expr;
pub mod io;
pub mod metadata;
pub mod private_reader;
pub mod result_set;
pub mod setup;
pub mod sql;

pub use builder::{Ready, With, WithIterator};
pub use data_type::{value::Value, DataType};
pub use metadata::{Column, Metadata, Table};
pub use private_reader::{DpResultSet, PrivateReader};
pub use result_set::ResultSet;
/// Expose sqlparser::ast as part of the crate
pub use sqlparser::{ast, dialect, parser};
