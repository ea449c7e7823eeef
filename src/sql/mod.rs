//! # SQL parsing and query analysis
//!
//! This module contains everything needed to parse a SQL query, check it is an
//! aggregation a private reader can release, and describe it.
//!

pub mod query;
pub mod reader;
pub mod rewriting;

use std::{convert::Infallible, error, fmt, result};

use sqlparser::parser::ParserError;

// Error management

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParsingError(String),
    UnsupportedQuery(String),
    Other(String),
}

impl Error {
    pub fn parsing_error(input: impl fmt::Display) -> Error {
        Error::ParsingError(format!("Cannot parse {}", input))
    }
    pub fn unsupported_query(desc: impl fmt::Display) -> Error {
        Error::UnsupportedQuery(desc.to_string())
    }
    pub fn other<T: fmt::Display>(desc: T) -> Error {
        Error::Other(desc.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ParsingError(input) => write!(f, "ParsingError: {}", input),
            Error::UnsupportedQuery(desc) => write!(f, "UnsupportedQuery: {}", desc),
            Error::Other(err) => write!(f, "{}", err),
        }
    }
}

impl error::Error for Error {}

impl From<Infallible> for Error {
    fn from(err: Infallible) -> Self {
        Error::Other(err.to_string())
    }
}
impl From<ParserError> for Error {
    fn from(err: ParserError) -> Self {
        Error::ParsingError(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;

// Import a few functions
pub use query::{classify, OutputColumn, QueryDescriptor, QueryShape};
pub use reader::{parse, parse_with_dialect};
