use super::{Error, Result};
use sqlparser::{
    ast::Statement,
    dialect::{Dialect, GenericDialect},
    parser::Parser,
};

/// Parse a query made of exactly one statement
pub fn parse(query: &str) -> Result<Statement> {
    parse_with_dialect(query, &GenericDialect {})
}

pub fn parse_with_dialect<D: Dialect>(query: &str, dialect: &D) -> Result<Statement> {
    let mut statements = Parser::parse_sql(dialect, query)?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        0 => Err(Error::parsing_error("an empty query")),
        n => Err(Error::unsupported_query(format!(
            "{n} statements were submitted, exactly one SELECT is expected"
        ))),
    }
}
