//! Classification of SQL queries into the shapes a private reader understands
//!
//! A single pass over the AST produces a [QueryShape]. Only the
//! [QueryShape::Aggregate] variant can be released privately: it carries a
//! [QueryDescriptor] listing the grouping keys and the (aggregate, column)
//! pairs of the SELECT list.
//!

use itertools::Itertools;
use std::{ops::ControlFlow, result};

use super::{reader, rewriting, Error, Result};
use crate::{
    ast::{self, Visit},
    expr::{Aggregate, AggregateColumn, Argument},
    metadata::{Metadata, Table},
};

/// A column of the SELECT list
#[derive(Clone, Debug, PartialEq)]
pub enum OutputColumn {
    /// A GROUP BY column, released as is
    GroupingKey { name: String, column: String },
    /// An aggregate, released with noise
    Aggregate {
        name: String,
        aggregate: AggregateColumn,
    },
}

impl OutputColumn {
    pub fn name(&self) -> &str {
        match self {
            OutputColumn::GroupingKey { name, .. } | OutputColumn::Aggregate { name, .. } => name,
        }
    }

    pub fn aggregate(&self) -> Option<&AggregateColumn> {
        match self {
            OutputColumn::GroupingKey { .. } => None,
            OutputColumn::Aggregate { aggregate, .. } => Some(aggregate),
        }
    }
}

/// The description of an aggregate query over one table
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDescriptor {
    table: String,
    group_by: Vec<String>,
    columns: Vec<OutputColumn>,
    exact_query: String,
}

impl QueryDescriptor {
    /// The queried table, named as in the metadata
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    /// The output columns in SELECT order
    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    /// The query sent to the exact reader
    pub fn exact_query(&self) -> &str {
        &self.exact_query
    }

    pub fn aggregates(&self) -> impl Iterator<Item = &AggregateColumn> {
        self.columns.iter().filter_map(OutputColumn::aggregate)
    }

    /// Aggregates in order of first appearance, without repetition
    pub fn distinct_aggregates(&self) -> Vec<&AggregateColumn> {
        self.aggregates().unique().collect()
    }

    pub fn has_mean(&self) -> bool {
        self.aggregates().any(|a| a.aggregate() == Aggregate::Mean)
    }
}

/// The closed set of query shapes
#[derive(Clone, Debug, PartialEq)]
pub enum QueryShape {
    /// SELECT of grouping keys and aggregates
    Aggregate(QueryDescriptor),
    /// SELECT without aggregation, it would release individual records
    PlainSelect { table: String },
    /// Anything else, with the reason
    Unsupported(String),
}

impl QueryShape {
    pub fn new(statement: &ast::Statement, metadata: &Metadata) -> QueryShape {
        shape(statement, metadata).unwrap_or_else(QueryShape::Unsupported)
    }
}

/// Parse and classify a query.
/// Only aggregate queries are accepted, every other shape is an `UnsupportedQuery`.
pub fn classify(query: &str, metadata: &Metadata) -> Result<QueryDescriptor> {
    let statement = reader::parse(query)?;
    match QueryShape::new(&statement, metadata) {
        QueryShape::Aggregate(mut descriptor) => {
            if !descriptor.has_mean() {
                // Sent verbatim
                descriptor.exact_query = query.to_string();
            }
            log::debug!(
                "Classified query on {} grouped by [{}] releasing [{}]",
                descriptor.table,
                descriptor.group_by.iter().join(", "),
                descriptor.aggregates().join(", ")
            );
            Ok(descriptor)
        }
        QueryShape::PlainSelect { table } => Err(Error::unsupported_query(format!(
            "SELECT without aggregation on table {table} would release individual records"
        ))),
        QueryShape::Unsupported(reason) => Err(Error::unsupported_query(reason)),
    }
}

type Analysis<T> = result::Result<T, String>;

fn shape(statement: &ast::Statement, metadata: &Metadata) -> Analysis<QueryShape> {
    let query = match statement {
        ast::Statement::Query(query) => query,
        _ => return Err("only SELECT statements are supported".into()),
    };
    if query.with.is_some() {
        return Err("WITH clauses (subqueries) are not supported".into());
    }
    if let Some(limit) = query.limit.as_ref().filter(|limit| !is_number(limit)) {
        return Err(format!("LIMIT {limit} is not supported: a number is expected"));
    }
    if let Some(offset) = query.offset.as_ref().filter(|offset| !is_number(&offset.value)) {
        return Err(format!("OFFSET {} is not supported: a number is expected", offset.value));
    }
    if query.fetch.is_some() || !query.limit_by.is_empty() {
        return Err("FETCH and LIMIT BY are not supported".into());
    }
    let select = match query.body.as_ref() {
        ast::SetExpr::Select(select) => select,
        ast::SetExpr::Query(_) => return Err("subqueries are not supported".into()),
        ast::SetExpr::SetOperation { op, .. } => {
            return Err(format!("set operation {op} is not supported"))
        }
        body => return Err(format!("{body} is not a SELECT")),
    };
    let (table, alias) = from_table(&select.from, metadata)?;
    let scope = Scope {
        table,
        alias: alias.as_deref(),
    };
    if let Some(selection) = &select.selection {
        if any_expr(selection, &is_subquery) {
            return Err(format!("subqueries are not supported in WHERE {selection}"));
        }
        if any_expr(selection, &is_aggregate) {
            return Err(format!("aggregates are not allowed in WHERE {selection}"));
        }
    }
    let group_by_exprs = match &select.group_by {
        ast::GroupByExpr::All => return Err("GROUP BY ALL is not supported".into()),
        ast::GroupByExpr::Expressions(exprs) => exprs,
    };
    let has_aggregates = select.projection.iter().any(|item| match item {
        ast::SelectItem::UnnamedExpr(expr) | ast::SelectItem::ExprWithAlias { expr, .. } => {
            any_expr(expr, &is_aggregate)
        }
        _ => false,
    });
    if !has_aggregates && group_by_exprs.is_empty() {
        return Ok(QueryShape::PlainSelect {
            table: table.name().to_string(),
        });
    }
    if select.distinct.is_some() {
        return Err("SELECT DISTINCT is not supported".into());
    }
    if select.top.is_some() {
        return Err("TOP is not supported".into());
    }
    if let Some(having) = &select.having {
        return Err(format!(
            "HAVING {having} is not supported: it filters groups on exact aggregate values"
        ));
    }
    if !select.named_window.is_empty() || select.qualify.is_some() {
        return Err("window clauses are not supported".into());
    }
    let group_by = group_by_exprs
        .iter()
        .map(|expr| {
            let column = scope.column_reference(expr)?.ok_or_else(|| {
                format!("GROUP BY {expr} is not supported: only declared columns can be grouping keys")
            })?;
            if table.column(&column).map_or(false, |c| c.is_identifier()) {
                return Err(format!(
                    "GROUP BY {column} is not supported: it would release the identifiers of individuals"
                ));
            }
            Ok(column)
        })
        .collect::<Analysis<Vec<String>>>()?;
    let columns = select
        .projection
        .iter()
        .map(|item| match item {
            ast::SelectItem::UnnamedExpr(expr) => {
                scope.output_column(expr, default_name(expr), &group_by)
            }
            ast::SelectItem::ExprWithAlias { expr, alias } => {
                scope.output_column(expr, alias.value.clone(), &group_by)
            }
            item => Err(format!(
                "{item} is not supported in an aggregate query, list grouping keys and aggregates"
            )),
        })
        .collect::<Analysis<Vec<OutputColumn>>>()?;
    for order_by in &query.order_by {
        if !scope.is_grouping_key(&order_by.expr, &columns, &group_by)? {
            return Err(format!(
                "ORDER BY {} is not supported: only grouping keys can be ordered",
                order_by.expr
            ));
        }
    }
    if has_subquery(statement) {
        return Err(format!("subqueries are not supported in {statement}"));
    }
    let mut descriptor = QueryDescriptor {
        table: table.name().to_string(),
        group_by,
        columns,
        exact_query: statement.to_string(),
    };
    if descriptor.has_mean() {
        descriptor.exact_query = rewriting::expand_means(statement)
            .map_err(|err| err.to_string())?
            .to_string();
    }
    Ok(QueryShape::Aggregate(descriptor))
}

/// The single table of the FROM clause, with its alias
fn from_table<'a>(
    from: &[ast::TableWithJoins],
    metadata: &'a Metadata,
) -> Analysis<(&'a Table, Option<String>)> {
    let table_with_joins = match from {
        [table_with_joins] => table_with_joins,
        [] => return Err("a FROM clause is required".into()),
        _ => {
            return Err(format!(
                "several tables in FROM {} are not supported: no relationship metadata is declared",
                from.iter().join(", ")
            ))
        }
    };
    if let Some(join) = table_with_joins.joins.first() {
        return Err(format!(
            "JOIN with {} is not supported: no relationship metadata is declared",
            join.relation
        ));
    }
    match &table_with_joins.relation {
        ast::TableFactor::Table { name, alias, .. } => {
            let full_name = name.0.iter().map(|ident| ident.value.as_str()).join(".");
            let table = metadata
                .describe(&full_name)
                .or_else(|err| match name.0.last() {
                    Some(ident) => metadata.describe(&ident.value),
                    None => Err(err),
                })
                .map_err(|_| format!("table {full_name} is not declared in the metadata"))?;
            Ok((table, alias.as_ref().map(|alias| alias.name.value.clone())))
        }
        ast::TableFactor::Derived { .. } => Err("subqueries are not supported in FROM".into()),
        relation => Err(format!("{relation} is not supported in FROM")),
    }
}

/// The name a column gets without alias
fn default_name(expr: &ast::Expr) -> String {
    match expr {
        ast::Expr::Identifier(ident) => ident.value.clone(),
        ast::Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|ident| ident.value.clone())
            .unwrap_or_default(),
        ast::Expr::Nested(expr) => default_name(expr),
        expr => expr.to_string(),
    }
}

/// The table in which column names are resolved
struct Scope<'a> {
    table: &'a Table,
    alias: Option<&'a str>,
}

impl<'a> Scope<'a> {
    /// Resolve an expression as a declared column, `None` if it is not a column reference
    fn column_reference(&self, expr: &ast::Expr) -> Analysis<Option<String>> {
        let (qualifier, name) = match expr {
            ast::Expr::Identifier(ident) => (None, ident),
            ast::Expr::CompoundIdentifier(idents) => match idents.as_slice() {
                [qualifier @ .., name] if !qualifier.is_empty() => (qualifier.last(), name),
                [name] => (None, name),
                _ => return Ok(None),
            },
            ast::Expr::Nested(expr) => return self.column_reference(expr),
            _ => return Ok(None),
        };
        if let Some(qualifier) = qualifier {
            let table_name = self.table.name().rsplit('.').next().unwrap_or_default();
            let known = self
                .alias
                .map_or(false, |alias| alias.eq_ignore_ascii_case(&qualifier.value))
                || table_name.eq_ignore_ascii_case(&qualifier.value);
            if !known {
                return Err(format!("unknown table {} in {expr}", qualifier.value));
            }
        }
        self.table
            .column(&name.value)
            .map(|column| Some(column.name().to_string()))
            .map_err(|_| {
                format!(
                    "column {} is not declared in table {}",
                    name.value,
                    self.table.name()
                )
            })
    }

    fn output_column(
        &self,
        expr: &ast::Expr,
        name: String,
        group_by: &[String],
    ) -> Analysis<OutputColumn> {
        if let Some(column) = self.column_reference(expr)? {
            return if group_by.contains(&column) {
                Ok(OutputColumn::GroupingKey { name, column })
            } else {
                Err(format!(
                    "column {column} must appear in GROUP BY or be aggregated"
                ))
            };
        }
        match expr {
            ast::Expr::Nested(expr) => self.output_column(expr, name, group_by),
            ast::Expr::Function(function) => Ok(OutputColumn::Aggregate {
                name,
                aggregate: self.aggregate_column(function)?,
            }),
            expr if any_expr(expr, &is_subquery) => {
                Err(format!("subqueries are not supported ({expr})"))
            }
            expr => Err(format!(
                "{expr} is not supported: only grouping keys and aggregates of declared columns can be selected"
            )),
        }
    }

    fn aggregate_column(&self, function: &ast::Function) -> Analysis<AggregateColumn> {
        let function_name = function.name.to_string();
        let aggregate = Aggregate::from_name(&function_name).ok_or_else(|| {
            format!("function {function_name} is not supported, use one of COUNT, SUM, AVG, MIN or MAX")
        })?;
        if function.over.is_some() {
            return Err(format!("window function {function} is not supported"));
        }
        if function.filter.is_some() {
            return Err(format!("FILTER clause in {function} is not supported"));
        }
        let list = match &function.args {
            ast::FunctionArguments::List(list) => list,
            ast::FunctionArguments::Subquery(_) => {
                return Err(format!("subqueries are not supported ({function})"))
            }
            ast::FunctionArguments::None => return Err(format!("{function} has no argument")),
        };
        if matches!(
            list.duplicate_treatment,
            Some(ast::DuplicateTreatment::Distinct)
        ) {
            return Err(format!("DISTINCT in {function} is not supported"));
        }
        let arg = match list.args.as_slice() {
            [arg] => arg,
            _ => return Err(format!("{function} expects exactly one argument")),
        };
        let argument = match arg {
            ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Wildcard)
                if aggregate == Aggregate::Count =>
            {
                Argument::Star
            }
            ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(expr)) => {
                if any_expr(expr, &is_aggregate) {
                    return Err(format!("nested aggregates are not supported ({function})"));
                }
                if any_expr(expr, &is_subquery) {
                    return Err(format!("subqueries are not supported ({function})"));
                }
                match (self.column_reference(expr)?, expr) {
                    (Some(column), _) => Argument::Column(column),
                    // COUNT(1) counts rows
                    (None, ast::Expr::Value(value))
                        if aggregate == Aggregate::Count && *value != ast::Value::Null =>
                    {
                        Argument::Star
                    }
                    (None, _) => {
                        return Err(format!(
                            "{function} is not supported: aggregates apply to declared columns only"
                        ))
                    }
                }
            }
            _ => return Err(format!("the argument of {function} is not supported")),
        };
        if let Argument::Column(name) = &argument {
            let column = self
                .table
                .column(name)
                .map_err(|err| err.to_string())?;
            if aggregate.requires_numeric() && !column.is_numeric() {
                return Err(format!(
                    "{aggregate} over column {name} of type {} is not supported: numeric column expected",
                    column.data_type()
                ));
            }
        }
        Ok(AggregateColumn::new(aggregate, argument))
    }

    /// ORDER BY items may refer to grouping keys by column, by output name or by position
    fn is_grouping_key(
        &self,
        expr: &ast::Expr,
        columns: &[OutputColumn],
        group_by: &[String],
    ) -> Analysis<bool> {
        if let ast::Expr::Identifier(ident) = expr {
            if let Some(column) = columns
                .iter()
                .find(|c| c.name().eq_ignore_ascii_case(&ident.value))
            {
                return Ok(column.aggregate().is_none());
            }
        }
        if let ast::Expr::Value(ast::Value::Number(position, _)) = expr {
            return Ok(position
                .parse::<usize>()
                .ok()
                .and_then(|position| position.checked_sub(1))
                .and_then(|index| columns.get(index))
                .map_or(false, |column| column.aggregate().is_none()));
        }
        Ok(self
            .column_reference(expr)?
            .map_or(false, |column| group_by.contains(&column)))
    }
}

/// Check whether any sub-expression satisfies the predicate, subqueries included
fn any_expr(expr: &ast::Expr, predicate: &dyn Fn(&ast::Expr) -> bool) -> bool {
    ast::visit_expressions(expr, |expr| {
        if predicate(expr) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .is_break()
}

/// Counts the queries of a statement, the statement itself included
#[derive(Default)]
struct QueryCounter(usize);

impl ast::Visitor for QueryCounter {
    type Break = ();

    fn pre_visit_query(&mut self, _query: &ast::Query) -> ControlFlow<Self::Break> {
        self.0 += 1;
        ControlFlow::Continue(())
    }
}

fn has_subquery(statement: &ast::Statement) -> bool {
    let mut counter = QueryCounter::default();
    let _ = statement.visit(&mut counter);
    counter.0 > 1
}

/// LIMIT and OFFSET must be plain numbers
fn is_number(expr: &ast::Expr) -> bool {
    matches!(expr, ast::Expr::Value(ast::Value::Number(_, _)))
}

fn is_subquery(expr: &ast::Expr) -> bool {
    match expr {
        ast::Expr::Subquery(_) | ast::Expr::Exists { .. } | ast::Expr::InSubquery { .. } => true,
        ast::Expr::Function(function) => {
            matches!(function.args, ast::FunctionArguments::Subquery(_))
        }
        _ => false,
    }
}

fn is_aggregate(expr: &ast::Expr) -> bool {
    match expr {
        ast::Expr::Function(function) => Aggregate::from_name(&function.name.to_string()).is_some(),
        _ => false,
    }
}
