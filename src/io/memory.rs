//! An in-memory database evaluating the SQL subset used by private readers:
//! one table, WHERE, GROUP BY, COUNT / SUM / AVG / MIN / MAX,
//! ORDER BY, LIMIT and OFFSET.
//!
//! Groups come out in order of first appearance unless the query is ordered.
//!

use super::{Database as DatabaseTrait, Dataset, Error, Result};
use crate::{ast, data_type::Value, expr::Aggregate, result_set::ResultSet};
use itertools::Itertools;
use sqlparser::{dialect::GenericDialect, parser::Parser};
use std::{cmp::Ordering, collections::HashMap};

const DB: &str = "qrlew-memory";

/// A database holding its datasets in memory
#[derive(Clone, Debug, Default)]
pub struct Database {
    name: String,
    datasets: Vec<Dataset>,
}

impl Database {
    fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets
            .iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }
}

impl DatabaseTrait for Database {
    fn new(name: String, datasets: Vec<Dataset>) -> Result<Self> {
        Database {
            name,
            datasets: vec![],
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
        match self.dataset(dataset.name()) {
            Some(_) => Err(Error::database(format!(
                "table {} already exists",
                dataset.name()
            ))),
            None => Ok(0),
        }
    }

    fn insert_data(&mut self, dataset: &Dataset) -> Result<()> {
        log::debug!("{} rows in {}", dataset.rows().len(), dataset.name());
        Ok(())
    }

    fn query(&mut self, query: &str) -> Result<ResultSet> {
        let mut statements =
            Parser::parse_sql(&GenericDialect {}, query).map_err(Error::query)?;
        if statements.len() != 1 {
            return Err(Error::query(format!(
                "expected one statement, got {}",
                statements.len()
            )));
        }
        self.evaluate(&statements.remove(0))
    }
}

impl Database {
    fn evaluate(&self, statement: &ast::Statement) -> Result<ResultSet> {
        let ast::Statement::Query(query) = statement else {
            return Err(Error::query(format!("{statement} is not a query")));
        };
        if query.with.is_some() {
            return Err(Error::query("WITH is not supported"));
        }
        let ast::SetExpr::Select(select) = query.body.as_ref() else {
            return Err(Error::query(format!("{} is not supported", query.body)));
        };
        if let Some(having) = &select.having {
            return Err(Error::query(format!("HAVING {having} is not supported")));
        }
        let scope = self.scope(&select.from)?;
        // Filter
        let mut rows: Vec<&[Value]> = vec![];
        for row in scope.dataset.rows() {
            let keep = match &select.selection {
                Some(selection) => scope.eval(selection, &Context::Row(row))?.to_bool() == Some(true),
                None => true,
            };
            if keep {
                rows.push(row);
            }
        }
        let group_by = match &select.group_by {
            ast::GroupByExpr::Expressions(exprs) => exprs,
            ast::GroupByExpr::All => return Err(Error::query("GROUP BY ALL is not supported")),
        };
        // Output columns
        let mut names = vec![];
        let mut items = vec![];
        for item in &select.projection {
            match item {
                ast::SelectItem::UnnamedExpr(expr) => {
                    names.push(output_name(expr));
                    items.push(Item::Expr(expr));
                }
                ast::SelectItem::ExprWithAlias { expr, alias } => {
                    names.push(alias.value.clone());
                    items.push(Item::Expr(expr));
                }
                ast::SelectItem::Wildcard(_) => {
                    for (index, column) in scope.dataset.table().iter().enumerate() {
                        names.push(column.name().to_string());
                        items.push(Item::Column(index));
                    }
                }
                item => return Err(Error::query(format!("{item} is not supported"))),
            }
        }
        let aggregating = !group_by.is_empty()
            || items.iter().any(|item| match item {
                Item::Expr(expr) => contains_aggregate(expr),
                Item::Column(_) => false,
            });
        // Group
        let groups: Vec<Vec<&[Value]>> = if aggregating {
            let mut groups: Vec<Vec<&[Value]>> = vec![];
            let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
            for row in &rows {
                let key = group_by
                    .iter()
                    .map(|expr| scope.eval(expr, &Context::Row(row)))
                    .collect::<Result<Vec<Value>>>()?;
                let position = *index.entry(key).or_insert_with(|| {
                    groups.push(vec![]);
                    groups.len() - 1
                });
                groups[position].push(row);
            }
            if group_by.is_empty() && groups.is_empty() {
                groups.push(vec![]);
            }
            groups
        } else {
            vec![]
        };
        let contexts: Vec<Context> = if aggregating {
            groups.iter().map(|group| Context::Group(group)).collect()
        } else {
            rows.iter().map(|row| Context::Row(row)).collect()
        };
        let mut output = vec![];
        for context in contexts {
            let values = items
                .iter()
                .map(|item| match item {
                    Item::Expr(expr) => scope.eval(expr, &context),
                    Item::Column(index) => Ok(context.column(*index)),
                })
                .collect::<Result<Vec<Value>>>()?;
            let keys = query
                .order_by
                .iter()
                .map(|order_by| scope.sort_key(&order_by.expr, &context, &names, &values))
                .collect::<Result<Vec<Value>>>()?;
            output.push((keys, values));
        }
        // Order
        if !query.order_by.is_empty() {
            output.sort_by(|(left, _), (right, _)| {
                left.iter()
                    .zip(right)
                    .zip(&query.order_by)
                    .map(|((l, r), order_by)| {
                        let ordering = l.partial_cmp(r).unwrap_or(Ordering::Equal);
                        if order_by.asc == Some(false) {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    })
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        // Limit
        let offset = match &query.offset {
            Some(offset) => scope.count(&offset.value)?,
            None => 0,
        };
        let limit = match &query.limit {
            Some(limit) => scope.count(limit)?,
            None => usize::MAX,
        };
        let rows = output
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, values)| values)
            .collect();
        Ok(ResultSet::new(names, rows))
    }

    fn scope<'a>(&'a self, from: &'a [ast::TableWithJoins]) -> Result<Scope<'a>> {
        let [table_with_joins] = from else {
            return Err(Error::query("exactly one table is expected in FROM"));
        };
        if !table_with_joins.joins.is_empty() {
            return Err(Error::query("JOIN is not supported"));
        }
        match &table_with_joins.relation {
            ast::TableFactor::Table { name, alias, .. } => {
                let table_name = name
                    .0
                    .last()
                    .map(|ident| ident.value.as_str())
                    .unwrap_or_default();
                let dataset = self
                    .dataset(table_name)
                    .ok_or_else(|| Error::query(format!("unknown table {name}")))?;
                Ok(Scope {
                    dataset,
                    alias: alias.as_ref().map(|alias| alias.name.value.as_str()),
                })
            }
            relation => Err(Error::query(format!("{relation} is not supported"))),
        }
    }
}

enum Item<'a> {
    Expr(&'a ast::Expr),
    Column(usize),
}

/// Expressions are evaluated on a row or on a group of rows
enum Context<'r> {
    Row(&'r [Value]),
    Group(&'r [&'r [Value]]),
}

impl<'r> Context<'r> {
    /// In a group, columns are grouping keys and take the value of any row
    fn column(&self, index: usize) -> Value {
        match self {
            Context::Row(row) => row[index].clone(),
            Context::Group(rows) => rows
                .first()
                .map_or(Value::Null, |row| row[index].clone()),
        }
    }
}

struct Scope<'a> {
    dataset: &'a Dataset,
    alias: Option<&'a str>,
}

impl<'a> Scope<'a> {
    fn column_index(&self, expr: &ast::Expr) -> Result<usize> {
        let (qualifier, name) = match expr {
            ast::Expr::Identifier(ident) => (None, ident),
            ast::Expr::CompoundIdentifier(idents) => match idents.as_slice() {
                [qualifier, name] => (Some(qualifier), name),
                _ => return Err(Error::query(format!("unknown column {expr}"))),
            },
            _ => return Err(Error::query(format!("{expr} is not a column"))),
        };
        if let Some(qualifier) = qualifier {
            let known = self
                .alias
                .map_or(false, |alias| alias.eq_ignore_ascii_case(&qualifier.value))
                || self.dataset.name().eq_ignore_ascii_case(&qualifier.value);
            if !known {
                return Err(Error::query(format!("unknown table {}", qualifier.value)));
            }
        }
        self.dataset
            .table()
            .iter()
            .position(|column| column.name().eq_ignore_ascii_case(&name.value))
            .ok_or_else(|| Error::query(format!("unknown column {expr}")))
    }

    fn eval(&self, expr: &ast::Expr, context: &Context) -> Result<Value> {
        match expr {
            ast::Expr::Identifier(_) | ast::Expr::CompoundIdentifier(_) => {
                Ok(context.column(self.column_index(expr)?))
            }
            ast::Expr::Value(value) => literal(value),
            ast::Expr::Nested(expr) => self.eval(expr, context),
            ast::Expr::UnaryOp { op, expr } => {
                let value = self.eval(expr, context)?;
                match (op, value) {
                    (_, Value::Null) => Ok(Value::Null),
                    (ast::UnaryOperator::Not, value) => value
                        .to_bool()
                        .map(|b| Value::boolean(!b))
                        .ok_or_else(|| Error::query(format!("cannot negate {expr}"))),
                    (ast::UnaryOperator::Minus, Value::Integer(i)) => Ok(Value::integer(-i)),
                    (ast::UnaryOperator::Minus, Value::Float(f)) => Ok(Value::float(-f)),
                    (ast::UnaryOperator::Plus, value) => Ok(value),
                    _ => Err(Error::query(format!("{expr} is not supported"))),
                }
            }
            ast::Expr::BinaryOp { left, op, right } => {
                let left = self.eval(left, context)?;
                let right = self.eval(right, context)?;
                binary(op, left, right)
            }
            ast::Expr::IsNull(expr) => Ok(Value::boolean(self.eval(expr, context)?.is_null())),
            ast::Expr::IsNotNull(expr) => {
                Ok(Value::boolean(!self.eval(expr, context)?.is_null()))
            }
            ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let value = self.eval(expr, context)?;
                let low = binary(&ast::BinaryOperator::GtEq, value.clone(), self.eval(low, context)?)?;
                let high = binary(&ast::BinaryOperator::LtEq, value, self.eval(high, context)?)?;
                let between = binary(&ast::BinaryOperator::And, low, high)?;
                if *negated {
                    not(between)
                } else {
                    Ok(between)
                }
            }
            ast::Expr::InList {
                expr,
                list,
                negated,
            } => {
                let value = self.eval(expr, context)?;
                let found = list
                    .iter()
                    .map(|item| {
                        binary(&ast::BinaryOperator::Eq, value.clone(), self.eval(item, context)?)
                    })
                    .fold_ok(Value::boolean(false), |found, eq| {
                        binary(&ast::BinaryOperator::Or, found, eq).unwrap_or(Value::Null)
                    })?;
                if *negated {
                    not(found)
                } else {
                    Ok(found)
                }
            }
            ast::Expr::Function(function) => match context {
                Context::Group(rows) => self.aggregate(function, rows),
                Context::Row(_) => Err(Error::query(format!(
                    "{function} is not supported outside of an aggregation"
                ))),
            },
            expr => Err(Error::query(format!("{expr} is not supported"))),
        }
    }

    fn aggregate(&self, function: &ast::Function, rows: &[&[Value]]) -> Result<Value> {
        let aggregate = Aggregate::from_name(&function.name.to_string())
            .ok_or_else(|| Error::query(format!("unknown function {}", function.name)))?;
        let ast::FunctionArguments::List(list) = &function.args else {
            return Err(Error::query(format!("{function} is not supported")));
        };
        let [arg] = list.args.as_slice() else {
            return Err(Error::query(format!("{function} expects one argument")));
        };
        let expr = match arg {
            ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(expr)) => expr,
            ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Wildcard)
                if aggregate == Aggregate::Count =>
            {
                return Ok(Value::integer(rows.len() as i64))
            }
            _ => return Err(Error::query(format!("{function} is not supported"))),
        };
        let mut values = vec![];
        for row in rows {
            let value = self.eval(expr, &Context::Row(row))?;
            if !value.is_null() {
                values.push(value);
            }
        }
        if matches!(list.duplicate_treatment, Some(ast::DuplicateTreatment::Distinct)) {
            values = values.into_iter().unique().collect();
        }
        match aggregate {
            Aggregate::Count => Ok(Value::integer(values.len() as i64)),
            Aggregate::Sum | Aggregate::Mean if values.is_empty() => Ok(Value::Null),
            Aggregate::Sum if values.iter().all(|v| matches!(v, Value::Integer(_))) => values
                .iter()
                .try_fold(0i64, |sum, v| match v {
                    Value::Integer(i) => sum.checked_add(*i),
                    _ => Some(sum),
                })
                .map(Value::integer)
                .ok_or_else(|| Error::query(format!("{function} overflows"))),
            Aggregate::Sum | Aggregate::Mean => {
                let numbers = values
                    .iter()
                    .map(|v| {
                        v.to_f64()
                            .ok_or_else(|| Error::query(format!("{function} over non numeric {v}")))
                    })
                    .collect::<Result<Vec<f64>>>()?;
                let sum: f64 = numbers.iter().sum();
                Ok(Value::float(if aggregate == Aggregate::Sum {
                    sum
                } else {
                    sum / numbers.len() as f64
                }))
            }
            Aggregate::Min | Aggregate::Max => Ok(values
                .into_iter()
                .reduce(|best, value| {
                    let better = match value.partial_cmp(&best) {
                        Some(Ordering::Less) => aggregate == Aggregate::Min,
                        Some(Ordering::Greater) => aggregate == Aggregate::Max,
                        _ => false,
                    };
                    if better {
                        value
                    } else {
                        best
                    }
                })
                .unwrap_or(Value::Null)),
        }
    }

    /// ORDER BY items may name an output column or give its position
    fn sort_key(
        &self,
        expr: &ast::Expr,
        context: &Context,
        names: &[String],
        values: &[Value],
    ) -> Result<Value> {
        match expr {
            ast::Expr::Identifier(ident) => {
                if let Some(index) = names
                    .iter()
                    .position(|name| name.eq_ignore_ascii_case(&ident.value))
                {
                    return Ok(values[index].clone());
                }
            }
            ast::Expr::Value(ast::Value::Number(position, _)) => {
                return position
                    .parse::<usize>()
                    .ok()
                    .and_then(|position| values.get(position.checked_sub(1)?))
                    .cloned()
                    .ok_or_else(|| Error::query(format!("invalid ORDER BY position {position}")))
            }
            _ => (),
        }
        self.eval(expr, context)
    }

    /// A LIMIT or OFFSET
    fn count(&self, expr: &ast::Expr) -> Result<usize> {
        match self.eval(expr, &Context::Row(&[]))? {
            Value::Integer(n) if n >= 0 => Ok(n as usize),
            value => Err(Error::query(format!("invalid row count {value}"))),
        }
    }
}

fn literal(value: &ast::Value) -> Result<Value> {
    match value {
        ast::Value::Number(number, _) => number
            .parse::<i64>()
            .map(Value::integer)
            .or_else(|_| number.parse::<f64>().map(Value::float))
            .map_err(|_| Error::query(format!("invalid number {number}"))),
        ast::Value::SingleQuotedString(s) | ast::Value::DoubleQuotedString(s) => {
            Ok(Value::text(s.as_str()))
        }
        ast::Value::Boolean(b) => Ok(Value::boolean(*b)),
        ast::Value::Null => Ok(Value::Null),
        value => Err(Error::query(format!("{value} is not supported"))),
    }
}

fn not(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        value => value
            .to_bool()
            .map(|b| Value::boolean(!b))
            .ok_or_else(|| Error::query(format!("cannot negate {value}"))),
    }
}

/// SQL operators with three-valued logic
fn binary(op: &ast::BinaryOperator, left: Value, right: Value) -> Result<Value> {
    use ast::BinaryOperator as Op;
    match op {
        Op::And => Ok(match (left.to_bool(), right.to_bool()) {
            (Some(false), _) | (_, Some(false)) => Value::boolean(false),
            (Some(true), Some(true)) => Value::boolean(true),
            _ => Value::Null,
        }),
        Op::Or => Ok(match (left.to_bool(), right.to_bool()) {
            (Some(true), _) | (_, Some(true)) => Value::boolean(true),
            (Some(false), Some(false)) => Value::boolean(false),
            _ => Value::Null,
        }),
        _ if left.is_null() || right.is_null() => Ok(Value::Null),
        Op::Eq | Op::NotEq | Op::Lt | Op::LtEq | Op::Gt | Op::GtEq => {
            let ordering = left.partial_cmp(&right).ok_or_else(|| {
                Error::query(format!("cannot compare {left} and {right}"))
            })?;
            Ok(Value::boolean(match op {
                Op::Eq => ordering == Ordering::Equal,
                Op::NotEq => ordering != Ordering::Equal,
                Op::Lt => ordering == Ordering::Less,
                Op::LtEq => ordering != Ordering::Greater,
                Op::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        Op::Plus | Op::Minus | Op::Multiply | Op::Divide | Op::Modulo => {
            arithmetic(op, left, right)
        }
        op => Err(Error::query(format!("operator {op} is not supported"))),
    }
}

fn arithmetic(op: &ast::BinaryOperator, left: Value, right: Value) -> Result<Value> {
    use ast::BinaryOperator as Op;
    if let (Value::Integer(l), Value::Integer(r)) = (&left, &right) {
        let result = match op {
            Op::Plus => l.checked_add(*r),
            Op::Minus => l.checked_sub(*r),
            Op::Multiply => l.checked_mul(*r),
            Op::Divide => l.checked_div(*r),
            _ => l.checked_rem(*r),
        };
        return result
            .map(Value::integer)
            .ok_or_else(|| Error::query(format!("integer overflow or division by zero in {l} {op} {r}")));
    }
    let (Some(l), Some(r)) = (left.to_f64(), right.to_f64()) else {
        return Err(Error::query(format!("cannot compute {left} {op} {right}")));
    };
    Ok(Value::float(match op {
        Op::Plus => l + r,
        Op::Minus => l - r,
        Op::Multiply => l * r,
        Op::Divide => l / r,
        _ => l % r,
    }))
}

fn contains_aggregate(expr: &ast::Expr) -> bool {
    match expr {
        ast::Expr::Function(function) => {
            Aggregate::from_name(&function.name.to_string()).is_some()
        }
        ast::Expr::Nested(expr) | ast::Expr::UnaryOp { expr, .. } => contains_aggregate(expr),
        ast::Expr::BinaryOp { left, right, .. } => {
            contains_aggregate(left) || contains_aggregate(right)
        }
        _ => false,
    }
}

fn output_name(expr: &ast::Expr) -> String {
    match expr {
        ast::Expr::Identifier(ident) => ident.value.clone(),
        ast::Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|ident| ident.value.clone())
            .unwrap_or_default(),
        expr => expr.to_string(),
    }
}

/// The census database
pub fn test_database() -> Database {
    Database::new(DB.into(), Database::test_datasets()).expect("Database")
}
