//! Rewrite queries before they reach the exact reader

use super::{Error, Result};
use crate::{ast, expr::Aggregate};

/// The alias of the exact sum computed for the AVG at `index` in the SELECT list
pub fn sum_alias(index: usize) -> String {
    format!("_SUM_{index}")
}

/// The alias of the exact count computed for the AVG at `index` in the SELECT list
pub fn count_alias(index: usize) -> String {
    format!("_COUNT_{index}")
}

/// Replace every `AVG(x)` of the SELECT list by `SUM(x), COUNT(x)`.
/// The other items are left untouched so that a mean occupies two consecutive
/// columns of the exact result. Positions in ORDER BY are shifted accordingly.
pub fn expand_means(statement: &ast::Statement) -> Result<ast::Statement> {
    let mut statement = statement.clone();
    let ast::Statement::Query(query) = &mut statement else {
        return Err(Error::other("only SELECT statements can be rewritten"));
    };
    let ast::SetExpr::Select(select) = query.body.as_mut() else {
        return Err(Error::other("only SELECT statements can be rewritten"));
    };
    let means = select
        .projection
        .iter()
        .map(|item| mean(item).is_some())
        .collect::<Vec<bool>>();
    select.projection = select
        .projection
        .iter()
        .enumerate()
        .flat_map(|(index, item)| match mean(item) {
            Some(function) => vec![
                with_name(function, "SUM", sum_alias(index)),
                with_name(function, "COUNT", count_alias(index)),
            ],
            None => vec![item.clone()],
        })
        .collect();
    // Each mean before a position shifts it by one column
    for order_by in &mut query.order_by {
        if let ast::Expr::Value(ast::Value::Number(position, _)) = &mut order_by.expr {
            if let Ok(index) = position.parse::<usize>() {
                let shift = means.iter().take(index.saturating_sub(1)).filter(|m| **m).count();
                *position = (index + shift).to_string();
            }
        }
    }
    Ok(statement)
}

fn mean(item: &ast::SelectItem) -> Option<&ast::Function> {
    let mut expr = match item {
        ast::SelectItem::UnnamedExpr(expr) | ast::SelectItem::ExprWithAlias { expr, .. } => expr,
        _ => return None,
    };
    while let ast::Expr::Nested(nested) = expr {
        expr = &**nested;
    }
    match expr {
        ast::Expr::Function(function)
            if Aggregate::from_name(&function.name.to_string()) == Some(Aggregate::Mean) =>
        {
            Some(function)
        }
        _ => None,
    }
}

fn with_name(function: &ast::Function, name: &str, alias: String) -> ast::SelectItem {
    let mut function = function.clone();
    function.name = ast::ObjectName(vec![ast::Ident::new(name)]);
    ast::SelectItem::ExprWithAlias {
        expr: ast::Expr::Function(function),
        alias: ast::Ident::new(alias),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse;

    #[test]
    fn test_expand_means() -> Result<()> {
        let statement = parse(
            "SELECT city, avg(income) AS m, COUNT(*), AVG((age)) FROM T WHERE married GROUP BY city",
        )?;
        let rewritten = expand_means(&statement)?;
        println!("{rewritten}");
        assert_eq!(
            rewritten.to_string(),
            "SELECT city, SUM(income) AS _SUM_1, COUNT(income) AS _COUNT_1, COUNT(*), \
            SUM((age)) AS _SUM_3, COUNT((age)) AS _COUNT_3 FROM T WHERE married GROUP BY city"
        );
        Ok(())
    }

    #[test]
    fn test_expand_means_shifts_positions() -> Result<()> {
        let statement = parse("SELECT AVG(income) AS m, city FROM T GROUP BY city ORDER BY 2")?;
        assert_eq!(
            expand_means(&statement)?.to_string(),
            "SELECT SUM(income) AS _SUM_0, COUNT(income) AS _COUNT_0, city FROM T GROUP BY city ORDER BY 3"
        );
        let statement = parse("SELECT city, AVG(income) FROM T GROUP BY city ORDER BY 1, city")?;
        assert_eq!(
            expand_means(&statement)?.to_string(),
            "SELECT city, SUM(income) AS _SUM_1, COUNT(income) AS _COUNT_1 FROM T GROUP BY city ORDER BY 1, city"
        );
        Ok(())
    }

    #[test]
    fn test_expand_nothing() -> Result<()> {
        let statement = parse("SELECT COUNT(*) FROM T")?;
        assert_eq!(expand_means(&statement)?, statement);
        assert!(expand_means(&parse("DROP TABLE T")?).is_err());
        Ok(())
    }
}
