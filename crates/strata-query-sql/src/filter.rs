//! FilterExpression → sea-query condition compilation.

use crate::dialect::SqlFlavor;
use crate::value::scalar;
use sea_orm::sea_query::{Alias, Cond, Condition, Expr, Order, SelectStatement, SimpleExpr};
use serde_json::Value;
use strata_query::filter::effective_sorts;
use strata_query::{AuditFields, Criterion, FilterExpression, Operator, QueryError, Result, SortDirection, SortSpec};

fn column(key: &str) -> SimpleExpr {
    Expr::col(Alias::new(key)).into()
}

/// Predicate that matches no row
fn never() -> SimpleExpr {
    Expr::cust("1 = 0")
}

fn list<'a>(key: &str, value: &'a Value) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| QueryError::compilation(format!("operator on '{}' expects a list", key)))
}

fn scalars(key: &str, values: &[Value]) -> Result<Vec<sea_orm::sea_query::Value>> {
    values.iter().map(|v| scalar(key, v)).collect()
}

fn operator(flavor: SqlFlavor, key: &str, op: Operator, value: &Value) -> Result<Option<SimpleExpr>> {
    let col = Expr::col(Alias::new(key));

    if value.is_null() {
        return match op {
            Operator::Eq => Ok(Some(col.is_null())),
            Operator::Ne => Ok(Some(col.is_not_null())),
            _ => Err(QueryError::compilation(format!(
                "operator {} on '{}' cannot compare with null",
                op, key
            ))),
        };
    }

    let expr = match op {
        Operator::Eq => col.eq(scalar(key, value)?),
        Operator::Ne => col.ne(scalar(key, value)?),
        Operator::Lt => col.lt(scalar(key, value)?),
        Operator::Lte => col.lte(scalar(key, value)?),
        Operator::Gt => col.gt(scalar(key, value)?),
        Operator::Gte => col.gte(scalar(key, value)?),
        Operator::In => {
            let values = list(key, value)?;
            if values.is_empty() {
                never()
            } else {
                col.is_in(scalars(key, values)?)
            }
        }
        Operator::NotIn => {
            let values = list(key, value)?;
            if values.is_empty() {
                return Ok(None);
            }
            col.is_not_in(scalars(key, values)?)
        }
        Operator::Like => {
            let pattern = value
                .as_str()
                .ok_or_else(|| QueryError::compilation(format!("LIKE on '{}' expects a string", key)))?;
            col.like(pattern)
        }
        Operator::RegexMatch | Operator::RegexNotMatch => {
            let template = match (flavor, op) {
                (SqlFlavor::Postgres, Operator::RegexMatch) => "$1 ~ $2",
                (SqlFlavor::Postgres, _) => "$1 !~ $2",
                (SqlFlavor::MySql, Operator::RegexMatch) => "$1 REGEXP $2",
                (SqlFlavor::MySql, _) => "$1 NOT REGEXP $2",
            };
            Expr::cust_with_exprs(template, [column(key), SimpleExpr::Value(scalar(key, value)?)])
        }
    };
    Ok(Some(expr))
}

fn contains(flavor: SqlFlavor, key: &str, value: &Value) -> Result<SimpleExpr> {
    let template = match flavor {
        SqlFlavor::Postgres => "$1 = ANY($2)",
        SqlFlavor::MySql => "$1 MEMBER OF($2)",
    };
    Ok(Expr::cust_with_exprs(
        template,
        [SimpleExpr::Value(scalar(key, value)?), column(key)],
    ))
}

/// Append the clauses of `filter` to the conjunction `condition`.
/// An empty filter leaves it untouched.
pub fn compile_filter(mut condition: Condition, filter: &FilterExpression, flavor: SqlFlavor) -> Result<Condition> {
    for (key, criterion) in filter.clauses() {
        match criterion {
            Criterion::Equals(Value::Null) => {
                condition = condition.add(Expr::col(Alias::new(key)).is_null());
            }
            Criterion::Equals(value) => {
                condition = condition.add(Expr::col(Alias::new(key)).eq(scalar(key, value)?));
            }
            Criterion::In(values) if values.is_empty() => condition = condition.add(never()),
            Criterion::In(values) => {
                condition = condition.add(Expr::col(Alias::new(key)).is_in(scalars(key, values)?));
            }
            Criterion::Operator { op, value } => {
                if let Some(expr) = operator(flavor, key, *op, value)? {
                    condition = condition.add(expr);
                }
            }
            Criterion::Position(values) if values.is_empty() => condition = condition.add(never()),
            Criterion::Position(values) => {
                let mut any = Cond::any();
                for value in values {
                    any = any.add(contains(flavor, key, value)?);
                }
                condition = condition.add(any);
            }
        }
    }

    Ok(condition)
}

/// Apply the requested order, or newest first
pub fn apply_sort(select: &mut SelectStatement, sorts: &[SortSpec], audit: &AuditFields) {
    for spec in effective_sorts(sorts, &audit.created_at, &audit.id) {
        let order = match spec.direction() {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        select.order_by(Alias::new(spec.field.as_str()), order);
    }
}
