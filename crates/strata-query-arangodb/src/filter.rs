//! FilterExpression → AQL predicate compilation.

use crate::aql::AqlBuilder;
use strata_query::filter::effective_sorts;
use strata_query::{AuditFields, BindValue, Criterion, FilterExpression, Operator, Result, SortSpec};

fn keyword(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "==",
        Operator::Ne => "!=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::In => "IN",
        Operator::NotIn => "NOT IN",
        Operator::Like => "LIKE",
        Operator::RegexMatch => "=~",
        Operator::RegexNotMatch => "!~",
    }
}

/// Compile `filter` into ` AND ...` clauses over documents bound to `alias`.
/// An empty filter yields an empty string.
pub fn compile_filter(aql: &mut AqlBuilder, filter: &FilterExpression, alias: &str) -> Result<String> {
    let mut fragment = String::new();

    for (key, criterion) in filter.clauses() {
        let clause = match criterion {
            Criterion::Equals(value) => {
                let path = aql.access(alias, key);
                let value = aql.value(BindValue::from_json(value));
                format!("{} == {}", path, value)
            }
            Criterion::In(values) => {
                let path = aql.access(alias, key);
                let list = aql.value(BindValue::List(values.iter().map(BindValue::from_json).collect()));
                format!("{} IN {}", path, list)
            }
            Criterion::Operator { op, value } => {
                let path = aql.access(alias, key);
                let value = aql.value(BindValue::from_json(value));
                format!("{} {} {}", path, keyword(*op), value)
            }
            Criterion::Position(values) if values.is_empty() => "false".to_string(),
            Criterion::Position(values) => {
                let path = aql.access(alias, key);
                let tests: Vec<_> = values
                    .iter()
                    .map(|v| format!("{} IN {}", aql.value(BindValue::from_json(v)), path))
                    .collect();
                format!("({})", tests.join(" OR "))
            }
        };
        fragment.push_str(" AND ");
        fragment.push_str(&clause);
    }

    Ok(fragment)
}

/// `SORT` line for the requested order, or newest first
pub fn compile_sort(aql: &mut AqlBuilder, sorts: &[SortSpec], alias: &str, audit: &AuditFields) -> String {
    let keys: Vec<_> = effective_sorts(sorts, &audit.created_at, &audit.id)
        .iter()
        .map(|spec| format!("{} {}", aql.access(alias, &spec.field), spec.direction().keyword()))
        .collect();
    format!("SORT {}", keys.join(", "))
}
