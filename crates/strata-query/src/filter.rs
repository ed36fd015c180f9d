//! Backend-neutral filter and sort descriptors.
//!
//! A [`FilterExpression`] maps attribute names to a [`Criterion`]. Backends
//! compile it into their own predicate language; this module owns the shape
//! of the input and the order clauses are emitted in.

use crate::error::{QueryError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Comparison keyword accepted in `{ "opr": ..., "value": ... }` filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Like,
    RegexMatch,
    RegexNotMatch,
}

impl Operator {
    /// Parse an operator keyword. `POSITION` is not an operator here; it
    /// becomes [`Criterion::Position`].
    pub fn parse(keyword: &str) -> Result<Self> {
        let normalized = keyword.trim().to_ascii_uppercase();
        let op = match normalized.as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "LIKE" => Operator::Like,
            "=~" => Operator::RegexMatch,
            "!~" => Operator::RegexNotMatch,
            _ => {
                return Err(QueryError::compilation(format!(
                    "unknown filter operator '{}'",
                    keyword
                )))
            }
        };
        Ok(op)
    }

    /// Operators whose operand must be a list
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
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
        };
        f.write_str(keyword)
    }
}

/// Condition on a single attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// attribute equals value (`null` tests for absence)
    Equals(Value),
    /// attribute is one of the values; an empty list matches nothing
    In(Vec<Value>),
    Operator { op: Operator, value: Value },
    /// multi-valued attribute contains at least one of the values
    Position(Vec<Value>),
}

impl Criterion {
    fn group(&self) -> u8 {
        match self {
            Criterion::Equals(_) | Criterion::In(_) => 0,
            Criterion::Operator { .. } => 1,
            Criterion::Position(_) => 2,
        }
    }

    fn from_json(key: &str, value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Array(items) => Ok(Some(Criterion::In(items.clone()))),
            Value::Object(map) => {
                let Some(opr) = map.get("opr") else {
                    warn!(
                        "Filter on '{}' is an object without 'opr'; ignoring it",
                        key
                    );
                    return Ok(None);
                };
                let opr = opr.as_str().ok_or_else(|| {
                    QueryError::compilation(format!("operator for '{}' must be a string", key))
                })?;
                let operand = map.get("value").cloned().unwrap_or(Value::Null);

                if opr.trim().eq_ignore_ascii_case("POSITION") {
                    let values = match operand {
                        Value::Array(items) => items,
                        Value::Null => Vec::new(),
                        other => vec![other],
                    };
                    return Ok(Some(Criterion::Position(values)));
                }

                let op = Operator::parse(opr)?;
                if op.takes_list() && !operand.is_array() {
                    return Err(QueryError::compilation(format!(
                        "operator {} on '{}' needs a list operand",
                        op, key
                    )));
                }
                Ok(Some(Criterion::Operator { op, value: operand }))
            }
            scalar => Ok(Some(Criterion::Equals(scalar.clone()))),
        }
    }
}

/// Attribute-to-criterion map; deterministic iteration by attribute name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    criteria: BTreeMap<String, Criterion>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria
            .insert(key.into(), Criterion::Equals(value.into()));
        self
    }

    pub fn is_in<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.criteria.insert(
            key.into(),
            Criterion::In(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    pub fn op(mut self, key: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.criteria.insert(
            key.into(),
            Criterion::Operator {
                op,
                value: value.into(),
            },
        );
        self
    }

    pub fn position<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.criteria.insert(
            key.into(),
            Criterion::Position(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Build from the dynamic JSON form:
    /// array → membership, object with `opr` → operator, scalar → equality.
    /// Objects without `opr` are skipped.
    pub fn from_json(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(QueryError::validation(format!(
                    "filter must be an object, got {}",
                    other
                )))
            }
        };

        let mut criteria = BTreeMap::new();
        for (key, raw) in map {
            if let Some(criterion) = Criterion::from_json(key, raw)? {
                criteria.insert(key.clone(), criterion);
            }
        }
        Ok(Self { criteria })
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// Clauses in emission order: equality and membership, then explicit
    /// operators, then POSITION; by attribute name within each group.
    pub fn clauses(&self) -> Vec<(&str, &Criterion)> {
        let mut clauses: Vec<_> = self
            .criteria
            .iter()
            .map(|(k, c)| (k.as_str(), c))
            .collect();
        clauses.sort_by_key(|(_, c)| c.group());
        clauses
    }
}

impl<'de> Deserialize<'de> for FilterExpression {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        FilterExpression::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One ordering key. A missing direction sorts ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default, alias = "sort", alias = "order")]
    pub direction: Option<SortDirection>,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Some(SortDirection::Asc),
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Some(SortDirection::Desc),
        }
    }

    pub fn direction(&self) -> SortDirection {
        self.direction.unwrap_or_default()
    }
}

/// Requested ordering, or the newest-first default when empty
pub fn effective_sorts(sorts: &[SortSpec], created: &str, id: &str) -> Vec<SortSpec> {
    if sorts.is_empty() {
        vec![SortSpec::desc(created), SortSpec::desc(id)]
    } else {
        sorts.to_vec()
    }
}
