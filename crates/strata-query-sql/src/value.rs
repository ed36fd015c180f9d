//! Conversions between bind values and sea-query values.

use sea_orm::sea_query::{Expr, SimpleExpr, Value};
use strata_query::{BindValue, QueryError, Result};

/// Bind value to the value sea-query parameterizes.
///
/// Lists travel as JSON arrays.
pub fn to_sea(value: &BindValue) -> Value {
    match value {
        BindValue::Null => Value::String(None),
        BindValue::Bool(b) => Value::from(*b),
        BindValue::Int(i) => Value::from(*i),
        BindValue::Float(f) => Value::from(*f),
        BindValue::Text(s) => Value::from(s.clone()),
        BindValue::Timestamp(ts) => Value::from(*ts),
        BindValue::List(_) => Value::from(value.to_json()),
        BindValue::Json(json) => Value::from(json.clone()),
    }
}

/// Parameter produced by a query builder back into a bind value
pub fn from_sea(value: Value) -> Result<BindValue> {
    let bind = match value {
        Value::Bool(Some(b)) => BindValue::Bool(b),
        Value::TinyInt(Some(v)) => BindValue::Int(v.into()),
        Value::SmallInt(Some(v)) => BindValue::Int(v.into()),
        Value::Int(Some(v)) => BindValue::Int(v.into()),
        Value::BigInt(Some(v)) => BindValue::Int(v),
        Value::TinyUnsigned(Some(v)) => BindValue::Int(v.into()),
        Value::SmallUnsigned(Some(v)) => BindValue::Int(v.into()),
        Value::Unsigned(Some(v)) => BindValue::Int(v.into()),
        Value::BigUnsigned(Some(v)) => BindValue::Int(
            i64::try_from(v).map_err(|_| QueryError::compilation(format!("integer {} out of range", v)))?,
        ),
        Value::Float(Some(v)) => BindValue::Float(v.into()),
        Value::Double(Some(v)) => BindValue::Float(v),
        Value::String(Some(s)) => BindValue::Text(s.to_string()),
        Value::ChronoDateTimeUtc(Some(ts)) => BindValue::Timestamp(*ts),
        Value::Json(Some(json)) => BindValue::Json(*json),
        Value::String(None) | Value::Bool(None) | Value::BigInt(None) | Value::Json(None) => BindValue::Null,
        other => {
            return Err(QueryError::compilation(format!(
                "unsupported parameter type: {:?}",
                other
            )))
        }
    };
    Ok(bind)
}

/// Expression for a payload value. `null` is written as the SQL keyword.
pub fn literal(value: &serde_json::Value) -> SimpleExpr {
    match value {
        serde_json::Value::Null => Expr::cust("NULL"),
        other => SimpleExpr::Value(to_sea(&BindValue::from_json(other))),
    }
}

/// Scalar filter operand; arrays and objects are rejected
pub fn scalar(key: &str, value: &serde_json::Value) -> Result<Value> {
    match value {
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(QueryError::compilation(format!(
            "filter on '{}' expects a scalar value",
            key
        ))),
        other => Ok(to_sea(&BindValue::from_json(other))),
    }
}
