use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp layout used when a backend stores audit stamps as text
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Backend family a connection talks to. Chosen once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(alias = "arango")]
    ArangoDb,
    #[serde(alias = "postgresql")]
    Postgres,
    MySql,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ArangoDb => "arangodb",
            BackendKind::Postgres => "postgres",
            BackendKind::MySql => "mysql",
        }
    }

    pub fn is_relational(&self) -> bool {
        !matches!(self, BackendKind::ArangoDb)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of data as a map of attribute names to values.
/// Ordered so that generated column lists are deterministic.
pub type DataRow = BTreeMap<String, serde_json::Value>;

/// Values captured through out-bound bindings, keyed by binding name.
/// One entry per affected row.
pub type OutBinds = BTreeMap<String, Vec<serde_json::Value>>;

/// Parameter value in a compiled statement
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    List(Vec<BindValue>),
    Json(serde_json::Value),
}

impl BindValue {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => BindValue::Null,
            serde_json::Value::Bool(b) => BindValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => BindValue::Int(i),
                None => BindValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => BindValue::Text(s.clone()),
            serde_json::Value::Array(items) => {
                BindValue::List(items.iter().map(BindValue::from_json).collect())
            }
            serde_json::Value::Object(_) => BindValue::Json(value.clone()),
        }
    }

    /// JSON rendering; timestamps use [`TIMESTAMP_FORMAT`]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BindValue::Null => serde_json::Value::Null,
            BindValue::Bool(b) => serde_json::Value::Bool(*b),
            BindValue::Int(i) => serde_json::Value::from(*i),
            BindValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            BindValue::Text(s) => serde_json::Value::String(s.clone()),
            BindValue::Timestamp(t) => {
                serde_json::Value::String(t.format(TIMESTAMP_FORMAT).to_string())
            }
            BindValue::List(items) => {
                serde_json::Value::Array(items.iter().map(BindValue::to_json).collect())
            }
            BindValue::Json(v) => v.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Int(value)
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        BindValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for BindValue {
    fn from(value: DateTime<Utc>) -> Self {
        BindValue::Timestamp(value)
    }
}

/// Direction of a statement parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindDirection {
    /// Value supplied by the caller
    In,
    /// Slot filled by the backend (returning columns, generated keys)
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub name: String,
    pub direction: BindDirection,
    pub value: BindValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Insert,
    Update,
    /// Caller-supplied text; mutation status unknown
    Raw,
}

impl StatementKind {
    pub fn is_mutation(&self) -> bool {
        matches!(self, StatementKind::Insert | StatementKind::Update)
    }
}

/// A compiled, backend-native statement with its bindings
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub binds: Vec<Bind>,
    pub kind: StatementKind,
    /// Read executed in the same transaction before `text` to capture
    /// out-bound values on backends without a returning clause
    pub probe: Option<Box<Statement>>,
}

impl Statement {
    pub fn new(kind: StatementKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            binds: Vec::new(),
            kind,
            probe: None,
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: BindValue) -> Self {
        self.push_bind(name, value);
        self
    }

    pub fn push_bind(&mut self, name: impl Into<String>, value: BindValue) {
        self.binds.push(Bind {
            name: name.into(),
            direction: BindDirection::In,
            value,
        });
    }

    pub fn out(mut self, name: impl Into<String>) -> Self {
        self.binds.push(Bind {
            name: name.into(),
            direction: BindDirection::Out,
            value: BindValue::Null,
        });
        self
    }

    pub fn with_probe(mut self, probe: Statement) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn in_binds(&self) -> impl Iterator<Item = &Bind> {
        self.binds.iter().filter(|b| b.direction == BindDirection::In)
    }

    pub fn out_names(&self) -> Vec<&str> {
        self.binds
            .iter()
            .filter(|b| b.direction == BindDirection::Out)
            .map(|b| b.name.as_str())
            .collect()
    }

    pub fn has_out_binds(&self) -> bool {
        self.binds.iter().any(|b| b.direction == BindDirection::Out)
    }
}

/// Result of running one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    pub rows: Vec<DataRow>,
    /// Rows returned for reads, rows affected for writes
    pub row_count: u64,
    pub out_binds: Option<OutBinds>,
}

/// Per-call options shared by reads and mutations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    /// Attributes to project in reads; empty keeps everything
    pub keep_attrs: Vec<String>,
    /// Relational namespace qualifying the table
    pub schema: Option<String>,
    /// Columns to bind back from mutations; empty means the identity column
    pub returns: Vec<String>,
    /// Statement timeout override in milliseconds
    pub timeout_ms: Option<u64>,
}

impl QueryOptions {
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_returns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keep_attrs<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep_attrs = attrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout_ms(mut self, millis: u64) -> Self {
        self.timeout_ms = Some(millis);
        self
    }
}

/// Outcome of a write through the mutation pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub affected: u64,
    /// Values of the identity column for every written row
    pub identifiers: Vec<serde_json::Value>,
    /// Every out-bound value, keyed by column
    pub returning: OutBinds,
}

/// Bindings for a caller-supplied statement
#[derive(Debug, Clone, PartialEq)]
pub enum RawBinds {
    /// `$1`, `?`-style parameters, in order
    Positional(Vec<BindValue>),
    /// `@name`-style parameters
    Named(BTreeMap<String, BindValue>),
}

/// Escape hatch: statement text written by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatement {
    pub text: String,
    pub binds: RawBinds,
    /// Names of out-bound bindings to collect from the result
    pub outs: Vec<String>,
    pub timeout_ms: Option<u64>,
}

impl RawStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            binds: RawBinds::Positional(Vec::new()),
            outs: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn positional(mut self, binds: Vec<BindValue>) -> Self {
        self.binds = RawBinds::Positional(binds);
        self
    }

    pub fn named(mut self, binds: BTreeMap<String, BindValue>) -> Self {
        self.binds = RawBinds::Named(binds);
        self
    }

    pub fn with_out(mut self, name: impl Into<String>) -> Self {
        self.outs.push(name.into());
        self
    }

    pub(crate) fn into_statement(self) -> Statement {
        let mut statement = Statement::new(StatementKind::Raw, self.text);
        match self.binds {
            RawBinds::Positional(values) => {
                for (idx, value) in values.into_iter().enumerate() {
                    statement.push_bind((idx + 1).to_string(), value);
                }
            }
            RawBinds::Named(values) => {
                for (name, value) in values {
                    statement.push_bind(name, value);
                }
            }
        }
        for name in self.outs {
            statement = statement.out(name);
        }
        statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_bind_value_from_json() {
        assert_eq!(BindValue::from_json(&json!(7)), BindValue::Int(7));
        assert_eq!(BindValue::from_json(&json!(1.5)), BindValue::Float(1.5));
        assert_eq!(
            BindValue::from_json(&json!(["a", 1])),
            BindValue::List(vec![BindValue::Text("a".into()), BindValue::Int(1)])
        );
        assert_eq!(
            BindValue::from_json(&json!({"k": 1})),
            BindValue::Json(json!({"k": 1}))
        );
    }

    #[test]
    fn test_timestamp_renders_in_storage_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(BindValue::Timestamp(ts).to_json(), json!("2024-03-09 07:05:01"));
    }

    #[test]
    fn test_raw_positional_binds_are_numbered() {
        let statement = RawStatement::new("SELECT * FROM users WHERE id = $1 AND name = $2")
            .positional(vec![BindValue::Int(1), "bob".into()])
            .with_out("id")
            .into_statement();

        let names: Vec<_> = statement.in_binds().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["1", "2"]);
        assert_eq!(statement.out_names(), vec!["id"]);
        assert_eq!(statement.kind, StatementKind::Raw);
    }

    #[test]
    fn test_query_options_deserialize_camel_case() {
        let options: QueryOptions = serde_json::from_value(json!({
            "keepAttrs": ["name"],
            "schema": "crm",
            "returns": ["id", "code"]
        }))
        .unwrap();

        assert_eq!(options.keep_attrs, vec!["name"]);
        assert_eq!(options.schema.as_deref(), Some("crm"));
        assert_eq!(options.returns, vec!["id", "code"]);
        assert_eq!(options.timeout_ms, None);
    }
}
