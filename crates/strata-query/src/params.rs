//! Request shapes accepted by repository operations.
//!
//! [`parse`] turns loosely typed JSON into one of these, reporting shape
//! problems as validation errors before any statement is compiled.

use crate::error::{QueryError, Result};
use crate::filter::{FilterExpression, SortSpec};
use crate::types::{DataRow, QueryOptions};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetsByFilter {
    #[serde(default)]
    pub filter: FilterExpression,
    #[serde(default)]
    pub sorts: Vec<SortSpec>,
    #[serde(default)]
    pub options: QueryOptions,
}

impl GetsByFilter {
    pub fn new(filter: FilterExpression) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn with_sorts(mut self, sorts: Vec<SortSpec>) -> Self {
        self.sorts = sorts;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Save {
    pub payload: DataRow,
    #[serde(default)]
    pub options: QueryOptions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Saves {
    pub payloads: Vec<DataRow>,
    #[serde(default)]
    pub options: QueryOptions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesByFilter {
    pub filter: FilterExpression,
    pub new_payload: DataRow,
    #[serde(default)]
    pub options: QueryOptions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletesByFilter {
    pub filter: FilterExpression,
    #[serde(default)]
    pub options: QueryOptions,
}

/// Arguments for a stored procedure, passed in order
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteProcedure {
    #[serde(default)]
    pub binds: Vec<serde_json::Value>,
    #[serde(default)]
    pub options: QueryOptions,
}

/// Deserialize a request, mapping shape errors to `Validation`.
///
/// The filter is built first so an unknown or malformed operator keeps its
/// `Compilation` kind instead of being flattened into a serde error.
pub fn parse<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    if let Some(filter) = value.get("filter") {
        FilterExpression::from_json(filter)?;
    }
    serde_json::from_value(value).map_err(|e| QueryError::validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_update_requires_filter_and_payload() {
        let err = parse::<UpdatesByFilter>(json!({"newPayload": {"a": 1}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = parse::<UpdatesByFilter>(json!({"filter": {"id": 7}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let ok = parse::<UpdatesByFilter>(json!({
            "filter": {"id": 7},
            "newPayload": {"status": "x"},
            "options": {"returns": ["id"]}
        }))
        .unwrap();
        assert_eq!(ok.new_payload["status"], json!("x"));
        assert_eq!(ok.options.returns, vec!["id"]);
    }

    #[test]
    fn test_unknown_operator_is_a_compilation_error() {
        let err = parse::<DeletesByFilter>(json!({"filter": {"a": {"opr": "~~", "value": 1}}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compilation);

        let err = parse::<GetsByFilter>(json!({"filter": {"a": {"opr": "IN", "value": 1}}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compilation);
    }

    #[test]
    fn test_non_object_filter_is_a_validation_error() {
        let err = parse::<DeletesByFilter>(json!({"filter": "id = 1"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_procedure_binds_keep_their_order() {
        let request = parse::<ExecuteProcedure>(json!({
            "binds": [3, "x", null],
            "options": {"schema": "sales"}
        }))
        .unwrap();
        assert_eq!(request.binds, vec![json!(3), json!("x"), json!(null)]);
        assert_eq!(request.options.schema.as_deref(), Some("sales"));

        let err = parse::<ExecuteProcedure>(json!({"binds": {"a": 1}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_gets_by_filter_defaults() {
        let request = parse::<GetsByFilter>(json!({})).unwrap();
        assert!(request.filter.is_empty());
        assert!(request.sorts.is_empty());
    }
}
