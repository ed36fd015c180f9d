use crate::audit::AuditFields;
use crate::error::{QueryError, Result};
use crate::types::{DataRow, Execution, MutationOutcome};
use serde_json::Value;
use tracing::debug;

/// Remove attributes callers may not write
pub fn strip_protected(payload: &DataRow, audit: &AuditFields) -> DataRow {
    payload
        .iter()
        .filter(|(key, _)| {
            let protected = audit.is_protected(key);
            if protected {
                debug!("Dropping protected attribute '{}' from payload", key);
            }
            !protected
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Check and clean a row about to be inserted.
///
/// Protected attributes are dropped before the blank check, so a null
/// identity sent by the caller is ignored rather than rejected.
pub fn prepare_insert(payload: &DataRow, audit: &AuditFields) -> Result<DataRow> {
    if payload.is_empty() {
        return Err(QueryError::validation("payload needs at least one attribute"));
    }
    let cleaned = strip_protected(payload, audit);
    if cleaned.is_empty() {
        return Err(QueryError::validation(
            "payload only contains protected attributes",
        ));
    }

    for (key, value) in &cleaned {
        let blank = match value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        };
        if blank {
            return Err(QueryError::validation(format!(
                "attribute '{}' must not be null or empty",
                key
            )));
        }
    }
    Ok(cleaned)
}

/// Clean a merge payload; something must be left to set
pub fn prepare_update(payload: &DataRow, audit: &AuditFields) -> Result<DataRow> {
    let cleaned = strip_protected(payload, audit);
    if cleaned.is_empty() {
        return Err(QueryError::validation("update payload has nothing to set"));
    }
    Ok(cleaned)
}

/// Fold an execution into identifiers and returned columns
pub fn outcome(execution: Execution, id_column: &str) -> MutationOutcome {
    let returning = execution.out_binds.unwrap_or_default();
    let identifiers = returning.get(id_column).cloned().unwrap_or_default();
    MutationOutcome {
        affected: execution.row_count,
        identifiers,
        returning,
    }
}
