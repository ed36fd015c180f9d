use crate::types::BackendKind;
use serde::{Deserialize, Serialize};

/// Attribute names the repository layer maintains on every row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFields {
    /// Unique identity, used as the sort tie-break and the default return
    pub id: String,
    /// Soft-delete flag; only rows where it is `true` are visible
    pub active: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: String,
    /// Attributes callers can never write
    pub protected: Vec<String>,
}

impl AuditFields {
    /// Layout used by document collections
    pub fn document() -> Self {
        Self {
            id: "_id".to_string(),
            active: "_status".to_string(),
            created_at: "_create_date".to_string(),
            updated_at: "_update_date".to_string(),
            deleted_at: "_delete_date".to_string(),
            protected: ["_id", "_rev", "_key", "_status", "_create_date"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Layout used by relational tables
    pub fn relational() -> Self {
        Self {
            id: "id".to_string(),
            active: "_status".to_string(),
            created_at: "_create_date".to_string(),
            updated_at: "_update_date".to_string(),
            deleted_at: "_delete_date".to_string(),
            protected: ["id", "_id", "_status", "_create_date"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn for_backend(backend: BackendKind) -> Self {
        if backend.is_relational() {
            Self::relational()
        } else {
            Self::document()
        }
    }

    pub fn is_protected(&self, attribute: &str) -> bool {
        self.protected.iter().any(|p| p == attribute)
    }

    /// Returned columns for a mutation: requested ones or the identity
    pub fn returns(&self, requested: &[String]) -> Vec<String> {
        if requested.is_empty() {
            vec![self.id.clone()]
        } else {
            requested.to_vec()
        }
    }
}
