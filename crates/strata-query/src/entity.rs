use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Table,
    View,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Table => f.write_str("table"),
            EntityKind::View => f.write_str("view"),
        }
    }
}

/// A Rust type bound to a table, view or collection
pub trait Entity: 'static {
    const NAME: &'static str;
    const KIND: EntityKind = EntityKind::Table;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub name: String,
    pub kind: EntityKind,
    pub type_name: Option<&'static str>,
}

impl EntityRecord {
    pub fn is_writable(&self) -> bool {
        self.kind == EntityKind::Table
    }
}

/// Names every entity a connection may serve.
///
/// Built during bootstrap and handed to the connection; names are unique.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    records: HashMap<String, EntityRecord>,
    by_type: HashMap<TypeId, String>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed entity under its declared name and kind
    pub fn register<E: Entity>(&mut self) -> Result<&mut Self> {
        self.insert(E::NAME, E::KIND, Some(type_name::<E>()))?;
        self.by_type.insert(TypeId::of::<E>(), E::NAME.to_string());
        Ok(self)
    }

    /// Register a name without a Rust type behind it
    pub fn register_named(&mut self, name: impl Into<String>, kind: EntityKind) -> Result<&mut Self> {
        self.insert(name, kind, None)?;
        Ok(self)
    }

    fn insert(
        &mut self,
        name: impl Into<String>,
        kind: EntityKind,
        type_name: Option<&'static str>,
    ) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(QueryError::configuration("entity name must not be empty"));
        }
        if let Some(existing) = self.records.get(&name) {
            return Err(QueryError::configuration(format!(
                "entity name '{}' is already registered as a {}",
                name, existing.kind
            )));
        }

        debug!("Registered {} entity: {}", kind, name);
        self.records.insert(
            name.clone(),
            EntityRecord {
                name,
                kind,
                type_name,
            },
        );
        Ok(())
    }

    /// Table name registered for `E`
    pub fn lookup<E: Entity>(&self) -> Result<&str> {
        self.by_type
            .get(&TypeId::of::<E>())
            .map(String::as_str)
            .ok_or_else(|| {
                QueryError::configuration(format!(
                    "type {} is not a registered entity",
                    type_name::<E>()
                ))
            })
    }

    pub fn get(&self, name: &str) -> Option<&EntityRecord> {
        self.records.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.records.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
