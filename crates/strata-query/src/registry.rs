use crate::audit::AuditFields;
use crate::entity::EntityRegistry;
use crate::error::{QueryError, Result};
use crate::executor::QueryExecutor;
use crate::repository::Repository;
use crate::traits::{Driver, QueryDialect};
use crate::types::BackendKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Drivers available to open connections, one per backend family
pub struct DriverRegistry {
    drivers: Arc<RwLock<HashMap<BackendKind, Arc<dyn Driver>>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a driver for its backend
    pub async fn register(&self, driver: Arc<dyn Driver>) {
        let backend = driver.backend();
        let mut drivers = self.drivers.write().await;

        if drivers.contains_key(&backend) {
            warn!("Overwriting existing driver for backend: {}", backend);
        }

        drivers.insert(backend, driver);
        debug!("Registered driver for backend: {}", backend);
    }

    pub async fn get(&self, backend: BackendKind) -> Result<Arc<dyn Driver>> {
        let drivers = self.drivers.read().await;
        drivers.get(&backend).cloned().ok_or_else(|| {
            QueryError::configuration(format!("No driver registered for backend: {}", backend))
        })
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection cache of repositories, built once per entity name
pub struct RepositoryRegistry {
    entities: Arc<EntityRegistry>,
    dialect: Arc<dyn QueryDialect>,
    executor: QueryExecutor,
    audit: AuditFields,
    repositories: RwLock<HashMap<String, Arc<Repository>>>,
}

impl RepositoryRegistry {
    pub fn new(
        entities: Arc<EntityRegistry>,
        dialect: Arc<dyn QueryDialect>,
        executor: QueryExecutor,
        audit: AuditFields,
    ) -> Self {
        Self {
            entities,
            dialect,
            executor,
            audit,
            repositories: RwLock::new(HashMap::new()),
        }
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Repository for `name`, building it on first use.
    /// Never touches the backend.
    pub async fn resolve(&self, name: &str) -> Result<Arc<Repository>> {
        if self.entities.is_empty() {
            return Err(QueryError::configuration("no entities are registered"));
        }
        let record = self.entities.get(name).ok_or_else(|| {
            QueryError::configuration(format!("entity '{}' is not registered", name))
        })?;

        if let Some(repository) = self.repositories.read().await.get(name) {
            return Ok(repository.clone());
        }

        let mut repositories = self.repositories.write().await;
        let repository = repositories
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Building repository for {} '{}'", record.kind, name);
                Arc::new(Repository::new(
                    record.clone(),
                    self.dialect.clone(),
                    self.executor.clone(),
                    self.audit.clone(),
                ))
            })
            .clone();
        Ok(repository)
    }

    /// Build a repository for every registered entity
    pub async fn preload(&self) -> Result<usize> {
        if self.entities.is_empty() {
            return Err(QueryError::configuration(
                "cannot preload repositories: no entities are registered",
            ));
        }
        for name in self.entities.names() {
            self.resolve(name).await?;
        }
        Ok(self.len().await)
    }

    pub async fn len(&self) -> usize {
        self.repositories.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.repositories.read().await.is_empty()
    }

    pub(crate) async fn clear(&self) {
        self.repositories.write().await.clear();
    }
}
