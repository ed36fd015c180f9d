use crate::config::ConnectionConfig;
use crate::entity::{Entity, EntityRegistry};
use crate::error::{Operation, QueryError, Result};
use crate::executor::QueryExecutor;
use crate::registry::{DriverRegistry, RepositoryRegistry};
use crate::repository::Repository;
use crate::traits::{ConnectionHandle, Driver};
use crate::types::{BackendKind, Execution, RawBinds, RawStatement};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// An open backend connection with its repository cache
pub struct Connection {
    config: ConnectionConfig,
    driver: Arc<dyn Driver>,
    executor: QueryExecutor,
    repositories: RepositoryRegistry,
}

impl Connection {
    /// Acquire a connection through the driver registered for the
    /// configured backend. Repositories are built lazily.
    pub async fn open(
        drivers: &DriverRegistry,
        config: ConnectionConfig,
        entities: Arc<EntityRegistry>,
    ) -> Result<Self> {
        let driver = drivers.get(config.backend).await?;
        Self::with_driver(driver, config, entities).await
    }

    /// Like [`Connection::open`] but builds every repository up front.
    /// An empty entity registry is fatal.
    pub async fn open_eager(
        drivers: &DriverRegistry,
        config: ConnectionConfig,
        entities: Arc<EntityRegistry>,
    ) -> Result<Self> {
        if entities.is_empty() {
            return Err(QueryError::configuration(
                "eager initialization needs at least one registered entity",
            ));
        }
        let connection = Self::open(drivers, config, entities).await?;
        let preloaded = connection.repositories.preload().await;
        match preloaded {
            Ok(count) => {
                debug!("Preloaded {} repositories", count);
                Ok(connection)
            }
            Err(e) => {
                let _ = connection.close().await;
                Err(e)
            }
        }
    }

    pub async fn with_driver(
        driver: Arc<dyn Driver>,
        config: ConnectionConfig,
        entities: Arc<EntityRegistry>,
    ) -> Result<Self> {
        debug!("Opening connection: {}", config.connection_string());
        let handle = driver.acquire(&config).await.map_err(|e| {
            error!("Failed to open {}: {}", config.connection_string(), e);
            e
        })?;

        if handle.backend() != config.backend {
            let actual = handle.backend();
            let _ = driver.release(handle).await;
            return Err(QueryError::configuration(format!(
                "driver returned a {} handle for a {} configuration",
                actual, config.backend
            )));
        }

        Ok(Self::from_parts(driver, handle, config, entities))
    }

    /// Assemble a connection around an already acquired handle
    pub fn from_parts(
        driver: Arc<dyn Driver>,
        handle: Arc<dyn ConnectionHandle>,
        config: ConnectionConfig,
        entities: Arc<EntityRegistry>,
    ) -> Self {
        let executor = QueryExecutor::new(handle).with_default_timeout(
            config.statement_timeout_ms.map(Duration::from_millis),
        );
        let repositories = RepositoryRegistry::new(
            entities,
            driver.dialect(),
            executor.clone(),
            config.audit_fields(),
        );

        Self {
            config,
            driver,
            executor,
            repositories,
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.config.backend
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn handle(&self) -> &Arc<dyn ConnectionHandle> {
        self.executor.handle()
    }

    pub fn repositories(&self) -> &RepositoryRegistry {
        &self.repositories
    }

    /// Repository for a typed entity
    pub async fn repository<E: Entity>(&self) -> Result<Arc<Repository>> {
        let name = self.repositories.entities().lookup::<E>()?.to_string();
        self.repositories.resolve(&name).await
    }

    pub async fn repository_by_name(&self, name: &str) -> Result<Arc<Repository>> {
        self.repositories.resolve(name).await
    }

    /// Run caller-written statement text. No filter compilation happens;
    /// keeping it injection-safe is up to the caller.
    pub async fn execute_raw(&self, raw: RawStatement) -> Result<Execution> {
        let target = self.config.connection_string();
        if self.backend().is_relational() && matches!(raw.binds, RawBinds::Named(_)) {
            return Err(QueryError::compilation(format!(
                "{} statements take positional binds",
                self.backend()
            ))
            .during(Operation::ExecuteRaw, target));
        }

        let timeout = raw.timeout_ms.map(Duration::from_millis);
        let statement = raw.into_statement();
        self.executor
            .execute(&statement, timeout)
            .await
            .map_err(|e| e.during(Operation::ExecuteRaw, target))
    }

    /// Drop cached repositories and release the handle
    pub async fn close(self) -> Result<()> {
        debug!("Closing connection: {}", self.config.connection_string());
        self.repositories.clear().await;
        let handle = self.executor.handle().clone();
        self.driver.release(handle).await
    }
}
