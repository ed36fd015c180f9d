//! ArangoDB backend for strata-query
//!
//! Compiles filters into AQL with bind variables and runs them through the
//! HTTP cursor API. Pages are answered in a single round trip.

pub mod aql;
pub mod dialect;
pub mod filter;
pub mod session;

pub use dialect::ArangoDialect;
pub use session::ArangoSession;

use async_trait::async_trait;
use std::sync::Arc;
use strata_query::{BackendKind, ConnectionConfig, ConnectionHandle, Driver, QueryDialect, QueryError, Result};

/// Driver opening [`ArangoSession`]s
#[derive(Debug, Default)]
pub struct ArangoDriver;

impl ArangoDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for ArangoDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::ArangoDb
    }

    fn dialect(&self) -> Arc<dyn QueryDialect> {
        Arc::new(ArangoDialect::new())
    }

    async fn acquire(&self, config: &ConnectionConfig) -> Result<Arc<dyn ConnectionHandle>> {
        if config.backend != BackendKind::ArangoDb {
            return Err(QueryError::configuration(format!(
                "ArangoDB driver cannot open a {} connection",
                config.backend
            )));
        }
        let session = ArangoSession::connect(config).await?;
        Ok(Arc::new(session))
    }
}
