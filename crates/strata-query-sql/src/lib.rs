//! Relational backends for strata-query
//!
//! Filters compile to parameterized SQL through sea-query and run on a
//! sea-orm connection pool. PostgreSQL and MySQL are supported.

pub mod dialect;
pub mod filter;
pub mod session;
pub mod value;

pub use dialect::{SqlDialect, SqlFlavor};
pub use session::SqlSession;

use async_trait::async_trait;
use std::sync::Arc;
use strata_query::{BackendKind, ConnectionConfig, ConnectionHandle, Driver, QueryDialect, QueryError, Result};

/// Driver opening [`SqlSession`]s for one SQL flavor
#[derive(Debug, Clone, Copy)]
pub struct SqlDriver {
    flavor: SqlFlavor,
}

impl SqlDriver {
    pub fn new(flavor: SqlFlavor) -> Self {
        Self { flavor }
    }

    pub fn postgres() -> Self {
        Self::new(SqlFlavor::Postgres)
    }

    pub fn mysql() -> Self {
        Self::new(SqlFlavor::MySql)
    }
}

#[async_trait]
impl Driver for SqlDriver {
    fn backend(&self) -> BackendKind {
        self.flavor.backend()
    }

    fn dialect(&self) -> Arc<dyn QueryDialect> {
        Arc::new(SqlDialect::new(self.flavor))
    }

    async fn acquire(&self, config: &ConnectionConfig) -> Result<Arc<dyn ConnectionHandle>> {
        if SqlFlavor::for_backend(config.backend) != Some(self.flavor) {
            return Err(QueryError::configuration(format!(
                "{} driver cannot open a {} connection",
                self.flavor.backend(),
                config.backend
            )));
        }
        let session = SqlSession::connect(config, self.flavor).await?;
        Ok(Arc::new(session))
    }
}
