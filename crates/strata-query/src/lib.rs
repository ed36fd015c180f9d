//! # strata-query
//!
//! Backend-agnostic filter, sort and pagination over document and
//! relational stores.
//!
//! Callers describe what they want with a [`FilterExpression`], a list of
//! [`SortSpec`]s and a page cursor. A backend dialect compiles that into a
//! native statement (an AQL script, a SQL statement), the [`QueryExecutor`]
//! runs it and the [`Repository`] normalizes the answer into a
//! [`PageResult`] or a [`MutationOutcome`].
//!
//! ## Architecture
//!
//! - **Driver**: acquires and releases [`ConnectionHandle`]s for one backend
//! - **QueryDialect**: pure compiler from descriptors to [`Statement`]s
//! - **QueryExecutor**: the only place statements reach a backend
//! - **Repository**: pagination and the mutation pipeline for one entity
//! - **RepositoryRegistry**: builds each repository once per connection
//!
//! Every read only sees rows whose active flag is `true`; deletes flip the
//! flag and stamp a deletion time.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_query::{
//!     BackendKind, Connection, ConnectionConfig, DriverRegistry, Entity, EntityRegistry,
//!     FilterExpression, PageRequest,
//! };
//!
//! struct User;
//! impl Entity for User {
//!     const NAME: &'static str = "users";
//! }
//!
//! # async fn example(drivers: DriverRegistry) -> strata_query::Result<()> {
//! let mut entities = EntityRegistry::new();
//! entities.register::<User>()?;
//!
//! let config = ConnectionConfig::new(BackendKind::Postgres)
//!     .with_host("localhost")
//!     .with_port(5432)
//!     .with_database("app");
//!
//! let connection = Connection::open(&drivers, config, Arc::new(entities)).await?;
//! let users = connection.repository::<User>().await?;
//! let page = users
//!     .get_page(&PageRequest::new(1, 10).with_filter(FilterExpression::new().eq("city", "Oslo")))
//!     .await?;
//! println!("{} of {}", page.list.len(), page.total);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod executor;
pub mod filter;
pub mod mutation;
pub mod pagination;
pub mod params;
pub mod registry;
pub mod repository;
pub mod traits;
pub mod types;

pub use audit::AuditFields;
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use entity::{Entity, EntityKind, EntityRecord, EntityRegistry};
pub use error::{ErrorKind, ExecutionError, Operation, QueryError, Result, WriteState};
pub use executor::QueryExecutor;
pub use filter::{Criterion, FilterExpression, Operator, SortDirection, SortSpec};
pub use pagination::{PageRequest, PageResult, PageWindow};
pub use params::{DeletesByFilter, ExecuteProcedure, GetsByFilter, Save, Saves, UpdatesByFilter};
pub use registry::{DriverRegistry, RepositoryRegistry};
pub use repository::Repository;
pub use traits::{ConnectionHandle, Driver, PagePlan, QueryDialect, TableScope};
pub use types::{
    BackendKind, Bind, BindDirection, BindValue, DataRow, Execution, MutationOutcome, OutBinds,
    QueryOptions, RawBinds, RawStatement, Statement, StatementKind,
};
