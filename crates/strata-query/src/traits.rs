use crate::audit::AuditFields;
use crate::config::ConnectionConfig;
use crate::error::{ExecutionError, QueryError, Result};
use crate::filter::{FilterExpression, SortSpec};
use crate::pagination::PageWindow;
use crate::types::{BackendKind, BindValue, DataRow, Execution, Statement};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use downcast_rs::{impl_downcast, DowncastSync};
use std::sync::Arc;

/// Table or collection a statement targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableScope {
    pub table: String,
    pub schema: Option<String>,
    pub audit: AuditFields,
}

impl TableScope {
    pub fn new(table: impl Into<String>, audit: AuditFields) -> Self {
        Self {
            table: table.into(),
            schema: None,
            audit,
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }
}

/// How a backend answers a page request
#[derive(Debug, Clone, PartialEq)]
pub enum PagePlan {
    /// One statement returning a single row `{ total, list }`
    Combined(Statement),
    /// A slice statement followed by a count statement returning `{ total }`
    Split { slice: Statement, count: Statement },
}

/// Compiles repository operations into native statements.
///
/// Implementations are pure: no I/O, same input gives the same statement.
/// Every read is restricted to active rows.
pub trait QueryDialect: Send + Sync {
    fn backend(&self) -> BackendKind;

    fn compile_page(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        sorts: &[SortSpec],
        keep: &[String],
        window: PageWindow,
    ) -> Result<PagePlan>;

    fn compile_select(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        sorts: &[SortSpec],
        keep: &[String],
    ) -> Result<Statement>;

    /// Insert stamped rows; `rows` is never empty
    fn compile_insert(
        &self,
        scope: &TableScope,
        rows: &[DataRow],
        now: DateTime<Utc>,
        returns: &[String],
    ) -> Result<Statement>;

    fn compile_update(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        payload: &DataRow,
        now: DateTime<Utc>,
        returns: &[String],
    ) -> Result<Statement>;

    fn compile_soft_delete(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        now: DateTime<Utc>,
        returns: &[String],
    ) -> Result<Statement>;

    /// Call the stored procedure named by the scope with positional arguments
    fn compile_procedure(&self, scope: &TableScope, args: &[BindValue]) -> Result<Statement> {
        let _ = args;
        Err(QueryError::compilation(format!(
            "{} cannot call procedure '{}'",
            self.backend(),
            scope.table
        )))
    }
}

/// A live connection to one backend.
///
/// `run` marshals bindings into the native representation and normalizes
/// rows; it performs exactly the round trips the statement needs.
#[async_trait]
pub trait ConnectionHandle: DowncastSync {
    fn backend(&self) -> BackendKind;

    async fn run(&self, statement: &Statement) -> std::result::Result<Execution, ExecutionError>;

    /// Release backend resources. Calling it more than once is harmless.
    async fn close(&self) -> Result<()>;
}

impl_downcast!(sync ConnectionHandle);

/// Opens and releases connections for one backend family
#[async_trait]
pub trait Driver: Send + Sync {
    fn backend(&self) -> BackendKind;

    fn dialect(&self) -> Arc<dyn QueryDialect>;

    async fn acquire(&self, config: &ConnectionConfig) -> Result<Arc<dyn ConnectionHandle>>;

    async fn release(&self, handle: Arc<dyn ConnectionHandle>) -> Result<()> {
        handle.close().await
    }
}
