use crate::error::{ExecutionError, QueryError, Result, WriteState};
use crate::traits::ConnectionHandle;
use crate::types::{BackendKind, Execution, OutBinds, Statement, StatementKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Runs compiled statements against a connection handle.
///
/// Adds timeouts, logging and out-bind resolution on top of the backend
/// session. Failures are never retried.
#[derive(Clone)]
pub struct QueryExecutor {
    handle: Arc<dyn ConnectionHandle>,
    default_timeout: Option<Duration>,
}

impl QueryExecutor {
    pub fn new(handle: Arc<dyn ConnectionHandle>) -> Self {
        Self {
            handle,
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.handle.backend()
    }

    pub fn handle(&self) -> &Arc<dyn ConnectionHandle> {
        &self.handle
    }

    pub async fn execute(&self, statement: &Statement, timeout: Option<Duration>) -> Result<Execution> {
        let backend = self.handle.backend();
        let timeout = timeout.or(self.default_timeout);

        debug!(
            "Executing {:?} statement on {} ({} binds): {}",
            statement.kind,
            backend,
            statement.binds.len(),
            statement.text
        );

        let start = Instant::now();
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.handle.run(statement)).await {
                Ok(result) => result,
                Err(_) => {
                    let state = if statement.kind == StatementKind::Read {
                        WriteState::NotApplied
                    } else {
                        WriteState::Unknown
                    };
                    Err(
                        ExecutionError::timeout(backend, limit.as_millis(), &statement.text)
                            .with_write_state(state),
                    )
                }
            },
            None => self.handle.run(statement).await,
        };

        let mut execution = outcome.map_err(|e| {
            error!("{} statement failed: {}", backend, e.message);
            error!("Failed statement: {}", statement.text);
            QueryError::from(e)
        })?;

        if statement.has_out_binds() && execution.out_binds.is_none() {
            let out = collect_out_binds(&statement.out_names(), &execution)
                .map_err(|missing| {
                    let state = if statement.kind.is_mutation() {
                        WriteState::Committed
                    } else {
                        WriteState::Unknown
                    };
                    error!(
                        "{} result is missing returned column '{}'",
                        backend, missing
                    );
                    QueryError::from(
                        ExecutionError::new(
                            backend,
                            format!("returned rows do not contain out binding '{}'", missing),
                            &statement.text,
                        )
                        .with_write_state(state),
                    )
                })?;
            execution.out_binds = Some(out);
        }

        debug!(
            "Statement affected {} rows in {}ms",
            execution.row_count,
            start.elapsed().as_millis()
        );

        Ok(execution)
    }
}

/// Gather out-bound values column-wise from returned rows
fn collect_out_binds(names: &[&str], execution: &Execution) -> std::result::Result<OutBinds, String> {
    let mut out = OutBinds::new();
    for name in names {
        let mut values = Vec::with_capacity(execution.rows.len());
        for row in &execution.rows {
            let value = row.get(*name).ok_or_else(|| name.to_string())?;
            values.push(value.clone());
        }
        out.insert(name.to_string(), values);
    }
    Ok(out)
}
