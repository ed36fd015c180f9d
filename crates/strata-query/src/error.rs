use crate::types::BackendKind;
use std::fmt;
use thiserror::Error;

/// Operation a repository failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetPage,
    GetsByFilter,
    Save,
    Saves,
    UpdatesByFilter,
    DeletesByFilter,
    ExecuteRaw,
    ExecuteProcedure,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::GetPage => "getPage",
            Operation::GetsByFilter => "getsByFilter",
            Operation::Save => "save",
            Operation::Saves => "saves",
            Operation::UpdatesByFilter => "updatesByFilter",
            Operation::DeletesByFilter => "deletesByFilter",
            Operation::ExecuteRaw => "executeRaw",
            Operation::ExecuteProcedure => "executeProcedure",
        };
        f.write_str(name)
    }
}

/// Whether a failed mutation is believed to have been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// The statement was rejected or never reached the backend
    NotApplied,
    /// The backend accepted the write; a later step failed
    Committed,
    /// The outcome cannot be known (timeouts, dropped responses)
    Unknown,
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteState::NotApplied => f.write_str("not applied"),
            WriteState::Committed => f.write_str("committed"),
            WriteState::Unknown => f.write_str("unknown"),
        }
    }
}

/// Backend failure while running a compiled statement.
///
/// Carries the statement text for diagnostics. Bind values are never stored.
#[derive(Debug, Clone, Error)]
#[error("{backend} rejected statement ({write_state}): {message}\n\nStatement: {statement}")]
pub struct ExecutionError {
    pub backend: BackendKind,
    pub message: String,
    pub statement: String,
    pub write_state: WriteState,
    pub timed_out: bool,
}

impl ExecutionError {
    pub fn new(backend: BackendKind, message: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
            statement: statement.into(),
            write_state: WriteState::NotApplied,
            timed_out: false,
        }
    }

    pub fn with_write_state(mut self, write_state: WriteState) -> Self {
        self.write_state = write_state;
        self
    }

    pub fn timeout(backend: BackendKind, millis: u128, statement: impl Into<String>) -> Self {
        Self {
            backend,
            message: format!("statement timed out after {}ms", millis),
            statement: statement.into(),
            write_state: WriteState::NotApplied,
            timed_out: true,
        }
    }
}

/// Coarse classification used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Configuration,
    Compilation,
    Execution,
}

/// Unified error type for repository operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed request (page bounds, empty payloads)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Registry or connection setup problem
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Filter or statement could not be compiled
    #[error("Compilation failed: {0}")]
    Compilation(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("{operation} on '{entity}' failed: {source}")]
    Operation {
        operation: Operation,
        entity: String,
        #[source]
        source: Box<QueryError>,
    },
}

impl QueryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        QueryError::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        QueryError::Configuration(msg.into())
    }

    pub fn compilation(msg: impl Into<String>) -> Self {
        QueryError::Compilation(msg.into())
    }

    /// Wrap with the repository operation and entity it happened in
    pub fn during(self, operation: Operation, entity: impl Into<String>) -> Self {
        QueryError::Operation {
            operation,
            entity: entity.into(),
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Validation(_) => ErrorKind::Validation,
            QueryError::Configuration(_) => ErrorKind::Configuration,
            QueryError::Compilation(_) => ErrorKind::Compilation,
            QueryError::Execution(_) => ErrorKind::Execution,
            QueryError::Operation { source, .. } => source.kind(),
        }
    }

    /// The innermost backend failure, if any
    pub fn execution(&self) -> Option<&ExecutionError> {
        match self {
            QueryError::Execution(e) => Some(e),
            QueryError::Operation { source, .. } => source.execution(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
