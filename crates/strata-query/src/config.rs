use crate::audit::AuditFields;
use crate::error::{QueryError, Result};
use crate::types::BackendKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Connection configuration for opening a backend connection
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Backend family (arangodb, postgres, mysql)
    pub backend: BackendKind,
    /// Host or connection endpoint
    pub host: Option<String>,
    /// Port number
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database name
    pub database: Option<String>,
    /// Additional options as key-value pairs
    #[serde(default)]
    pub options: HashMap<String, String>,
    /// Default timeout applied to every statement on this connection
    pub statement_timeout_ms: Option<u64>,
    /// Override the backend's default audit attribute layout
    pub audit: Option<AuditFields>,
}

impl ConnectionConfig {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            options: HashMap::new(),
            statement_timeout_ms: None,
            audit: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_audit(mut self, audit: AuditFields) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Audit layout for this connection
    pub fn audit_fields(&self) -> AuditFields {
        self.audit
            .clone()
            .unwrap_or_else(|| AuditFields::for_backend(self.backend))
    }

    pub fn require_host(&self) -> Result<&str> {
        self.host
            .as_deref()
            .ok_or_else(|| QueryError::configuration(format!("{} connection needs a host", self.backend)))
    }

    pub fn require_database(&self) -> Result<&str> {
        self.database.as_deref().ok_or_else(|| {
            QueryError::configuration(format!("{} connection needs a database", self.backend))
        })
    }

    /// Parse an entry of `options`, `None` when absent
    pub fn option<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                QueryError::configuration(format!("option '{}' has invalid value '{}'", key, raw))
            }),
        }
    }

    /// Get connection string for display purposes (without password)
    pub fn connection_string(&self) -> String {
        let mut parts = vec![format!("{}://", self.backend)];

        if let Some(username) = &self.username {
            parts.push(format!("{}@", username));
        }

        if let Some(host) = &self.host {
            parts.push(host.clone());

            if let Some(port) = self.port {
                parts.push(format!(":{}", port));
            }
        }

        if let Some(database) = &self.database {
            parts.push(format!("/{}", database));
        }

        parts.join("")
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("options", &self.options)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("audit", &self.audit)
            .finish()
    }
}
