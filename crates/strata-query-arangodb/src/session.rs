use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use strata_query::{
    BackendKind, ConnectionConfig, ConnectionHandle, DataRow, Execution, ExecutionError, QueryError,
    Result, Statement, StatementKind, WriteState,
};
use tracing::{debug, error};

const DEFAULT_PORT: u16 = 8529;
const DEFAULT_DATABASE: &str = "_system";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorResponse {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    id: Option<String>,
    extra: Option<CursorExtra>,
}

#[derive(Debug, Deserialize)]
struct CursorExtra {
    stats: Option<CursorStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorStats {
    writes_executed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_message: Option<String>,
    error_num: Option<i64>,
}

/// Connection to one ArangoDB database over the HTTP cursor API
pub struct ArangoSession {
    client: reqwest::Client,
    base_url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
    batch_size: Option<u32>,
    closed: AtomicBool,
}

impl ArangoSession {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            username: None,
            password: None,
            batch_size: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn with_batch_size(mut self, batch_size: Option<u32>) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Build a session from configuration and check the database answers
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let host = config.require_host()?;
        let protocol = config
            .option::<String>("protocol")?
            .unwrap_or_else(|| "http".to_string());
        let port = config.port.unwrap_or(DEFAULT_PORT);
        let database = config.database.as_deref().unwrap_or(DEFAULT_DATABASE);

        let mut session = Self::new(format!("{}://{}:{}", protocol, host, port), database)
            .with_batch_size(config.option::<u32>("batch_size")?);
        if let Some(username) = &config.username {
            session = session.with_credentials(username, config.password.clone());
        }

        debug!(
            "Connecting to ArangoDB: {}",
            config.connection_string()
        );
        session.ping().await?;
        debug!("Successfully connected to ArangoDB database: {}", database);
        Ok(session)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/_db/{}{}", self.base_url, self.database, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    async fn ping(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::GET, "/_api/version")
            .send()
            .await
            .map_err(|e| {
                ExecutionError::new(BackendKind::ArangoDb, format!("connection failed: {}", e), "GET /_api/version")
            })?;

        if !response.status().is_success() {
            return Err(QueryError::from(ExecutionError::new(
                BackendKind::ArangoDb,
                format!("connection rejected with status {}", response.status()),
                "GET /_api/version",
            )));
        }
        Ok(())
    }

    fn failure(&self, statement: &Statement, message: String, state: WriteState) -> ExecutionError {
        let state = if statement.kind == StatementKind::Read {
            WriteState::NotApplied
        } else {
            state
        };
        ExecutionError::new(BackendKind::ArangoDb, message, &statement.text).with_write_state(state)
    }

    async fn read_batch(
        &self,
        response: reqwest::Response,
        statement: &Statement,
    ) -> std::result::Result<CursorResponse, ExecutionError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            self.failure(statement, format!("failed to read response: {}", e), WriteState::Unknown)
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(ErrorBody {
                    error_message: Some(msg),
                    error_num,
                }) => format!("[{}] {}", error_num.unwrap_or_default(), msg),
                _ => format!("HTTP {}", status),
            };
            return Err(self.failure(statement, message, WriteState::NotApplied));
        }

        serde_json::from_str(&body).map_err(|e| {
            self.failure(statement, format!("malformed cursor response: {}", e), WriteState::Committed)
        })
    }
}

fn to_row(value: Value) -> DataRow {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        other => {
            let mut row = DataRow::new();
            row.insert("value".to_string(), other);
            row
        }
    }
}

#[async_trait]
impl ConnectionHandle for ArangoSession {
    fn backend(&self) -> BackendKind {
        BackendKind::ArangoDb
    }

    async fn run(&self, statement: &Statement) -> std::result::Result<Execution, ExecutionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.failure(statement, "connection is closed".into(), WriteState::NotApplied));
        }

        let bind_vars: Map<String, Value> = statement
            .in_binds()
            .map(|b| (b.name.clone(), b.value.to_json()))
            .collect();
        let mut body = json!({ "query": statement.text, "bindVars": bind_vars });
        if let Some(batch_size) = self.batch_size {
            body["batchSize"] = json!(batch_size);
        }

        let response = self
            .request(reqwest::Method::POST, "/_api/cursor")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let state = if e.is_connect() {
                    WriteState::NotApplied
                } else {
                    WriteState::Unknown
                };
                error!("ArangoDB request failed: {}", e);
                self.failure(statement, format!("request failed: {}", e), state)
            })?;

        let mut batch = self.read_batch(response, statement).await?;
        let writes = batch
            .extra
            .as_ref()
            .and_then(|e| e.stats.as_ref())
            .and_then(|s| s.writes_executed);
        let mut results = std::mem::take(&mut batch.result);

        while batch.has_more {
            let Some(id) = batch.id.clone() else {
                break;
            };
            debug!("Fetching next batch of cursor {}", id);
            let response = self
                .request(reqwest::Method::PUT, &format!("/_api/cursor/{}", id))
                .send()
                .await
                .map_err(|e| {
                    self.failure(statement, format!("cursor fetch failed: {}", e), WriteState::Committed)
                })?;
            batch = self.read_batch(response, statement).await?;
            results.append(&mut batch.result);
        }

        let rows: Vec<DataRow> = results.into_iter().map(to_row).collect();
        let row_count = match (statement.kind.is_mutation(), writes) {
            (true, Some(writes)) => writes,
            _ => rows.len() as u64,
        };

        Ok(Execution {
            rows,
            row_count,
            out_binds: None,
        })
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing ArangoDB session for database: {}", self.database);
        }
        Ok(())
    }
}
