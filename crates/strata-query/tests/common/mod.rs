//! In-memory backend used to drive repositories end to end.
//!
//! The dialect records a plan per statement and the handle evaluates it
//! against rows held in memory.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use strata_query::filter::effective_sorts;
use strata_query::{
    BackendKind, ConnectionConfig, ConnectionHandle, Criterion, DataRow, Driver, Execution,
    ExecutionError, FilterExpression, Operator, PagePlan, PageWindow, QueryDialect, QueryError,
    SortDirection, SortSpec, Statement, StatementKind, TableScope,
};
use strata_query::types::TIMESTAMP_FORMAT;
use tracing_subscriber::EnvFilter;

/// Route logs to the test harness; `RUST_LOG=strata_query=debug` shows statements
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
enum Plan {
    Select {
        scope: TableScope,
        filter: FilterExpression,
        sorts: Vec<SortSpec>,
        keep: Vec<String>,
        window: Option<PageWindow>,
    },
    Count {
        scope: TableScope,
        filter: FilterExpression,
    },
    Insert {
        scope: TableScope,
        rows: Vec<DataRow>,
        now: DateTime<Utc>,
        returns: Vec<String>,
    },
    Update {
        scope: TableScope,
        filter: FilterExpression,
        set: DataRow,
        returns: Vec<String>,
    },
}

/// Shared state between the memory dialect and the memory handle
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<DataRow>>>,
    plans: Mutex<Vec<Plan>>,
    next_id: AtomicI64,
    executed: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of statements that reached the handle
    pub fn executed(&self) -> usize {
        self.executed.load(AtomicOrdering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(AtomicOrdering::SeqCst)
    }

    /// Rows exactly as stored, including inactive ones
    pub fn raw_rows(&self, table: &str) -> Vec<DataRow> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, kind: StatementKind, plan: Plan) -> Statement {
        let mut plans = self.plans.lock().unwrap();
        plans.push(plan);
        Statement::new(kind, format!("plan:{}", plans.len() - 1))
    }

    fn plan(&self, statement: &Statement) -> Option<Plan> {
        let idx: usize = statement.text.strip_prefix("plan:")?.parse().ok()?;
        self.plans.lock().unwrap().get(idx).cloned()
    }
}

pub struct MemoryDialect {
    store: Arc<MemoryStore>,
}

impl QueryDialect for MemoryDialect {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn compile_page(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        sorts: &[SortSpec],
        keep: &[String],
        window: PageWindow,
    ) -> strata_query::Result<PagePlan> {
        check_supported(filter)?;
        let slice = self.store.record(
            StatementKind::Read,
            Plan::Select {
                scope: scope.clone(),
                filter: filter.clone(),
                sorts: sorts.to_vec(),
                keep: keep.to_vec(),
                window: Some(window),
            },
        );
        let count = self.store.record(
            StatementKind::Read,
            Plan::Count {
                scope: scope.clone(),
                filter: filter.clone(),
            },
        );
        Ok(PagePlan::Split { slice, count })
    }

    fn compile_select(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        sorts: &[SortSpec],
        keep: &[String],
    ) -> strata_query::Result<Statement> {
        check_supported(filter)?;
        Ok(self.store.record(
            StatementKind::Read,
            Plan::Select {
                scope: scope.clone(),
                filter: filter.clone(),
                sorts: sorts.to_vec(),
                keep: keep.to_vec(),
                window: None,
            },
        ))
    }

    fn compile_insert(
        &self,
        scope: &TableScope,
        rows: &[DataRow],
        now: DateTime<Utc>,
        returns: &[String],
    ) -> strata_query::Result<Statement> {
        let statement = self.store.record(
            StatementKind::Insert,
            Plan::Insert {
                scope: scope.clone(),
                rows: rows.to_vec(),
                now,
                returns: returns.to_vec(),
            },
        );
        Ok(with_outs(statement, returns))
    }

    fn compile_update(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        payload: &DataRow,
        now: DateTime<Utc>,
        returns: &[String],
    ) -> strata_query::Result<Statement> {
        check_supported(filter)?;
        let mut set = payload.clone();
        set.insert(scope.audit.updated_at.clone(), stamp(now));
        let statement = self.store.record(
            StatementKind::Update,
            Plan::Update {
                scope: scope.clone(),
                filter: filter.clone(),
                set,
                returns: returns.to_vec(),
            },
        );
        Ok(with_outs(statement, returns))
    }

    fn compile_soft_delete(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        now: DateTime<Utc>,
        returns: &[String],
    ) -> strata_query::Result<Statement> {
        check_supported(filter)?;
        let mut set = DataRow::new();
        set.insert(scope.audit.active.clone(), Value::Bool(false));
        set.insert(scope.audit.deleted_at.clone(), stamp(now));
        let statement = self.store.record(
            StatementKind::Update,
            Plan::Update {
                scope: scope.clone(),
                filter: filter.clone(),
                set,
                returns: returns.to_vec(),
            },
        );
        Ok(with_outs(statement, returns))
    }
}

fn with_outs(mut statement: Statement, returns: &[String]) -> Statement {
    for column in returns {
        statement = statement.out(column.clone());
    }
    statement
}

fn stamp(now: DateTime<Utc>) -> Value {
    Value::String(now.format(TIMESTAMP_FORMAT).to_string())
}

fn check_supported(filter: &FilterExpression) -> strata_query::Result<()> {
    for (key, criterion) in filter.clauses() {
        if let Criterion::Operator {
            op: Operator::RegexMatch | Operator::RegexNotMatch,
            ..
        } = criterion
        {
            return Err(QueryError::compilation(format!(
                "regex on '{}' is not supported in memory",
                key
            )));
        }
    }
    Ok(())
}

pub struct MemoryHandle {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl ConnectionHandle for MemoryHandle {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn run(&self, statement: &Statement) -> Result<Execution, ExecutionError> {
        self.store.executed.fetch_add(1, AtomicOrdering::SeqCst);
        let plan = self.store.plan(statement).ok_or_else(|| {
            ExecutionError::new(BackendKind::Postgres, "unknown plan", &statement.text)
        })?;
        let mut tables = self.store.tables.lock().unwrap();

        let execution = match plan {
            Plan::Select {
                scope,
                filter,
                sorts,
                keep,
                window,
            } => {
                let rows = tables.get(&scope.table).cloned().unwrap_or_default();
                let mut rows: Vec<DataRow> = rows
                    .into_iter()
                    .filter(|r| visible(r, &scope) && matches(r, &filter))
                    .collect();
                let order = effective_sorts(&sorts, &scope.audit.created_at, &scope.audit.id);
                rows.sort_by(|a, b| compare_rows(a, b, &order));
                if let Some(window) = window {
                    rows = rows
                        .into_iter()
                        .skip(window.offset as usize)
                        .take(window.limit as usize)
                        .collect();
                }
                if !keep.is_empty() {
                    rows = rows.into_iter().map(|r| project(&r, &keep)).collect();
                }
                Execution {
                    row_count: rows.len() as u64,
                    rows,
                    out_binds: None,
                }
            }
            Plan::Count { scope, filter } => {
                let total = tables
                    .get(&scope.table)
                    .map(|rows| {
                        rows.iter()
                            .filter(|r| visible(r, &scope) && matches(r, &filter))
                            .count()
                    })
                    .unwrap_or(0);
                let mut row = DataRow::new();
                row.insert("total".into(), json!(total));
                Execution {
                    rows: vec![row],
                    row_count: 1,
                    out_binds: None,
                }
            }
            Plan::Insert {
                scope,
                rows,
                now,
                returns,
            } => {
                let table = tables.entry(scope.table.clone()).or_default();
                let mut returned = Vec::new();
                for mut row in rows {
                    let id = self.store.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                    row.insert(scope.audit.id.clone(), json!(id));
                    row.insert(scope.audit.created_at.clone(), stamp(now));
                    row.insert(scope.audit.active.clone(), Value::Bool(true));
                    returned.push(project(&row, &returns));
                    table.push(row);
                }
                Execution {
                    row_count: returned.len() as u64,
                    rows: returned,
                    out_binds: None,
                }
            }
            Plan::Update {
                scope,
                filter,
                set,
                returns,
            } => {
                let table = tables.entry(scope.table.clone()).or_default();
                let mut returned = Vec::new();
                for row in table.iter_mut() {
                    if visible(row, &scope) && matches(row, &filter) {
                        for (k, v) in &set {
                            row.insert(k.clone(), v.clone());
                        }
                        returned.push(project(row, &returns));
                    }
                }
                Execution {
                    row_count: returned.len() as u64,
                    rows: returned,
                    out_binds: None,
                }
            }
        };
        Ok(execution)
    }

    async fn close(&self) -> strata_query::Result<()> {
        self.store.closed.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }
}

fn visible(row: &DataRow, scope: &TableScope) -> bool {
    row.get(&scope.audit.active) == Some(&Value::Bool(true))
}

fn matches(row: &DataRow, filter: &FilterExpression) -> bool {
    filter.clauses().into_iter().all(|(key, criterion)| {
        let actual = row.get(key).unwrap_or(&Value::Null);
        match criterion {
            Criterion::Equals(v) => actual == v,
            Criterion::In(values) => values.contains(actual),
            Criterion::Position(values) => match actual {
                Value::Array(items) => values.iter().any(|v| items.contains(v)),
                _ => false,
            },
            Criterion::Operator { op, value } => {
                let ord = compare_values(actual, value);
                match op {
                    Operator::Eq => actual == value,
                    Operator::Ne => actual != value,
                    Operator::Lt => ord == Ordering::Less,
                    Operator::Lte => ord != Ordering::Greater,
                    Operator::Gt => ord == Ordering::Greater,
                    Operator::Gte => ord != Ordering::Less,
                    Operator::In => value.as_array().is_some_and(|v| v.contains(actual)),
                    Operator::NotIn => value.as_array().is_some_and(|v| !v.contains(actual)),
                    Operator::Like => like(actual, value),
                    Operator::RegexMatch | Operator::RegexNotMatch => false,
                }
            }
        }
    })
}

fn like(actual: &Value, pattern: &Value) -> bool {
    let (Some(actual), Some(pattern)) = (actual.as_str(), pattern.as_str()) else {
        return false;
    };
    match (pattern.strip_prefix('%'), pattern.strip_suffix('%')) {
        (Some(rest), _) if rest.ends_with('%') => actual.contains(rest.trim_end_matches('%')),
        (Some(rest), _) => actual.ends_with(rest),
        (None, Some(rest)) => actual.starts_with(rest),
        (None, None) => actual == pattern,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn compare_rows(a: &DataRow, b: &DataRow, order: &[SortSpec]) -> Ordering {
    for spec in order {
        let null = Value::Null;
        let ord = compare_values(a.get(&spec.field).unwrap_or(&null), b.get(&spec.field).unwrap_or(&null));
        let ord = match spec.direction() {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn project(row: &DataRow, columns: &[String]) -> DataRow {
    columns
        .iter()
        .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
        .collect()
}

pub struct MemoryDriver {
    pub store: Arc<MemoryStore>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
        }
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn dialect(&self) -> Arc<dyn QueryDialect> {
        Arc::new(MemoryDialect {
            store: self.store.clone(),
        })
    }

    async fn acquire(&self, _config: &ConnectionConfig) -> strata_query::Result<Arc<dyn ConnectionHandle>> {
        Ok(Arc::new(MemoryHandle {
            store: self.store.clone(),
        }))
    }
}
