use crate::audit::AuditFields;
use crate::entity::EntityRecord;
use crate::error::{ExecutionError, Operation, QueryError, Result};
use crate::executor::QueryExecutor;
use crate::mutation;
use crate::pagination::{PageRequest, PageResult};
use crate::params::{DeletesByFilter, ExecuteProcedure, GetsByFilter, Save, Saves, UpdatesByFilter};
use crate::traits::{PagePlan, QueryDialect, TableScope};
use crate::types::{BindValue, DataRow, Execution, MutationOutcome, QueryOptions, Statement};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Filter, page and mutate one table or collection.
///
/// Shares the connection's handle; the connection owns its lifecycle.
pub struct Repository {
    entity: EntityRecord,
    dialect: Arc<dyn QueryDialect>,
    executor: QueryExecutor,
    audit: AuditFields,
}

impl Repository {
    pub fn new(
        entity: EntityRecord,
        dialect: Arc<dyn QueryDialect>,
        executor: QueryExecutor,
        audit: AuditFields,
    ) -> Self {
        Self {
            entity,
            dialect,
            executor,
            audit,
        }
    }

    pub fn name(&self) -> &str {
        &self.entity.name
    }

    pub fn entity(&self) -> &EntityRecord {
        &self.entity
    }

    fn scope(&self, options: &QueryOptions) -> TableScope {
        TableScope::new(&self.entity.name, self.audit.clone()).with_schema(options.schema.clone())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.entity.is_writable() {
            Ok(())
        } else {
            Err(QueryError::configuration(format!(
                "'{}' is a {} and cannot be written",
                self.entity.name, self.entity.kind
            )))
        }
    }

    async fn run(&self, statement: &Statement, options: &QueryOptions) -> Result<Execution> {
        let timeout = options.timeout_ms.map(Duration::from_millis);
        self.executor.execute(statement, timeout).await
    }

    pub async fn get_page(&self, request: &PageRequest) -> Result<PageResult> {
        self.page(request)
            .await
            .map_err(|e| e.during(Operation::GetPage, &self.entity.name))
    }

    async fn page(&self, request: &PageRequest) -> Result<PageResult> {
        let window = request.validate()?;
        let scope = self.scope(&request.options);
        let plan = self.dialect.compile_page(
            &scope,
            &request.filter,
            &request.sorts,
            &request.options.keep_attrs,
            window,
        )?;

        let (total, list) = match plan {
            PagePlan::Combined(statement) => {
                let execution = self.run(&statement, &request.options).await?;
                let envelope = execution.rows.into_iter().next().ok_or_else(|| {
                    self.malformed_count("page query returned no envelope row", &statement)
                })?;
                let total = match envelope.get("total") {
                    Some(value) => self.count_value(value, &statement)?,
                    None => return Err(self.malformed_count("page envelope has no 'total'", &statement)),
                };
                let list = match envelope.get("list") {
                    Some(Value::Array(items)) => items.iter().filter_map(as_row).collect(),
                    _ => Vec::new(),
                };
                (total, list)
            }
            PagePlan::Split { slice, count } => {
                // Two round trips; rows may change between them.
                let rows = self.run(&slice, &request.options).await?.rows;
                let counted = self.run(&count, &request.options).await?;
                let total = match counted.rows.first().and_then(|r| r.get("total")) {
                    Some(value) => self.count_value(value, &count)?,
                    None => return Err(self.malformed_count("count query returned no 'total'", &count)),
                };
                (total, rows)
            }
        };

        debug!(
            "Page {} of '{}' returned {} of {} rows",
            request.current,
            self.entity.name,
            list.len(),
            total
        );
        Ok(PageResult::assemble(request, window, total, list))
    }

    pub async fn gets_by_filter(&self, request: &GetsByFilter) -> Result<Vec<DataRow>> {
        self.select(request)
            .await
            .map_err(|e| e.during(Operation::GetsByFilter, &self.entity.name))
    }

    async fn select(&self, request: &GetsByFilter) -> Result<Vec<DataRow>> {
        let scope = self.scope(&request.options);
        let statement = self.dialect.compile_select(
            &scope,
            &request.filter,
            &request.sorts,
            &request.options.keep_attrs,
        )?;
        Ok(self.run(&statement, &request.options).await?.rows)
    }

    pub async fn save(&self, request: &Save) -> Result<MutationOutcome> {
        self.insert(std::slice::from_ref(&request.payload), &request.options)
            .await
            .map_err(|e| e.during(Operation::Save, &self.entity.name))
    }

    /// Insert several rows with one statement
    pub async fn saves(&self, request: &Saves) -> Result<MutationOutcome> {
        self.insert(&request.payloads, &request.options)
            .await
            .map_err(|e| e.during(Operation::Saves, &self.entity.name))
    }

    async fn insert(&self, payloads: &[DataRow], options: &QueryOptions) -> Result<MutationOutcome> {
        self.ensure_writable()?;
        if payloads.is_empty() {
            return Err(QueryError::validation("payloads must not be empty"));
        }
        let rows = payloads
            .iter()
            .map(|p| mutation::prepare_insert(p, &self.audit))
            .collect::<Result<Vec<_>>>()?;

        let returns = self.audit.returns(&options.returns);
        let statement =
            self.dialect
                .compile_insert(&self.scope(options), &rows, Utc::now(), &returns)?;
        let execution = self.run(&statement, options).await?;
        Ok(mutation::outcome(execution, &self.audit.id))
    }

    pub async fn updates_by_filter(&self, request: &UpdatesByFilter) -> Result<MutationOutcome> {
        self.update(request)
            .await
            .map_err(|e| e.during(Operation::UpdatesByFilter, &self.entity.name))
    }

    async fn update(&self, request: &UpdatesByFilter) -> Result<MutationOutcome> {
        self.ensure_writable()?;
        let payload = mutation::prepare_update(&request.new_payload, &self.audit)?;
        let returns = self.audit.returns(&request.options.returns);
        let statement = self.dialect.compile_update(
            &self.scope(&request.options),
            &request.filter,
            &payload,
            Utc::now(),
            &returns,
        )?;
        let execution = self.run(&statement, &request.options).await?;
        Ok(mutation::outcome(execution, &self.audit.id))
    }

    /// Flag matching rows inactive; rows are never removed
    pub async fn deletes_by_filter(&self, request: &DeletesByFilter) -> Result<MutationOutcome> {
        self.soft_delete(request)
            .await
            .map_err(|e| e.during(Operation::DeletesByFilter, &self.entity.name))
    }

    async fn soft_delete(&self, request: &DeletesByFilter) -> Result<MutationOutcome> {
        self.ensure_writable()?;
        let returns = self.audit.returns(&request.options.returns);
        let statement = self.dialect.compile_soft_delete(
            &self.scope(&request.options),
            &request.filter,
            Utc::now(),
            &returns,
        )?;
        let execution = self.run(&statement, &request.options).await?;
        Ok(mutation::outcome(execution, &self.audit.id))
    }

    /// Call the stored procedure named after this entity
    pub async fn execute_procedure(&self, request: &ExecuteProcedure) -> Result<Execution> {
        self.call(request)
            .await
            .map_err(|e| e.during(Operation::ExecuteProcedure, &self.entity.name))
    }

    async fn call(&self, request: &ExecuteProcedure) -> Result<Execution> {
        let args: Vec<BindValue> = request.binds.iter().map(BindValue::from_json).collect();
        let statement = self
            .dialect
            .compile_procedure(&self.scope(&request.options), &args)?;
        debug!(
            "Calling procedure '{}' with {} argument(s)",
            self.entity.name,
            args.len()
        );
        self.run(&statement, &request.options).await
    }

    fn count_value(&self, value: &Value, statement: &Statement) -> Result<u64> {
        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse::<u64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| self.malformed_count(format!("total is not a count: {}", value), statement))
    }

    fn malformed_count(&self, message: impl Into<String>, statement: &Statement) -> QueryError {
        QueryError::from(ExecutionError::new(
            self.executor.backend(),
            message,
            &statement.text,
        ))
    }
}

fn as_row(value: &Value) -> Option<DataRow> {
    match value {
        Value::Object(map) => Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        _ => None,
    }
}
