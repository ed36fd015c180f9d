use crate::aql::AqlBuilder;
use crate::filter::{compile_filter, compile_sort};
use chrono::{DateTime, Utc};
use strata_query::{
    BackendKind, BindValue, DataRow, FilterExpression, PagePlan, PageWindow, QueryDialect, QueryError, Result,
    SortSpec, Statement, StatementKind, TableScope,
};
use tracing::debug;

const ALIAS: &str = "t";

/// Compiles repository operations into AQL
#[derive(Debug, Clone, Copy, Default)]
pub struct ArangoDialect;

impl ArangoDialect {
    pub fn new() -> Self {
        Self
    }

    /// `FOR t IN @@collection FILTER <active> <filter>` shared by reads and writes
    fn scan(&self, aql: &mut AqlBuilder, scope: &TableScope, filter: &FilterExpression) -> Result<String> {
        if let Some(schema) = &scope.schema {
            debug!("Ignoring schema '{}' for collection {}", schema, scope.table);
        }
        let collection = aql.collection(&scope.table);
        let active = aql.access(ALIAS, &scope.audit.active);
        let predicate = compile_filter(aql, filter, ALIAS)?;
        Ok(format!(
            "FOR {alias} IN {collection} FILTER {active} == true{predicate}",
            alias = ALIAS
        ))
    }

    fn projection(&self, aql: &mut AqlBuilder, doc: &str, keep: &[String]) -> String {
        if keep.is_empty() {
            doc.to_string()
        } else {
            let attrs = aql.value(text_list(keep));
            format!("KEEP({}, {})", doc, attrs)
        }
    }

    fn returning(&self, aql: &mut AqlBuilder, returns: &[String]) -> String {
        let attrs = aql.value(text_list(returns));
        format!("RETURN KEEP(NEW, {})", attrs)
    }
}

fn text_list(items: &[String]) -> BindValue {
    BindValue::List(items.iter().map(|s| BindValue::Text(s.clone())).collect())
}

fn with_outs(mut statement: Statement, returns: &[String]) -> Statement {
    for column in returns {
        statement = statement.out(column.clone());
    }
    statement
}

fn window_bound(name: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| QueryError::validation(format!("page {} {} is out of range", name, value)))
}

impl QueryDialect for ArangoDialect {
    fn backend(&self) -> BackendKind {
        BackendKind::ArangoDb
    }

    fn compile_page(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        sorts: &[SortSpec],
        keep: &[String],
        window: PageWindow,
    ) -> Result<PagePlan> {
        let mut aql = AqlBuilder::new();
        let scan = self.scan(&mut aql, scope, filter)?;
        let sort = compile_sort(&mut aql, sorts, ALIAS, &scope.audit);
        let offset = aql.value(BindValue::Int(window_bound("offset", window.offset)?));
        let limit = aql.value(BindValue::Int(window_bound("limit", window.limit)?));
        let item = self.projection(&mut aql, "item", keep);

        let text = format!(
            "LET ts = ({scan} {sort} RETURN {alias}) \
             RETURN {{ total: LENGTH(ts), list: (FOR item IN ts LIMIT {offset}, {limit} RETURN {item}) }}",
            alias = ALIAS
        );
        Ok(PagePlan::Combined(aql.finish(StatementKind::Read, text)))
    }

    fn compile_select(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        sorts: &[SortSpec],
        keep: &[String],
    ) -> Result<Statement> {
        let mut aql = AqlBuilder::new();
        let scan = self.scan(&mut aql, scope, filter)?;
        let sort = compile_sort(&mut aql, sorts, ALIAS, &scope.audit);
        let doc = self.projection(&mut aql, ALIAS, keep);
        Ok(aql.finish(StatementKind::Read, format!("{} {} RETURN {}", scan, sort, doc)))
    }

    fn compile_insert(
        &self,
        scope: &TableScope,
        rows: &[DataRow],
        now: DateTime<Utc>,
        returns: &[String],
    ) -> Result<Statement> {
        let mut aql = AqlBuilder::new();
        let docs = aql.value(BindValue::List(
            rows.iter()
                .map(|row| BindValue::Json(serde_json::Value::Object(row.clone().into_iter().collect())))
                .collect(),
        ));
        let created = aql.attribute(&scope.audit.created_at);
        let stamp = aql.value(BindValue::Timestamp(now));
        let active = aql.attribute(&scope.audit.active);
        let collection = aql.collection(&scope.table);
        let returning = self.returning(&mut aql, returns);

        let text = format!(
            "FOR doc IN {docs} INSERT MERGE(doc, {{ [{created}]: {stamp}, [{active}]: true }}) \
             INTO {collection} {returning}"
        );
        Ok(with_outs(aql.finish(StatementKind::Insert, text), returns))
    }

    fn compile_update(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        payload: &DataRow,
        now: DateTime<Utc>,
        returns: &[String],
    ) -> Result<Statement> {
        let mut aql = AqlBuilder::new();
        let scan = self.scan(&mut aql, scope, filter)?;
        let patch = aql.value(BindValue::Json(serde_json::Value::Object(
            payload.clone().into_iter().collect(),
        )));
        let updated = aql.attribute(&scope.audit.updated_at);
        let stamp = aql.value(BindValue::Timestamp(now));
        let returning = self.returning(&mut aql, returns);

        let text = format!(
            "{scan} UPDATE {alias} WITH MERGE({patch}, {{ [{updated}]: {stamp} }}) \
             IN @@collection OPTIONS {{ keepNull: false }} {returning}",
            alias = ALIAS
        );
        Ok(with_outs(aql.finish(StatementKind::Update, text), returns))
    }

    fn compile_soft_delete(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        now: DateTime<Utc>,
        returns: &[String],
    ) -> Result<Statement> {
        let mut aql = AqlBuilder::new();
        let scan = self.scan(&mut aql, scope, filter)?;
        let active = aql.attribute(&scope.audit.active);
        let deleted = aql.attribute(&scope.audit.deleted_at);
        let stamp = aql.value(BindValue::Timestamp(now));
        let returning = self.returning(&mut aql, returns);

        let text = format!(
            "{scan} UPDATE {alias} WITH {{ [{active}]: false, [{deleted}]: {stamp} }} \
             IN @@collection OPTIONS {{ keepNull: false }} {returning}",
            alias = ALIAS
        );
        Ok(with_outs(aql.finish(StatementKind::Update, text), returns))
    }
}
