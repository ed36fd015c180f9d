use crate::filter::{apply_sort, compile_filter};
use crate::value::{from_sea, literal, to_sea};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{
    Alias, Asterisk, Cond, Condition, Expr, Func, IntoTableRef, LockType, MysqlQueryBuilder,
    PostgresQueryBuilder, Query, QueryStatementWriter, SelectStatement, SimpleExpr, TableRef,
};
use std::collections::BTreeSet;
use strata_query::{
    BackendKind, BindValue, DataRow, FilterExpression, PagePlan, PageWindow, QueryDialect, QueryError,
    Result, SortSpec, Statement, StatementKind, TableScope,
};

/// SQL flavor a statement is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFlavor {
    Postgres,
    MySql,
}

impl SqlFlavor {
    pub fn backend(&self) -> BackendKind {
        match self {
            SqlFlavor::Postgres => BackendKind::Postgres,
            SqlFlavor::MySql => BackendKind::MySql,
        }
    }

    pub fn for_backend(backend: BackendKind) -> Option<Self> {
        match backend {
            BackendKind::Postgres => Some(SqlFlavor::Postgres),
            BackendKind::MySql => Some(SqlFlavor::MySql),
            BackendKind::ArangoDb => None,
        }
    }
}

/// Compiles repository operations into parameterized SQL.
///
/// Pages take two statements: the window and a `COUNT(*)` over the same
/// predicate. Postgres returns written columns with `RETURNING`; MySQL reads
/// them with a locking select run ahead of the write.
#[derive(Debug, Clone, Copy)]
pub struct SqlDialect {
    flavor: SqlFlavor,
}

impl SqlDialect {
    pub fn new(flavor: SqlFlavor) -> Self {
        Self { flavor }
    }

    pub fn postgres() -> Self {
        Self::new(SqlFlavor::Postgres)
    }

    pub fn mysql() -> Self {
        Self::new(SqlFlavor::MySql)
    }

    pub fn flavor(&self) -> SqlFlavor {
        self.flavor
    }

    fn table(&self, scope: &TableScope) -> TableRef {
        match &scope.schema {
            Some(schema) => (Alias::new(schema.as_str()), Alias::new(scope.table.as_str())).into_table_ref(),
            None => Alias::new(scope.table.as_str()).into_table_ref(),
        }
    }

    /// Active rows matching the filter
    fn predicate(&self, scope: &TableScope, filter: &FilterExpression) -> Result<Condition> {
        let active = Cond::all().add(Expr::col(Alias::new(scope.audit.active.as_str())).eq(true));
        compile_filter(active, filter, self.flavor)
    }

    fn select(&self, scope: &TableScope, filter: &FilterExpression, keep: &[String]) -> Result<SelectStatement> {
        let mut select = Query::select();
        if keep.is_empty() {
            select.column(Asterisk);
        } else {
            select.columns(keep.iter().map(|c| Alias::new(c.as_str())));
        }
        select
            .from(self.table(scope))
            .cond_where(self.predicate(scope, filter)?);
        Ok(select)
    }

    fn finish<S: QueryStatementWriter>(&self, kind: StatementKind, query: &S) -> Result<Statement> {
        let (sql, values) = match self.flavor {
            SqlFlavor::Postgres => query.build(PostgresQueryBuilder),
            SqlFlavor::MySql => query.build(MysqlQueryBuilder),
        };
        let mut statement = Statement::new(kind, sql);
        for (idx, value) in values.0.into_iter().enumerate() {
            statement.push_bind((idx + 1).to_string(), from_sea(value)?);
        }
        Ok(statement)
    }

    /// Locking read of the columns an update is about to touch
    fn probe(&self, scope: &TableScope, filter: &FilterExpression, returns: &[String]) -> Result<Statement> {
        let mut select = self.select(scope, filter, returns)?;
        select.lock(LockType::Update);
        self.finish(StatementKind::Read, &select)
    }

    fn write_returning(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        values: Vec<(Alias, SimpleExpr)>,
        returns: &[String],
    ) -> Result<Statement> {
        let mut update = Query::update();
        update
            .table(self.table(scope))
            .values(values)
            .cond_where(self.predicate(scope, filter)?);

        let statement = match self.flavor {
            SqlFlavor::Postgres => {
                update.returning(Query::returning().columns(returns.iter().map(|c| Alias::new(c.as_str()))));
                self.finish(StatementKind::Update, &update)?
            }
            SqlFlavor::MySql => self
                .finish(StatementKind::Update, &update)?
                .with_probe(self.probe(scope, filter, returns)?),
        };
        Ok(with_outs(statement, returns))
    }
}

fn quote(flavor: SqlFlavor, ident: &str) -> String {
    match flavor {
        SqlFlavor::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        SqlFlavor::MySql => format!("`{}`", ident.replace('`', "``")),
    }
}

fn with_outs(mut statement: Statement, returns: &[String]) -> Statement {
    for column in returns {
        statement = statement.out(column.clone());
    }
    statement
}

fn stamp(now: DateTime<Utc>) -> SimpleExpr {
    SimpleExpr::Value(to_sea(&BindValue::Timestamp(now)))
}

impl QueryDialect for SqlDialect {
    fn backend(&self) -> BackendKind {
        self.flavor.backend()
    }

    fn compile_page(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        sorts: &[SortSpec],
        keep: &[String],
        window: PageWindow,
    ) -> Result<PagePlan> {
        let mut slice = self.select(scope, filter, keep)?;
        apply_sort(&mut slice, sorts, &scope.audit);
        slice.limit(window.limit).offset(window.offset);

        let mut count = Query::select();
        count
            .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("total"))
            .from(self.table(scope))
            .cond_where(self.predicate(scope, filter)?);

        Ok(PagePlan::Split {
            slice: self.finish(StatementKind::Read, &slice)?,
            count: self.finish(StatementKind::Read, &count)?,
        })
    }

    fn compile_select(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        sorts: &[SortSpec],
        keep: &[String],
    ) -> Result<Statement> {
        let mut select = self.select(scope, filter, keep)?;
        apply_sort(&mut select, sorts, &scope.audit);
        self.finish(StatementKind::Read, &select)
    }

    fn compile_insert(
        &self,
        scope: &TableScope,
        rows: &[DataRow],
        now: DateTime<Utc>,
        returns: &[String],
    ) -> Result<Statement> {
        let audit = &scope.audit;
        if self.flavor == SqlFlavor::MySql && returns.iter().any(|c| c != &audit.id) {
            return Err(QueryError::compilation(format!(
                "MySQL inserts can only return the generated '{}' column",
                audit.id
            )));
        }

        let mut columns: BTreeSet<&str> = rows.iter().flat_map(|row| row.keys().map(String::as_str)).collect();
        columns.insert(audit.created_at.as_str());
        columns.insert(audit.active.as_str());

        let mut insert = Query::insert();
        insert
            .into_table(self.table(scope))
            .columns(columns.iter().map(|c| Alias::new(*c)));

        for row in rows {
            let values: Vec<SimpleExpr> = columns
                .iter()
                .map(|column| {
                    if *column == audit.created_at {
                        stamp(now)
                    } else if *column == audit.active {
                        Expr::val(true).into()
                    } else {
                        row.get(*column).map(literal).unwrap_or_else(|| Expr::cust("DEFAULT"))
                    }
                })
                .collect();
            insert
                .values(values)
                .map_err(|e| QueryError::compilation(format!("invalid insert row: {}", e)))?;
        }

        if self.flavor == SqlFlavor::Postgres {
            insert.returning(Query::returning().columns(returns.iter().map(|c| Alias::new(c.as_str()))));
        }
        Ok(with_outs(self.finish(StatementKind::Insert, &insert)?, returns))
    }

    fn compile_update(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        payload: &DataRow,
        now: DateTime<Utc>,
        returns: &[String],
    ) -> Result<Statement> {
        // The update stamp always wins over a caller-supplied value.
        let mut values: Vec<(Alias, SimpleExpr)> = payload
            .iter()
            .filter(|(column, _)| **column != scope.audit.updated_at)
            .map(|(column, value)| (Alias::new(column.as_str()), literal(value)))
            .collect();
        values.push((Alias::new(scope.audit.updated_at.as_str()), stamp(now)));
        self.write_returning(scope, filter, values, returns)
    }

    fn compile_soft_delete(
        &self,
        scope: &TableScope,
        filter: &FilterExpression,
        now: DateTime<Utc>,
        returns: &[String],
    ) -> Result<Statement> {
        let values = vec![
            (Alias::new(scope.audit.active.as_str()), Expr::val(false).into()),
            (Alias::new(scope.audit.deleted_at.as_str()), stamp(now)),
        ];
        self.write_returning(scope, filter, values, returns)
    }

    fn compile_procedure(&self, scope: &TableScope, args: &[BindValue]) -> Result<Statement> {
        let mut name = String::new();
        if let Some(schema) = &scope.schema {
            name.push_str(&quote(self.flavor, schema));
            name.push('.');
        }
        name.push_str(&quote(self.flavor, &scope.table));

        let placeholders: Vec<String> = (1..=args.len())
            .map(|idx| match self.flavor {
                SqlFlavor::Postgres => format!("${}", idx),
                SqlFlavor::MySql => "?".to_string(),
            })
            .collect();
        let mut statement = Statement::new(StatementKind::Raw, format!("CALL {}({})", name, placeholders.join(", ")));
        for (idx, arg) in args.iter().enumerate() {
            statement.push_bind((idx + 1).to_string(), arg.clone());
        }
        Ok(statement)
    }
}
