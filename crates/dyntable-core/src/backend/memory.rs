//! In-process backend that interprets [`Statement`]s directly.
//!
//! Tables live in a shared state behind an async mutex. A transaction holds
//! the lock for its whole lifetime and works on a private copy of the state,
//! which replaces the shared one on commit. DDL is therefore transactional,
//! like it is on PostgreSQL.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{BackendError, BackendErrorKind};
use crate::sql::condition::compare_literals;
use crate::sql::{AlterAction, ColumnDef, Condition, Literal, OrderBy, Statement};
use crate::types::Row;

use super::{Backend, Transaction};

/// An in-memory SQL backend with PRIMARY KEY, UNIQUE, NOT NULL, DEFAULT and
/// serial semantics.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemTable>,
}

#[derive(Debug, Clone)]
struct MemTable {
    name: String,
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<Literal>>,
    /// Last value handed out per serial column.
    sequences: HashMap<String, i64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the physical tables, sorted.
    pub async fn table_names(&self) -> Vec<String> {
        self.state.lock().await.tables.keys().cloned().collect()
    }

    /// Column names of a physical table, in definition order.
    pub async fn column_names(&self, table: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, BackendError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, work }))
    }
}

/// A transaction over [`MemoryBackend`].
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn execute(&mut self, stmt: &Statement) -> Result<u64, BackendError> {
        debug!(backend = "memory", sql = %stmt, "execute");
        self.work.run(stmt).map(|(count, _)| count)
    }

    async fn query(&mut self, stmt: &Statement) -> Result<Vec<Row>, BackendError> {
        debug!(backend = "memory", sql = %stmt, "query");
        if !stmt.returns_rows() {
            return Err(BackendError::new(
                BackendErrorKind::Other,
                "statement does not return rows",
            ));
        }
        self.work.run(stmt).map(|(_, rows)| rows)
    }

    async fn commit(self: Box<Self>) -> Result<(), BackendError> {
        let MemoryTransaction { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BackendError> {
        Ok(())
    }
}

fn undefined_table(table: &str) -> BackendError {
    BackendError::new(
        BackendErrorKind::UndefinedTable,
        format!("relation \"{table}\" does not exist"),
    )
}

impl MemoryState {
    fn table(&self, name: &str) -> Result<&MemTable, BackendError> {
        self.tables.get(name).ok_or_else(|| undefined_table(name))
    }

    /// Run one statement. Each statement is applied to a copy of its table
    /// so a failing statement leaves no partial effects.
    fn run(&mut self, stmt: &Statement) -> Result<(u64, Vec<Row>), BackendError> {
        match stmt {
            Statement::CreateTable {
                table,
                columns,
                if_not_exists,
            } => {
                if self.tables.contains_key(table) {
                    if *if_not_exists {
                        return Ok((0, Vec::new()));
                    }
                    return Err(BackendError::new(
                        BackendErrorKind::DuplicateTable,
                        format!("relation \"{table}\" already exists"),
                    ));
                }
                let mut new = MemTable {
                    name: table.clone(),
                    columns: Vec::with_capacity(columns.len()),
                    rows: Vec::new(),
                    sequences: HashMap::new(),
                };
                for def in columns {
                    new.add_column(def.clone())?;
                }
                self.tables.insert(table.clone(), new);
                Ok((0, Vec::new()))
            }
            Statement::DropTable { table, if_exists } => {
                if self.tables.remove(table).is_none() && !*if_exists {
                    return Err(undefined_table(table));
                }
                Ok((0, Vec::new()))
            }
            Statement::AlterTable { table, actions } => {
                let mut next = self.table(table)?.clone();
                for action in actions {
                    match action {
                        AlterAction::AddColumn(def) => next.add_column(def.clone())?,
                        AlterAction::DropColumn(name) => next.drop_column(name)?,
                    }
                }
                next.check_constraints()?;
                self.tables.insert(table.clone(), next);
                Ok((0, Vec::new()))
            }
            Statement::Insert {
                table,
                columns,
                rows,
                returning,
            } => {
                let mut next = self.table(table)?.clone();
                let positions = columns
                    .iter()
                    .map(|c| next.position(c))
                    .collect::<Result<Vec<_>, _>>()?;

                let start = next.rows.len();
                for values in rows {
                    let mut given: Vec<Option<Literal>> = vec![None; next.columns.len()];
                    for (&i, param) in positions.iter().zip(values) {
                        given[i] = Some(param.value.clone());
                    }
                    let mut row = Vec::with_capacity(given.len());
                    for (i, value) in given.into_iter().enumerate() {
                        let value = match value {
                            Some(v) => v,
                            None => next.fill(i),
                        };
                        row.push(value);
                    }
                    next.rows.push(row);
                }
                next.check_constraints()?;

                let inserted = if *returning {
                    next.rows[start..].iter().map(|r| next.to_json(r, None)).collect()
                } else {
                    Vec::new()
                };
                self.tables.insert(table.clone(), next);
                Ok((rows.len() as u64, inserted))
            }
            Statement::Update {
                table,
                assignments,
                filter,
                returning,
            } => {
                let mut next = self.table(table)?.clone();
                next.check_filter(filter)?;
                let targets = assignments
                    .iter()
                    .map(|(c, p)| Ok((next.position(c)?, p.value.clone())))
                    .collect::<Result<Vec<_>, BackendError>>()?;

                let mut updated = Vec::new();
                let mut count = 0;
                for r in 0..next.rows.len() {
                    if !next.matches(&next.rows[r], filter) {
                        continue;
                    }
                    for (i, value) in &targets {
                        next.rows[r][*i] = value.clone();
                    }
                    count += 1;
                    if *returning {
                        updated.push(next.to_json(&next.rows[r], None));
                    }
                }
                next.check_constraints()?;
                self.tables.insert(table.clone(), next);
                Ok((count, updated))
            }
            Statement::Delete {
                table,
                filter,
                returning,
            } => {
                let mut next = self.table(table)?.clone();
                next.check_filter(filter)?;

                let (deleted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut next.rows)
                    .into_iter()
                    .partition(|row| next.matches(row, filter));
                next.rows = kept;

                let count = deleted.len() as u64;
                let rows = if *returning {
                    deleted.iter().map(|r| next.to_json(r, None)).collect()
                } else {
                    Vec::new()
                };
                self.tables.insert(table.clone(), next);
                Ok((count, rows))
            }
            Statement::Select {
                table,
                fields,
                filter,
                order_by,
                limit,
                offset,
            } => {
                let t = self.table(table)?;
                t.check_filter(filter)?;
                let projection = if fields.is_empty() {
                    None
                } else {
                    Some(
                        fields
                            .iter()
                            .map(|f| t.position(f))
                            .collect::<Result<Vec<_>, _>>()?,
                    )
                };
                let order = order_by
                    .iter()
                    .map(|o| Ok((t.position(&o.column)?, o)))
                    .collect::<Result<Vec<(usize, &OrderBy)>, BackendError>>()?;

                let mut selected: Vec<&Vec<Literal>> =
                    t.rows.iter().filter(|r| t.matches(r, filter)).collect();
                selected.sort_by(|a, b| {
                    order
                        .iter()
                        .map(|(i, o)| {
                            let ord = order_values(&a[*i], &b[*i]);
                            if o.descending {
                                ord.reverse()
                            } else {
                                ord
                            }
                        })
                        .find(|ord| *ord != Ordering::Equal)
                        .unwrap_or(Ordering::Equal)
                });

                let skip = offset.unwrap_or(0) as usize;
                let take = limit.map_or(usize::MAX, |l| l as usize);
                let rows: Vec<Row> = selected
                    .into_iter()
                    .skip(skip)
                    .take(take)
                    .map(|r| t.to_json(r, projection.as_deref()))
                    .collect();
                Ok((rows.len() as u64, rows))
            }
        }
    }
}

/// NULLs sort after every value, as in PostgreSQL.
fn order_values(a: &Literal, b: &Literal) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_literals(a, b).unwrap_or(Ordering::Equal),
    }
}

impl MemTable {
    fn position(&self, column: &str) -> Result<usize, BackendError> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| {
                BackendError::new(
                    BackendErrorKind::UndefinedColumn,
                    format!("column \"{column}\" of relation \"{}\" does not exist", self.name),
                )
            })
    }

    /// Value for a column the statement did not provide.
    fn fill(&mut self, i: usize) -> Literal {
        let column = &self.columns[i];
        if column.column_type.is_serial() {
            let seq = self.sequences.entry(column.name.clone()).or_insert(0);
            *seq += 1;
            return Literal::Int(*seq);
        }
        column.default.clone().unwrap_or(Literal::Null)
    }

    fn add_column(&mut self, def: ColumnDef) -> Result<(), BackendError> {
        if self.columns.iter().any(|c| c.name == def.name) {
            return Err(BackendError::new(
                BackendErrorKind::DuplicateColumn,
                format!(
                    "column \"{}\" of relation \"{}\" already exists",
                    def.name, self.name
                ),
            ));
        }
        if def.primary && self.columns.iter().any(|c| c.primary) {
            return Err(BackendError::new(
                BackendErrorKind::Other,
                format!("multiple primary keys for table \"{}\" are not allowed", self.name),
            ));
        }
        self.columns.push(def);
        let i = self.columns.len() - 1;
        for r in 0..self.rows.len() {
            let value = self.fill(i);
            self.rows[r].push(value);
        }
        Ok(())
    }

    fn drop_column(&mut self, name: &str) -> Result<(), BackendError> {
        let i = self.position(name)?;
        self.columns.remove(i);
        for row in &mut self.rows {
            row.remove(i);
        }
        self.sequences.remove(name);
        Ok(())
    }

    fn check_constraints(&self) -> Result<(), BackendError> {
        for (i, column) in self.columns.iter().enumerate() {
            if (column.not_null || column.primary) && self.rows.iter().any(|r| r[i].is_null()) {
                return Err(BackendError::new(
                    BackendErrorKind::NotNullViolation,
                    format!(
                        "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                        column.name, self.name
                    ),
                ));
            }
            if column.primary || column.unique {
                let values: Vec<&Literal> = self
                    .rows
                    .iter()
                    .map(|r| &r[i])
                    .filter(|v| !v.is_null())
                    .collect();
                for (a, x) in values.iter().enumerate() {
                    if values[a + 1..]
                        .iter()
                        .any(|y| compare_literals(x, y) == Some(Ordering::Equal))
                    {
                        return Err(BackendError::new(
                            BackendErrorKind::UniqueViolation,
                            format!(
                                "duplicate key value violates unique constraint \"{}_{}_key\"",
                                self.name, column.name
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_filter(&self, filter: &Option<Condition>) -> Result<(), BackendError> {
        if let Some(cond) = filter {
            for column in cond.columns() {
                self.position(column)?;
            }
        }
        Ok(())
    }

    fn matches(&self, row: &[Literal], filter: &Option<Condition>) -> bool {
        match filter {
            None => true,
            Some(cond) => cond.eval(&|column: &str| {
                self.columns
                    .iter()
                    .position(|c| c.name == column)
                    .map(|i| &row[i])
            }),
        }
    }

    fn to_json(&self, row: &[Literal], projection: Option<&[usize]>) -> Row {
        match projection {
            None => self
                .columns
                .iter()
                .zip(row)
                .map(|(c, v)| (c.name.clone(), v.to_json()))
                .collect(),
            Some(indices) => indices
                .iter()
                .map(|&i| (self.columns[i].name.clone(), row[i].to_json()))
                .collect(),
        }
    }
}
