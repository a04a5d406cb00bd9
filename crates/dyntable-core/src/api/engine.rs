use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{Backend, Transaction};
use crate::catalog::{CatalogStore, SqlCatalog};
use crate::compile::{
    compile_add_columns, compile_create_table, compile_delete, compile_drop_columns,
    compile_drop_table, compile_insert, compile_select, compile_update, validate_table_name,
    PredicateSpec, SelectQuery,
};
use crate::error::{BackendErrorKind, Error, SchemaError};
use crate::types::{ColumnDescriptor, OwnerId, Row, TableSchema, DEFAULT_CATALOG_TABLE};

use super::builders::{SelectBuilder, TableBuilder};

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name of the shared metadata table.
    pub catalog_table: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog_table: DEFAULT_CATALOG_TABLE.to_string(),
        }
    }
}

/// The dynamic table and row engine.
///
/// `TableEngine` is cheaply clonable (`Arc`-based) and `Send + Sync`. Every
/// operation runs in a single backend transaction, so the catalog row and
/// the physical table are always changed together.
#[derive(Clone)]
pub struct TableEngine {
    backend: Arc<dyn Backend>,
    catalog: Arc<dyn CatalogStore>,
}

impl TableEngine {
    /// Open an engine over `backend` with the SQL catalog, creating the
    /// metadata table if needed.
    pub async fn open(backend: Arc<dyn Backend>, config: EngineConfig) -> Result<Self, Error> {
        let catalog = Arc::new(SqlCatalog::new(config.catalog_table));
        Self::with_catalog(backend, catalog).await
    }

    /// Open an engine with a custom catalog store.
    pub async fn with_catalog(
        backend: Arc<dyn Backend>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Result<Self, Error> {
        let engine = Self { backend, catalog };
        let mut txn = engine.backend.begin().await?;
        let result = engine.catalog.ensure(txn.as_mut()).await;
        engine.finish(txn, result).await?;
        info!(
            backend = engine.backend.name(),
            catalog = engine.catalog.table_name(),
            "table engine ready"
        );
        Ok(engine)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    /// Create a table. Returns a builder to declare the columns.
    pub fn create_table(&self, owner: OwnerId, name: &str) -> TableBuilder<'_> {
        TableBuilder::new(self, owner, name.to_string())
    }

    pub(crate) async fn create_table_with(
        &self,
        owner: OwnerId,
        name: &str,
        columns: Vec<ColumnDescriptor>,
    ) -> Result<TableSchema, Error> {
        check_owner(owner)?;
        validate_table_name(name, self.catalog.table_name())?;
        let stmt = compile_create_table(name, &columns)?;
        debug!(sql = %stmt, "create table");

        let mut txn = self.backend.begin().await?;
        if let Err(e) = txn.execute(&stmt).await {
            rollback(txn).await;
            if e.is(BackendErrorKind::DuplicateTable) {
                return Err(SchemaError::DuplicateTable(name.to_string()).into());
            }
            self.remove_orphan(owner, name).await;
            return Err(e.into());
        }

        let result = match self.catalog.insert(txn.as_mut(), owner, name, &columns).await {
            Err(Error::Backend(e)) if e.is(BackendErrorKind::UniqueViolation) => {
                Err(SchemaError::TableAlreadyExists(name.to_string()).into())
            }
            other => other,
        };
        let schema = self.finish(txn, result).await?;
        info!(owner, table = name, columns = schema.columns.len(), "table created");
        Ok(schema)
    }

    /// Delete a catalog row left behind for a table whose physical creation
    /// failed. Failures are logged, never surfaced.
    async fn remove_orphan(&self, owner: OwnerId, name: &str) {
        let result = match self.backend.begin().await {
            Ok(mut txn) => {
                let result = self.catalog.delete(txn.as_mut(), owner, name).await;
                self.finish(txn, result).await
            }
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(0) => {}
            Ok(_) => warn!(owner, table = name, "removed orphaned catalog row"),
            Err(e) => warn!(owner, table = name, error = %e, "failed to remove orphaned catalog row"),
        }
    }

    /// List the tables of `owner`.
    pub async fn list_tables(&self, owner: OwnerId) -> Result<Vec<TableSchema>, Error> {
        check_owner(owner)?;
        let mut txn = self.backend.begin().await?;
        let result = self.catalog.list(txn.as_mut(), owner).await;
        self.finish(txn, result).await
    }

    /// Describe one table. Tables of other owners are `NotFound`.
    pub async fn get_table(&self, owner: OwnerId, name: &str) -> Result<TableSchema, Error> {
        check_owner(owner)?;
        let mut txn = self.backend.begin().await?;
        let result = self.load(txn.as_mut(), owner, name).await;
        self.finish(txn, result).await
    }

    /// Drop a table and its catalog row.
    pub async fn drop_table(&self, owner: OwnerId, name: &str) -> Result<(), Error> {
        check_owner(owner)?;
        let mut txn = self.backend.begin().await?;
        let result = self.drop_table_in(txn.as_mut(), owner, name).await;
        self.finish(txn, result).await?;
        info!(owner, table = name, "table dropped");
        Ok(())
    }

    async fn drop_table_in(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        name: &str,
    ) -> Result<(), Error> {
        if self.catalog.delete(txn, owner, name).await? == 0 {
            return Err(SchemaError::NotFound(name.to_string()).into());
        }
        txn.execute(&compile_drop_table(name)).await?;
        Ok(())
    }

    /// Add columns to a table.
    pub async fn add_columns(
        &self,
        owner: OwnerId,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<TableSchema, Error> {
        check_owner(owner)?;
        let mut txn = self.backend.begin().await?;
        let result = self.add_columns_in(txn.as_mut(), owner, table, columns).await;
        let schema = self.finish(txn, result).await?;
        info!(owner, table, added = columns.len(), "columns added");
        Ok(schema)
    }

    async fn add_columns_in(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<TableSchema, Error> {
        let schema = self.load(txn, owner, table).await?;
        let stmt = compile_add_columns(&schema, columns)?;
        debug!(sql = %stmt, "add columns");
        txn.execute(&stmt).await?;

        let mut next = schema.columns.clone();
        next.extend_from_slice(columns);
        self.catalog.update_columns(txn, &schema, &next).await
    }

    /// Drop columns from a table. The primary column and the full column set
    /// can not be dropped.
    pub async fn drop_columns(
        &self,
        owner: OwnerId,
        table: &str,
        names: &[String],
    ) -> Result<TableSchema, Error> {
        check_owner(owner)?;
        let mut txn = self.backend.begin().await?;
        let result = self.drop_columns_in(txn.as_mut(), owner, table, names).await;
        let schema = self.finish(txn, result).await?;
        info!(owner, table, columns = schema.columns.len(), "columns dropped");
        Ok(schema)
    }

    async fn drop_columns_in(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        table: &str,
        names: &[String],
    ) -> Result<TableSchema, Error> {
        let schema = self.load(txn, owner, table).await?;
        let (stmt, remaining) = compile_drop_columns(&schema, names)?;
        debug!(sql = %stmt, "drop columns");
        txn.execute(&stmt).await?;
        self.catalog.update_columns(txn, &schema, &remaining).await
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    /// Insert rows, returning the number inserted.
    pub async fn insert_rows(&self, owner: OwnerId, table: &str, rows: &[Row]) -> Result<u64, Error> {
        check_owner(owner)?;
        let mut txn = self.backend.begin().await?;
        let result = self.write_rows_in(txn.as_mut(), owner, table, rows, false).await;
        self.finish(txn, result).await
    }

    /// Update rows by primary column value, returning rows affected.
    pub async fn update_rows(&self, owner: OwnerId, table: &str, rows: &[Row]) -> Result<u64, Error> {
        check_owner(owner)?;
        let mut txn = self.backend.begin().await?;
        let result = self.write_rows_in(txn.as_mut(), owner, table, rows, true).await;
        self.finish(txn, result).await
    }

    async fn write_rows_in(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        table: &str,
        rows: &[Row],
        update: bool,
    ) -> Result<u64, Error> {
        let schema = self.load(txn, owner, table).await?;
        let stmts = if update {
            compile_update(&schema, rows)?
        } else {
            compile_insert(&schema, rows)?
        };
        let mut affected = 0;
        for stmt in &stmts {
            debug!(sql = %stmt, "write rows");
            affected += txn.execute(stmt).await?;
        }
        Ok(affected)
    }

    /// Delete the rows matching `filter`, returning them.
    pub async fn delete_rows(
        &self,
        owner: OwnerId,
        table: &str,
        filter: &PredicateSpec,
    ) -> Result<Vec<Row>, Error> {
        check_owner(owner)?;
        let mut txn = self.backend.begin().await?;
        let result = self.delete_rows_in(txn.as_mut(), owner, table, filter).await;
        self.finish(txn, result).await
    }

    async fn delete_rows_in(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        table: &str,
        filter: &PredicateSpec,
    ) -> Result<Vec<Row>, Error> {
        let schema = self.load(txn, owner, table).await?;
        let stmt = compile_delete(&schema, filter)?;
        debug!(sql = %stmt, "delete rows");
        Ok(txn.query(&stmt).await?)
    }

    /// Read rows. Returns a builder for fields, filter, ordering and paging.
    pub fn select(&self, owner: OwnerId, table: &str) -> SelectBuilder<'_> {
        SelectBuilder::new(self, owner, table.to_string())
    }

    /// Read `fields` (all when empty) of the rows matching `filter`.
    pub async fn get_rows(
        &self,
        owner: OwnerId,
        table: &str,
        fields: &[String],
        filter: &PredicateSpec,
    ) -> Result<Vec<Row>, Error> {
        self.select(owner, table)
            .fields(fields.iter().cloned())
            .filter(filter.clone())
            .execute()
            .await
    }

    pub(crate) async fn run_select(
        &self,
        owner: OwnerId,
        table: &str,
        query: &SelectQuery,
    ) -> Result<Vec<Row>, Error> {
        check_owner(owner)?;
        let mut txn = self.backend.begin().await?;
        let result = self.select_in(txn.as_mut(), owner, table, query).await;
        self.finish(txn, result).await
    }

    async fn select_in(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        table: &str,
        query: &SelectQuery,
    ) -> Result<Vec<Row>, Error> {
        let schema = self.load(txn, owner, table).await?;
        let stmt = compile_select(&schema, query)?;
        debug!(sql = %stmt, "select rows");
        Ok(txn.query(&stmt).await?)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        name: &str,
    ) -> Result<TableSchema, Error> {
        self.catalog
            .get(txn, owner, name)
            .await?
            .ok_or_else(|| SchemaError::NotFound(name.to_string()).into())
    }

    /// Commit on success, roll back on failure.
    async fn finish<T>(
        &self,
        txn: Box<dyn Transaction>,
        result: Result<T, Error>,
    ) -> Result<T, Error> {
        match result {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(e) => {
                rollback(txn).await;
                Err(e)
            }
        }
    }
}

async fn rollback(txn: Box<dyn Transaction>) {
    if let Err(e) = txn.rollback().await {
        warn!(error = %e, "rollback failed");
    }
}

fn check_owner(owner: OwnerId) -> Result<(), SchemaError> {
    if owner < 1 {
        return Err(SchemaError::InvalidOwner(owner));
    }
    Ok(())
}
