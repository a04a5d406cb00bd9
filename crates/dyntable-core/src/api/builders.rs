use crate::compile::{PredicateSpec, SelectQuery};
use crate::error::Error;
use crate::types::{ColumnDescriptor, OwnerId, Row, TableSchema};

use super::engine::TableEngine;

// ---------------------------------------------------------------------------
// TableBuilder
// ---------------------------------------------------------------------------

/// Builder for creating a new table.
pub struct TableBuilder<'a> {
    engine: &'a TableEngine,
    owner: OwnerId,
    name: String,
    columns: Vec<ColumnDescriptor>,
}

impl<'a> TableBuilder<'a> {
    pub(crate) fn new(engine: &'a TableEngine, owner: OwnerId, name: String) -> Self {
        Self {
            engine,
            owner,
            name,
            columns: Vec::new(),
        }
    }

    /// Append a column.
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Append several columns, in order.
    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnDescriptor>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Create the physical table and its catalog row.
    pub async fn execute(self) -> Result<TableSchema, Error> {
        self.engine
            .create_table_with(self.owner, &self.name, self.columns)
            .await
    }
}

// ---------------------------------------------------------------------------
// SelectBuilder
// ---------------------------------------------------------------------------

/// Builder for a filtered read.
pub struct SelectBuilder<'a> {
    engine: &'a TableEngine,
    owner: OwnerId,
    table: String,
    query: SelectQuery,
}

impl<'a> SelectBuilder<'a> {
    pub(crate) fn new(engine: &'a TableEngine, owner: OwnerId, table: String) -> Self {
        Self {
            engine,
            owner,
            table,
            query: SelectQuery::default(),
        }
    }

    /// Restrict the returned columns. Without fields every column is returned.
    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.query.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, predicate: PredicateSpec) -> Self {
        self.query.predicate = predicate;
        self
    }

    /// Sort ascending by `column`. Repeated calls add tie-breakers.
    pub fn order_by(mut self, column: &str) -> Self {
        self.query.order_by.push((column.to_string(), false));
        self
    }

    /// Sort descending by `column`.
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.query.order_by.push((column.to_string(), true));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.query.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.query.offset = Some(n);
        self
    }

    /// Execute the read.
    pub async fn execute(self) -> Result<Vec<Row>, Error> {
        self.engine
            .run_select(self.owner, &self.table, &self.query)
            .await
    }
}
