//! Table catalog: one shared metadata table describing every dynamic table.

pub mod ops;

use async_trait::async_trait;

use crate::backend::Transaction;
use crate::error::Error;
use crate::types::{ColumnDescriptor, OwnerId, TableSchema};

pub use ops::SqlCatalog;

/// Repository over the catalog rows. All methods run inside the caller's
/// transaction so catalog and physical changes commit together.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Name of the metadata table.
    fn table_name(&self) -> &str;

    /// Create the metadata table if it does not exist yet.
    async fn ensure(&self, txn: &mut dyn Transaction) -> Result<(), Error>;

    /// Record a new table. A name already in the catalog fails with a
    /// unique-violation backend error.
    async fn insert(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        name: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<TableSchema, Error>;

    async fn get(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        name: &str,
    ) -> Result<Option<TableSchema>, Error>;

    /// Every table of `owner`, oldest first.
    async fn list(&self, txn: &mut dyn Transaction, owner: OwnerId)
        -> Result<Vec<TableSchema>, Error>;

    /// Replace the column list of `schema`, bumping `updated_at`.
    async fn update_columns(
        &self,
        txn: &mut dyn Transaction,
        schema: &TableSchema,
        columns: &[ColumnDescriptor],
    ) -> Result<TableSchema, Error>;

    /// Delete the row for (owner, name), returning how many rows went away.
    async fn delete(&self, txn: &mut dyn Transaction, owner: OwnerId, name: &str)
        -> Result<u64, Error>;
}
