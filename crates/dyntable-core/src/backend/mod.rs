//! Physical SQL backends.
//!
//! The engine only talks to a [`Backend`] through [`Transaction`]s. Every
//! public engine operation opens one transaction, runs its statements, and
//! commits or rolls back as a unit.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::sql::Statement;
use crate::types::Row;

pub use memory::MemoryBackend;
#[cfg(feature = "postgres")]
pub use postgres::PgBackend;

/// A transactional SQL execution handle.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Start a transaction. Backends serialize transactions, so a caller must
    /// finish one before beginning the next.
    async fn begin(&self) -> Result<Box<dyn Transaction>, BackendError>;
}

/// A scoped transaction. Dropping it without [`commit`](Transaction::commit)
/// discards its changes.
#[async_trait]
pub trait Transaction: Send {
    /// Execute a statement, returning the number of rows affected.
    async fn execute(&mut self, stmt: &Statement) -> Result<u64, BackendError>;

    /// Execute a row-returning statement (SELECT or `RETURNING *`) and
    /// decode each row into a column-ordered map.
    async fn query(&mut self, stmt: &Statement) -> Result<Vec<Row>, BackendError>;

    async fn commit(self: Box<Self>) -> Result<(), BackendError>;

    async fn rollback(self: Box<Self>) -> Result<(), BackendError>;
}
