//! # DynTable
//!
//! A dynamic table and row engine: tenants declare relational tables at
//! runtime from JSON column descriptors, and read and write rows through a
//! type-checked OR/AND predicate language.
//!
//! Each table has a catalog row in one shared metadata table and a physical
//! table in the backend. Both are created, altered and dropped in a single
//! transaction. Every value reaches the backend as a bind parameter.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dyntable_core::api::{EngineConfig, TableEngine};
//! use dyntable_core::backend::MemoryBackend;
//! use dyntable_core::compile::PredicateSpec;
//! use dyntable_core::types::{ColumnDescriptor, ColumnType};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), dyntable_core::error::Error> {
//! let engine = TableEngine::open(Arc::new(MemoryBackend::new()), EngineConfig::default()).await?;
//! let owner = 1;
//!
//! // Create a table
//! engine
//!     .create_table(owner, "users")
//!     .column(ColumnDescriptor::new("id", ColumnType::Serial).primary())
//!     .column(ColumnDescriptor::new("name", ColumnType::Varchar).length(40).required())
//!     .column(ColumnDescriptor::new("active", ColumnType::Boolean))
//!     .execute()
//!     .await?;
//!
//! // Insert rows
//! let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_value(json!([
//!     {"name": "alice", "active": true},
//!     {"name": "bob", "active": false}
//! ]))
//! .unwrap();
//! engine.insert_rows(owner, "users", &rows).await?;
//!
//! // Read them back
//! let active = engine
//!     .select(owner, "users")
//!     .fields(["name"])
//!     .filter(PredicateSpec::new().and("active", [true]))
//!     .execute()
//!     .await?;
//! assert_eq!(active[0]["name"], "alice");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backend;
pub mod catalog;
pub mod compile;
pub mod error;
pub mod sql;
pub mod types;
