//! Compilers from JSON-shaped requests to [`Statement`](crate::sql::Statement)s.
//!
//! - [`column`]: type mapper, names and literal formatting
//! - [`schema`]: CREATE/ALTER/DROP TABLE
//! - [`predicate`]: filter maps to WHERE conditions
//! - [`rows`]: INSERT/UPDATE/DELETE/SELECT

pub mod column;
pub mod predicate;
pub mod rows;
pub mod schema;

pub use column::{
    compile_column, format_literal, parse_column_type, validate_column_name, validate_table_name,
};
pub use predicate::{compile_predicate, PredicateSpec, AND_GROUP_KEY};
pub use rows::{compile_delete, compile_insert, compile_select, compile_update, SelectQuery};
pub use schema::{compile_add_columns, compile_create_table, compile_drop_columns, compile_drop_table};
