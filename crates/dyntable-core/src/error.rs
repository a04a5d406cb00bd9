//! Error types for all dyntable operations.

use std::fmt;

use thiserror::Error;

/// Top-level error type for dyntable operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Table and column definition errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("column=({column}) {reason}")]
    InvalidColumn { column: String, reason: String },

    #[error("invalid table name '{name}': {reason}")]
    InvalidTableName { name: String, reason: String },

    #[error("invalid owner id: {0}")]
    InvalidOwner(i64),

    #[error("table must have at least one column")]
    NoColumns,

    #[error("table must contain one primary column")]
    PrimaryKeyRequired,

    #[error("table must contain only one primary column, found [{}]", .0.join(", "))]
    MultiplePrimaryKeys(Vec<String>),

    #[error("table {0} already exists")]
    TableAlreadyExists(String),

    #[error("physical table {0} already exists")]
    DuplicateTable(String),

    #[error("table {0} not found")]
    NotFound(String),

    #[error("{}", column_list(.0, "already exists", "already exist"))]
    ColumnExists(Vec<String>),

    #[error("{}", column_list(.0, "does not exist", "do not exist"))]
    ColumnNotFound(Vec<String>),

    #[error("can not delete all {0} columns of a table, delete the table instead")]
    UseDropTableInstead(usize),

    #[error("column {new} can not be primary: table already has primary column {existing}")]
    PrimaryKeyConflict { existing: String, new: String },

    #[error("can not drop primary column {0}")]
    DropPrimaryColumn(String),
}

/// Row payload and filter errors.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{}", column_list(.0, "does not exist", "do not exist"))]
    UnknownColumn(Vec<String>),

    #[error("value for boolean column [{column}] must be exactly one boolean")]
    InvalidBooleanFilter { column: String },

    #[error("value list for column [{column}] can not be empty")]
    EmptyValueList { column: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("delete requires at least one filter")]
    EmptyFilter,

    #[error("{}column [{column}] can not have characters more than [{max}]", RowPrefix(.row))]
    ValueTooLong {
        column: String,
        row: Option<usize>,
        max: u32,
    },

    #[error("{}invalid value for column [{column}]: {reason}", RowPrefix(.row))]
    InvalidValue {
        column: String,
        row: Option<usize>,
        reason: String,
    },

    #[error("missing required column [{column}] in row [{row}]")]
    MissingRequiredColumn { column: String, row: usize },

    #[error("null value given for not nullable column [{column}] in row [{row}]")]
    NullRequiredColumn { column: String, row: usize },

    #[error("which row to update? provide a value for primary column [{column}] in row [{row}]")]
    MissingPrimaryValue { column: String, row: usize },

    #[error("table {0} has no primary column")]
    NoPrimaryColumn(String),

    #[error("row [{row}] has no columns to update")]
    NothingToUpdate { row: usize },

    #[error("no rows provided")]
    EmptyPayload,

    #[error("empty row provided at row [{row}]")]
    EmptyRow { row: usize },
}

/// Catalog record decoding errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("corrupted catalog entry: {0}")]
    Corrupted(String),
}

/// Classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    DuplicateTable,
    UndefinedTable,
    DuplicateColumn,
    UndefinedColumn,
    UniqueViolation,
    NotNullViolation,
    InvalidValue,
    Connection,
    Other,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendErrorKind::DuplicateTable => "duplicate table",
            BackendErrorKind::UndefinedTable => "undefined table",
            BackendErrorKind::DuplicateColumn => "duplicate column",
            BackendErrorKind::UndefinedColumn => "undefined column",
            BackendErrorKind::UniqueViolation => "unique violation",
            BackendErrorKind::NotNullViolation => "not null violation",
            BackendErrorKind::InvalidValue => "invalid value",
            BackendErrorKind::Connection => "connection",
            BackendErrorKind::Other => "backend",
        };
        f.write_str(s)
    }
}

/// An opaque transport or SQL failure reported by a backend.
#[derive(Debug, Error)]
#[error("{kind} error: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is(&self, kind: BackendErrorKind) -> bool {
        self.kind == kind
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn column_list(columns: &[String], singular: &str, plural: &str) -> String {
    if columns.len() == 1 {
        format!("column [{}] {singular}", columns[0])
    } else {
        format!("columns [{}] {plural}", columns.join(", "))
    }
}

struct RowPrefix<'a>(&'a Option<usize>);

impl fmt::Display for RowPrefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(row) => write!(f, "row [{row}] "),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_column_message_is_plural_aware() {
        let one = QueryError::UnknownColumn(vec!["age".to_string()]);
        assert_eq!(one.to_string(), "column [age] does not exist");

        let many = QueryError::UnknownColumn(vec!["age".to_string(), "email(row#2)".to_string()]);
        assert_eq!(many.to_string(), "columns [age, email(row#2)] do not exist");
    }

    #[test]
    fn test_value_too_long_names_row_when_present() {
        let err = QueryError::ValueTooLong {
            column: "title".to_string(),
            row: Some(2),
            max: 5,
        };
        assert_eq!(
            err.to_string(),
            "row [2] column [title] can not have characters more than [5]"
        );

        let err = QueryError::ValueTooLong {
            column: "title".to_string(),
            row: None,
            max: 5,
        };
        assert_eq!(
            err.to_string(),
            "column [title] can not have characters more than [5]"
        );
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new(BackendErrorKind::UniqueViolation, "key (name)=(t) exists");
        assert!(err.is(BackendErrorKind::UniqueViolation));
        assert_eq!(err.to_string(), "unique violation error: key (name)=(t) exists");
    }
}
