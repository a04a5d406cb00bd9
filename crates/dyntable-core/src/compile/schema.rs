//! DDL compilation: validates table-level column sets and produces
//! CREATE/ALTER/DROP statements.

use std::collections::HashSet;

use crate::error::SchemaError;
use crate::sql::{AlterAction, ColumnDef, Statement};
use crate::types::{ColumnDescriptor, TableSchema};

use super::column::compile_column;

/// Compile the column list of a new table into `CREATE TABLE`.
///
/// Every column must compile, names must be distinct, and exactly one
/// column must be primary.
pub fn compile_create_table(
    table: &str,
    columns: &[ColumnDescriptor],
) -> Result<Statement, SchemaError> {
    if columns.is_empty() {
        return Err(SchemaError::NoColumns);
    }
    let defs = compile_distinct(columns)?;

    let primaries: Vec<String> = columns
        .iter()
        .filter(|c| c.primary)
        .map(|c| c.name.clone())
        .collect();
    match primaries.len() {
        0 => return Err(SchemaError::PrimaryKeyRequired),
        1 => {}
        _ => return Err(SchemaError::MultiplePrimaryKeys(primaries)),
    }

    Ok(Statement::CreateTable {
        table: table.to_string(),
        columns: defs,
        if_not_exists: false,
    })
}

/// Compile new columns for an existing table into `ALTER TABLE ... ADD COLUMN`.
pub fn compile_add_columns(
    schema: &TableSchema,
    columns: &[ColumnDescriptor],
) -> Result<Statement, SchemaError> {
    if columns.is_empty() {
        return Err(SchemaError::NoColumns);
    }
    let defs = compile_distinct(columns)?;

    let existing: Vec<String> = columns
        .iter()
        .filter(|c| schema.has_column(&c.name))
        .map(|c| c.name.clone())
        .collect();
    if !existing.is_empty() {
        return Err(SchemaError::ColumnExists(existing));
    }

    let new_primaries: Vec<&ColumnDescriptor> = columns.iter().filter(|c| c.primary).collect();
    if new_primaries.len() > 1 {
        return Err(SchemaError::MultiplePrimaryKeys(
            new_primaries.iter().map(|c| c.name.clone()).collect(),
        ));
    }
    if let (Some(current), Some(new)) = (schema.primary_column(), new_primaries.first()) {
        return Err(SchemaError::PrimaryKeyConflict {
            existing: current.name.clone(),
            new: new.name.clone(),
        });
    }

    Ok(Statement::AlterTable {
        table: schema.name.clone(),
        actions: defs.into_iter().map(AlterAction::AddColumn).collect(),
    })
}

/// Compile a column removal into `ALTER TABLE ... DROP COLUMN`.
///
/// Returns the statement and the column list that remains afterwards.
/// Repeated names are dropped once.
pub fn compile_drop_columns(
    schema: &TableSchema,
    names: &[String],
) -> Result<(Statement, Vec<ColumnDescriptor>), SchemaError> {
    let mut seen = HashSet::new();
    let names: Vec<&String> = names.iter().filter(|n| seen.insert(n.as_str())).collect();
    if names.is_empty() {
        return Err(SchemaError::NoColumns);
    }

    let unknown: Vec<String> = names
        .iter()
        .filter(|n| !schema.has_column(n))
        .map(|n| n.to_string())
        .collect();
    if !unknown.is_empty() {
        return Err(SchemaError::ColumnNotFound(unknown));
    }

    if names.len() == schema.columns.len() {
        return Err(SchemaError::UseDropTableInstead(names.len()));
    }

    if let Some(primary) = schema.primary_column() {
        if seen.contains(primary.name.as_str()) {
            return Err(SchemaError::DropPrimaryColumn(primary.name.clone()));
        }
    }

    let remaining = schema
        .columns
        .iter()
        .filter(|c| !seen.contains(c.name.as_str()))
        .cloned()
        .collect();
    let stmt = Statement::AlterTable {
        table: schema.name.clone(),
        actions: names
            .into_iter()
            .map(|n| AlterAction::DropColumn(n.clone()))
            .collect(),
    };
    Ok((stmt, remaining))
}

pub fn compile_drop_table(table: &str) -> Statement {
    Statement::DropTable {
        table: table.to_string(),
        if_exists: true,
    }
}

fn compile_distinct(columns: &[ColumnDescriptor]) -> Result<Vec<ColumnDef>, SchemaError> {
    let mut names = HashSet::new();
    let mut defs = Vec::with_capacity(columns.len());
    for desc in columns {
        let def = compile_column(desc)?;
        if !names.insert(desc.name.as_str()) {
            return Err(SchemaError::InvalidColumn {
                column: desc.name.clone(),
                reason: "is declared more than once".to_string(),
            });
        }
        defs.push(def);
    }
    Ok(defs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;
    use chrono::Utc;

    fn schema(columns: Vec<ColumnDescriptor>) -> TableSchema {
        TableSchema {
            id: 1,
            name: "people".to_string(),
            owner_id: 7,
            columns,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn people() -> TableSchema {
        schema(vec![
            ColumnDescriptor::new("id", ColumnType::Serial).primary(),
            ColumnDescriptor::new("name", ColumnType::Varchar).length(40).required(),
            ColumnDescriptor::new("nick", ColumnType::Text),
        ])
    }

    // -----------------------------------------------------------------------
    // CREATE TABLE
    // -----------------------------------------------------------------------

    #[test]
    fn test_create_table_sql() {
        let stmt = compile_create_table(
            "people",
            &[
                ColumnDescriptor::new("id", ColumnType::Serial).primary(),
                ColumnDescriptor::new("email", ColumnType::Varchar)
                    .length(120)
                    .unique()
                    .required(),
            ],
        )
        .unwrap();
        assert_eq!(
            stmt.render().sql,
            "CREATE TABLE \"people\" (\"id\" SERIAL PRIMARY KEY, \"email\" VARCHAR(120) UNIQUE NOT NULL)"
        );
    }

    #[test]
    fn test_create_table_requires_exactly_one_primary() {
        let none = compile_create_table("people", &[ColumnDescriptor::new("a", ColumnType::Text)]);
        assert!(matches!(none, Err(SchemaError::PrimaryKeyRequired)));

        let two = compile_create_table(
            "people",
            &[
                ColumnDescriptor::new("a", ColumnType::Integer).primary(),
                ColumnDescriptor::new("b", ColumnType::Integer).primary(),
            ],
        );
        match two {
            Err(SchemaError::MultiplePrimaryKeys(names)) => assert_eq!(names, vec!["a", "b"]),
            other => panic!("expected MultiplePrimaryKeys, got {other:?}"),
        }
    }

    #[test]
    fn test_create_table_rejects_duplicates_and_empty() {
        let dup = compile_create_table(
            "people",
            &[
                ColumnDescriptor::new("a", ColumnType::Integer).primary(),
                ColumnDescriptor::new("a", ColumnType::Text),
            ],
        );
        assert!(matches!(dup, Err(SchemaError::InvalidColumn { .. })));
        assert!(matches!(
            compile_create_table("people", &[]),
            Err(SchemaError::NoColumns)
        ));
    }

    // -----------------------------------------------------------------------
    // ADD COLUMN
    // -----------------------------------------------------------------------

    #[test]
    fn test_add_columns_sql() {
        let stmt = compile_add_columns(
            &people(),
            &[
                ColumnDescriptor::new("age", ColumnType::SmallInt),
                ColumnDescriptor::new("bio", ColumnType::Text).default_value(""),
            ],
        )
        .unwrap();
        assert_eq!(
            stmt.render().sql,
            "ALTER TABLE \"people\" ADD COLUMN \"age\" SMALLINT, ADD COLUMN \"bio\" TEXT DEFAULT ('')"
        );
    }

    #[test]
    fn test_add_existing_column_fails() {
        let err = compile_add_columns(
            &people(),
            &[
                ColumnDescriptor::new("nick", ColumnType::Text),
                ColumnDescriptor::new("age", ColumnType::Integer),
            ],
        )
        .unwrap_err();
        match err {
            SchemaError::ColumnExists(names) => assert_eq!(names, vec!["nick"]),
            other => panic!("expected ColumnExists, got {other:?}"),
        }
    }

    #[test]
    fn test_add_second_primary_conflicts() {
        let err = compile_add_columns(
            &people(),
            &[ColumnDescriptor::new("uuid", ColumnType::Uuid).primary()],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::PrimaryKeyConflict { .. }));
    }

    // -----------------------------------------------------------------------
    // DROP COLUMN
    // -----------------------------------------------------------------------

    #[test]
    fn test_drop_columns_sql_and_remaining() {
        let (stmt, remaining) =
            compile_drop_columns(&people(), &["nick".to_string(), "nick".to_string()]).unwrap();
        assert_eq!(
            stmt.render().sql,
            "ALTER TABLE \"people\" DROP COLUMN \"nick\""
        );
        let names: Vec<&str> = remaining.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_drop_unknown_columns_lists_all() {
        let err = compile_drop_columns(
            &people(),
            &["ghost".to_string(), "nick".to_string(), "phantom".to_string()],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "columns [ghost, phantom] do not exist");
    }

    #[test]
    fn test_drop_all_columns_requires_drop_table() {
        let all: Vec<String> = people().column_names().map(String::from).collect();
        let err = compile_drop_columns(&people(), &all).unwrap_err();
        assert!(matches!(err, SchemaError::UseDropTableInstead(3)));
    }

    #[test]
    fn test_drop_primary_column_rejected() {
        let err = compile_drop_columns(&people(), &["id".to_string()]).unwrap_err();
        assert!(matches!(err, SchemaError::DropPrimaryColumn(_)));
    }
}
