//! SQL-backed catalog store.
//!
//! Each dynamic table has one row in the metadata table. The column list is
//! stored as a JSON-serialized array of [`ColumnDescriptor`]s.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::backend::Transaction;
use crate::compile::column::compile_column;
use crate::error::{CatalogError, Error, SchemaError};
use crate::sql::{Condition, Literal, OrderBy, Param, Statement};
use crate::types::{ColumnDescriptor, ColumnType, OwnerId, Row, TableId, TableSchema};

use super::CatalogStore;

/// Catalog rows kept in a table of the backend itself.
#[derive(Debug, Clone)]
pub struct SqlCatalog {
    table: String,
}

#[derive(Deserialize)]
struct CatalogRecord {
    id: TableId,
    name: String,
    owner_id: OwnerId,
    columns: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SqlCatalog {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Column layout of the metadata table.
    pub fn layout() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("id", ColumnType::BigSerial).primary(),
            ColumnDescriptor::new("name", ColumnType::Varchar)
                .length(crate::types::MAX_TABLE_NAME_LEN as u32)
                .unique()
                .required(),
            ColumnDescriptor::new("owner_id", ColumnType::BigInt).required(),
            ColumnDescriptor::new("columns", ColumnType::Text).required(),
            ColumnDescriptor::new("created_at", ColumnType::TimestampWithTimeZone).required(),
            ColumnDescriptor::new("updated_at", ColumnType::TimestampWithTimeZone).required(),
        ]
    }

    fn scoped(&self, owner: OwnerId, name: &str) -> Condition {
        Condition::And(vec![
            Condition::Eq {
                column: "owner_id".to_string(),
                value: Param::new(Literal::Int(owner), ColumnType::BigInt),
            },
            Condition::Eq {
                column: "name".to_string(),
                value: Param::new(Literal::Text(name.to_string()), ColumnType::Varchar),
            },
        ])
    }
}

fn timestamp(at: DateTime<Utc>) -> Param {
    Param::new(Literal::Text(at.to_rfc3339()), ColumnType::TimestampWithTimeZone)
}

fn encode_columns(columns: &[ColumnDescriptor]) -> Result<Param, Error> {
    let json = serde_json::to_string(columns).map_err(|e| {
        CatalogError::Corrupted(format!("failed to serialize column list: {e}"))
    })?;
    Ok(Param::new(Literal::Text(json), ColumnType::Text))
}

/// Decode one catalog row.
pub fn decode_row(row: Row) -> Result<TableSchema, CatalogError> {
    let record: CatalogRecord = serde_json::from_value(Value::Object(row))
        .map_err(|e| CatalogError::Corrupted(format!("failed to decode catalog row: {e}")))?;
    let columns: Vec<ColumnDescriptor> = serde_json::from_str(&record.columns).map_err(|e| {
        CatalogError::Corrupted(format!(
            "failed to decode columns of table {}: {e}",
            record.name
        ))
    })?;
    Ok(TableSchema {
        id: record.id,
        name: record.name,
        owner_id: record.owner_id,
        columns,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

fn decode_single(rows: Vec<Row>) -> Result<Option<TableSchema>, Error> {
    match rows.into_iter().next() {
        Some(row) => Ok(Some(decode_row(row)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl CatalogStore for SqlCatalog {
    fn table_name(&self) -> &str {
        &self.table
    }

    async fn ensure(&self, txn: &mut dyn Transaction) -> Result<(), Error> {
        let columns = Self::layout()
            .iter()
            .map(compile_column)
            .collect::<Result<Vec<_>, SchemaError>>()?;
        txn.execute(&Statement::CreateTable {
            table: self.table.clone(),
            columns,
            if_not_exists: true,
        })
        .await?;
        Ok(())
    }

    async fn insert(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        name: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<TableSchema, Error> {
        let now = Utc::now();
        let stmt = Statement::Insert {
            table: self.table.clone(),
            columns: ["name", "owner_id", "columns", "created_at", "updated_at"]
                .into_iter()
                .map(String::from)
                .collect(),
            rows: vec![vec![
                Param::new(Literal::Text(name.to_string()), ColumnType::Varchar),
                Param::new(Literal::Int(owner), ColumnType::BigInt),
                encode_columns(columns)?,
                timestamp(now),
                timestamp(now),
            ]],
            returning: true,
        };
        decode_single(txn.query(&stmt).await?)?.ok_or_else(|| {
            CatalogError::Corrupted(format!("insert of table {name} returned no row")).into()
        })
    }

    async fn get(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        name: &str,
    ) -> Result<Option<TableSchema>, Error> {
        let stmt = Statement::Select {
            table: self.table.clone(),
            fields: Vec::new(),
            filter: Some(self.scoped(owner, name)),
            order_by: Vec::new(),
            limit: Some(1),
            offset: None,
        };
        decode_single(txn.query(&stmt).await?)
    }

    async fn list(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
    ) -> Result<Vec<TableSchema>, Error> {
        let stmt = Statement::Select {
            table: self.table.clone(),
            fields: Vec::new(),
            filter: Some(Condition::Eq {
                column: "owner_id".to_string(),
                value: Param::new(Literal::Int(owner), ColumnType::BigInt),
            }),
            order_by: vec![OrderBy {
                column: "id".to_string(),
                descending: false,
            }],
            limit: None,
            offset: None,
        };
        let rows = txn.query(&stmt).await?;
        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            tables.push(decode_row(row)?);
        }
        Ok(tables)
    }

    async fn update_columns(
        &self,
        txn: &mut dyn Transaction,
        schema: &TableSchema,
        columns: &[ColumnDescriptor],
    ) -> Result<TableSchema, Error> {
        let stmt = Statement::Update {
            table: self.table.clone(),
            assignments: vec![
                ("columns".to_string(), encode_columns(columns)?),
                ("updated_at".to_string(), timestamp(Utc::now())),
            ],
            filter: Some(Condition::Eq {
                column: "id".to_string(),
                value: Param::new(Literal::Int(schema.id), ColumnType::BigInt),
            }),
            returning: true,
        };
        decode_single(txn.query(&stmt).await?)?
            .ok_or_else(|| SchemaError::NotFound(schema.name.clone()).into())
    }

    async fn delete(
        &self,
        txn: &mut dyn Transaction,
        owner: OwnerId,
        name: &str,
    ) -> Result<u64, Error> {
        let stmt = Statement::Delete {
            table: self.table.clone(),
            filter: Some(self.scoped(owner, name)),
            returning: false,
        };
        Ok(txn.execute(&stmt).await?)
    }
}
