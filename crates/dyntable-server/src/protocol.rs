//! Wire protocol: JSON-over-newlines request/response types.
//!
//! Each request is a single JSON line; each response is a single JSON line.
//! Every request carries the `owner` the identity layer resolved for it.

use dyntable_core::compile::parse_column_type;
use dyntable_core::error::SchemaError;
use dyntable_core::types::{ColumnDescriptor, OwnerId, Row, TableSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request from a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateTable {
        owner: OwnerId,
        table: String,
        columns: Vec<ColumnWire>,
    },
    ListTables {
        owner: OwnerId,
    },
    DescribeTable {
        owner: OwnerId,
        table: String,
    },
    DropTable {
        owner: OwnerId,
        table: String,
    },
    AddColumns {
        owner: OwnerId,
        table: String,
        columns: Vec<ColumnWire>,
    },
    DropColumns {
        owner: OwnerId,
        table: String,
        columns: Vec<String>,
    },
    InsertRows {
        owner: OwnerId,
        table: String,
        rows: Vec<Row>,
    },
    UpdateRows {
        owner: OwnerId,
        table: String,
        rows: Vec<Row>,
    },
    DeleteRows {
        owner: OwnerId,
        table: String,
        #[serde(default)]
        filters: Value,
    },
    GetRows {
        owner: OwnerId,
        table: String,
        #[serde(default)]
        fields: Vec<String>,
        #[serde(default)]
        filters: Value,
        #[serde(default)]
        order_by: Vec<OrderWire>,
        #[serde(default)]
        limit: Option<u64>,
        #[serde(default)]
        offset: Option<u64>,
    },
}

/// Column descriptor as sent by clients. The type stays a string until the
/// server checks it, so an unknown type is reported against its column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnWire {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ColumnWire {
    pub fn into_descriptor(self) -> Result<ColumnDescriptor, SchemaError> {
        let column_type = parse_column_type(&self.name, &self.column_type)?;
        Ok(ColumnDescriptor {
            name: self.name,
            column_type,
            length: self.length,
            precision: self.precision,
            scale: self.scale,
            primary: self.primary,
            unique: self.unique,
            required: self.required,
            default: self.default,
        })
    }
}

impl From<&ColumnDescriptor> for ColumnWire {
    fn from(desc: &ColumnDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            column_type: desc.column_type.keyword().to_string(),
            length: desc.length,
            precision: desc.precision,
            scale: desc.scale,
            primary: desc.primary,
            unique: desc.unique,
            required: desc.required,
            default: desc.default.clone(),
        }
    }
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWire {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

/// A response to a client.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok(OkResponse),
    Error(ErrorResponse),
}

/// Successful response variants.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OkResponse {
    Table { ok: bool, table: TableSchema },
    Tables { ok: bool, tables: Vec<TableSchema> },
    Rows { ok: bool, rows: Vec<Row> },
    Affected { ok: bool, affected: u64 },
    Empty { ok: bool },
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl Response {
    pub fn ok_empty() -> Self {
        Response::Ok(OkResponse::Empty { ok: true })
    }

    pub fn ok_table(table: TableSchema) -> Self {
        Response::Ok(OkResponse::Table { ok: true, table })
    }

    pub fn ok_tables(tables: Vec<TableSchema>) -> Self {
        Response::Ok(OkResponse::Tables { ok: true, tables })
    }

    pub fn ok_rows(rows: Vec<Row>) -> Self {
        Response::Ok(OkResponse::Rows { ok: true, rows })
    }

    pub fn ok_affected(affected: u64) -> Self {
        Response::Ok(OkResponse::Affected { ok: true, affected })
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            error: code.to_string(),
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyntable_core::types::ColumnType;
    use serde_json::json;

    #[test]
    fn test_request_parses_get_rows_with_defaults() {
        let req: Request =
            serde_json::from_value(json!({"op": "get_rows", "owner": 7, "table": "users"}))
                .unwrap();
        match req {
            Request::GetRows {
                owner,
                table,
                fields,
                filters,
                order_by,
                limit,
                offset,
            } => {
                assert_eq!(owner, 7);
                assert_eq!(table, "users");
                assert!(fields.is_empty());
                assert!(filters.is_null());
                assert!(order_by.is_empty());
                assert_eq!(limit, None);
                assert_eq!(offset, None);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_request_rejects_missing_owner() {
        let err = serde_json::from_value::<Request>(json!({"op": "list_tables"})).unwrap_err();
        assert!(err.to_string().contains("owner"));
    }

    #[test]
    fn test_column_wire_unknown_type_names_the_column() {
        let wire: ColumnWire =
            serde_json::from_value(json!({"name": "blob", "type": "bytea"})).unwrap();
        let err = wire.into_descriptor().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidColumn { ref column, .. } if column == "blob"));
    }

    #[test]
    fn test_column_wire_to_descriptor() {
        let wire: ColumnWire = serde_json::from_value(json!({
            "name": "title",
            "type": "VARCHAR",
            "length": 40,
            "required": true
        }))
        .unwrap();
        let desc = wire.into_descriptor().unwrap();
        assert_eq!(desc.column_type, ColumnType::Varchar);
        assert_eq!(desc.length, Some(40));
        assert!(desc.required);
        assert!(!desc.primary);
    }

    #[test]
    fn test_error_response_shape() {
        let resp = serde_json::to_value(Response::error("NotFound", "table t not found")).unwrap();
        assert_eq!(resp, json!({"error": "NotFound", "message": "table t not found"}));

        let resp = serde_json::to_value(Response::ok_affected(3)).unwrap();
        assert_eq!(resp, json!({"ok": true, "affected": 3}));
    }
}
