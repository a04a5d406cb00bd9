//! Client library for connecting to a `dyntable-server` via Unix socket.
//!
//! Each method serializes a JSON-line request, sends it, reads a JSON-line
//! response, and returns the parsed result.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use dyntable_core::compile::PredicateSpec;
use dyntable_core::types::{ColumnDescriptor, OwnerId, Row, TableSchema};

use crate::error::ClientError;
use crate::protocol::{ColumnWire, ErrorResponse, OrderWire};

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Options for `get_rows`.
#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    pub fields: Vec<String>,
    pub filter: PredicateSpec,
    pub order_by: Vec<OrderWire>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Client for a dyntable server, acting for one owner.
pub struct DynTableClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    line_buf: String,
    owner: OwnerId,
}

impl DynTableClient {
    /// Connect to a dyntable server at the given Unix socket path.
    pub async fn connect(path: impl AsRef<Path>, owner: OwnerId) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            line_buf: String::new(),
            owner,
        })
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    pub async fn create_table(
        &mut self,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<TableSchema> {
        let req = json!({
            "op": "create_table",
            "owner": self.owner,
            "table": table,
            "columns": columns_to_wire(columns),
        });
        let resp = self.send_request(&req).await?;
        field_from_response(&resp, "table")
    }

    /// Create a table from raw wire column descriptors, as an untyped caller
    /// would send them.
    pub async fn create_table_raw(&mut self, table: &str, columns: Value) -> Result<TableSchema> {
        let req = json!({
            "op": "create_table",
            "owner": self.owner,
            "table": table,
            "columns": columns,
        });
        let resp = self.send_request(&req).await?;
        field_from_response(&resp, "table")
    }

    pub async fn list_tables(&mut self) -> Result<Vec<TableSchema>> {
        let req = json!({"op": "list_tables", "owner": self.owner});
        let resp = self.send_request(&req).await?;
        field_from_response(&resp, "tables")
    }

    pub async fn describe_table(&mut self, table: &str) -> Result<TableSchema> {
        let req = json!({"op": "describe_table", "owner": self.owner, "table": table});
        let resp = self.send_request(&req).await?;
        field_from_response(&resp, "table")
    }

    pub async fn drop_table(&mut self, table: &str) -> Result<()> {
        let req = json!({"op": "drop_table", "owner": self.owner, "table": table});
        let resp = self.send_request(&req).await?;
        check_error(&resp)
    }

    pub async fn add_columns(
        &mut self,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<TableSchema> {
        let req = json!({
            "op": "add_columns",
            "owner": self.owner,
            "table": table,
            "columns": columns_to_wire(columns),
        });
        let resp = self.send_request(&req).await?;
        field_from_response(&resp, "table")
    }

    pub async fn drop_columns(&mut self, table: &str, columns: &[&str]) -> Result<TableSchema> {
        let req = json!({
            "op": "drop_columns",
            "owner": self.owner,
            "table": table,
            "columns": columns,
        });
        let resp = self.send_request(&req).await?;
        field_from_response(&resp, "table")
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    /// Insert rows, returning the number inserted.
    pub async fn insert_rows(&mut self, table: &str, rows: &[Row]) -> Result<u64> {
        let req = json!({
            "op": "insert_rows",
            "owner": self.owner,
            "table": table,
            "rows": rows,
        });
        let resp = self.send_request(&req).await?;
        affected_from_response(&resp)
    }

    /// Update rows by primary column value, returning rows affected.
    pub async fn update_rows(&mut self, table: &str, rows: &[Row]) -> Result<u64> {
        let req = json!({
            "op": "update_rows",
            "owner": self.owner,
            "table": table,
            "rows": rows,
        });
        let resp = self.send_request(&req).await?;
        affected_from_response(&resp)
    }

    /// Delete matching rows, returning them.
    pub async fn delete_rows(&mut self, table: &str, filter: &PredicateSpec) -> Result<Vec<Row>> {
        let req = json!({
            "op": "delete_rows",
            "owner": self.owner,
            "table": table,
            "filters": filter.to_filters(),
        });
        let resp = self.send_request(&req).await?;
        field_from_response(&resp, "rows")
    }

    pub async fn get_rows(&mut self, table: &str, query: &RowQuery) -> Result<Vec<Row>> {
        let req = json!({
            "op": "get_rows",
            "owner": self.owner,
            "table": table,
            "fields": query.fields,
            "filters": query.filter.to_filters(),
            "order_by": query.order_by,
            "limit": query.limit,
            "offset": query.offset,
        });
        let resp = self.send_request(&req).await?;
        field_from_response(&resp, "rows")
    }

    /// Send an arbitrary request line and return the raw response.
    pub async fn request(&mut self, req: &Value) -> Result<Value> {
        self.send_request(req).await
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn send_request(&mut self, req: &Value) -> Result<Value> {
        let mut data = serde_json::to_vec(req).map_err(ClientError::Serialization)?;
        data.push(b'\n');
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;

        self.line_buf.clear();
        let n = self.reader.read_line(&mut self.line_buf).await?;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }

        let resp: Value =
            serde_json::from_str(self.line_buf.trim()).map_err(ClientError::Serialization)?;
        Ok(resp)
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

fn columns_to_wire(columns: &[ColumnDescriptor]) -> Vec<ColumnWire> {
    columns.iter().map(ColumnWire::from).collect()
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

fn check_error(resp: &Value) -> Result<()> {
    if let Some(err) = resp.get("error") {
        let error = err.as_str().unwrap_or("Unknown").to_string();
        let message = resp
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        return Err(ClientError::Server(ErrorResponse { error, message }));
    }
    Ok(())
}

fn field_from_response<T: DeserializeOwned>(resp: &Value, field: &str) -> Result<T> {
    check_error(resp)?;
    let value = resp
        .get(field)
        .ok_or_else(|| ClientError::Protocol(format!("missing '{field}' in response")))?;
    serde_json::from_value(value.clone()).map_err(ClientError::Serialization)
}

fn affected_from_response(resp: &Value) -> Result<u64> {
    check_error(resp)?;
    resp.get("affected")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ClientError::Protocol("missing 'affected' in response".to_string()))
}
