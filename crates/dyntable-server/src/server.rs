//! Unix domain socket server that wraps a `TableEngine`.
//!
//! Each connected client sends JSON-line requests and receives JSON-line
//! responses. Requests run concurrently; each engine call holds its own
//! backend transaction.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use dyntable_core::api::TableEngine;
use dyntable_core::compile::PredicateSpec;
use dyntable_core::error::{BackendErrorKind, Error as DynError, QueryError, SchemaError};
use dyntable_core::types::{ColumnDescriptor, OwnerId, Row};

use crate::protocol::{ColumnWire, OrderWire, Request, Response};

/// A dyntable server listening on a Unix socket.
pub struct DynTableServer {
    engine: TableEngine,
    socket_path: PathBuf,
}

impl DynTableServer {
    pub fn new(engine: TableEngine, socket_path: PathBuf) -> Self {
        Self {
            engine,
            socket_path,
        }
    }

    /// Run the server, accepting connections until a shutdown signal is received.
    ///
    /// On startup, removes any stale socket file and binds a new one.
    /// On shutdown (SIGINT or SIGTERM), removes the socket file before exiting.
    pub async fn run(&self) -> std::io::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(
            path = %self.socket_path.display(),
            backend = self.engine.backend().name(),
            "server listening"
        );

        let accept_loop = async {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let engine = self.engine.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(engine, stream).await {
                                warn!(error = %e, "connection handler error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept error");
                    }
                }
            }
        };

        tokio::select! {
            _ = accept_loop => {}
            _ = shutdown_signal() => {
                info!("shutdown signal received");
            }
        }

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(error = %e, "failed to remove socket file on shutdown");
            } else {
                info!(path = %self.socket_path.display(), "socket file removed");
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    engine: TableEngine,
    stream: tokio::net::UnixStream,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(req) => dispatch(&engine, req).await,
            Err(e) => Response::error("ParseError", e.to_string()),
        };

        let mut resp_bytes = encode_response(&response);
        resp_bytes.push(b'\n');

        writer.write_all(&resp_bytes).await?;
        writer.flush().await?;
    }

    Ok(())
}

fn encode_response(response: &Response) -> Vec<u8> {
    serde_json::to_vec(response).unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize response");
        let fallback = serde_json::json!({
            "error": "SerializationError",
            "message": e.to_string(),
        });
        fallback.to_string().into_bytes()
    })
}

async fn dispatch(engine: &TableEngine, req: Request) -> Response {
    let result = match req {
        Request::CreateTable {
            owner,
            table,
            columns,
        } => handle_create_table(engine, owner, &table, columns).await,

        Request::ListTables { owner } => engine
            .list_tables(owner)
            .await
            .map(Response::ok_tables),

        Request::DescribeTable { owner, table } => engine
            .get_table(owner, &table)
            .await
            .map(Response::ok_table),

        Request::DropTable { owner, table } => engine
            .drop_table(owner, &table)
            .await
            .map(|()| Response::ok_empty()),

        Request::AddColumns {
            owner,
            table,
            columns,
        } => handle_add_columns(engine, owner, &table, columns).await,

        Request::DropColumns {
            owner,
            table,
            columns,
        } => engine
            .drop_columns(owner, &table, &columns)
            .await
            .map(Response::ok_table),

        Request::InsertRows { owner, table, rows } => engine
            .insert_rows(owner, &table, &rows)
            .await
            .map(Response::ok_affected),

        Request::UpdateRows { owner, table, rows } => engine
            .update_rows(owner, &table, &rows)
            .await
            .map(Response::ok_affected),

        Request::DeleteRows {
            owner,
            table,
            filters,
        } => handle_delete_rows(engine, owner, &table, &filters).await,

        Request::GetRows {
            owner,
            table,
            fields,
            filters,
            order_by,
            limit,
            offset,
        } => {
            handle_get_rows(
                engine, owner, &table, fields, &filters, order_by, limit, offset,
            )
            .await
        }
    };

    result.unwrap_or_else(dyn_error_to_response)
}

async fn handle_create_table(
    engine: &TableEngine,
    owner: OwnerId,
    table: &str,
    columns: Vec<ColumnWire>,
) -> Result<Response, DynError> {
    let columns = columns_from_wire(columns)?;
    let schema = engine
        .create_table(owner, table)
        .columns(columns)
        .execute()
        .await?;
    Ok(Response::ok_table(schema))
}

async fn handle_add_columns(
    engine: &TableEngine,
    owner: OwnerId,
    table: &str,
    columns: Vec<ColumnWire>,
) -> Result<Response, DynError> {
    let columns = columns_from_wire(columns)?;
    let schema = engine.add_columns(owner, table, &columns).await?;
    Ok(Response::ok_table(schema))
}

async fn handle_delete_rows(
    engine: &TableEngine,
    owner: OwnerId,
    table: &str,
    filters: &serde_json::Value,
) -> Result<Response, DynError> {
    let filter = PredicateSpec::from_filters(filters)?;
    let rows = engine.delete_rows(owner, table, &filter).await?;
    Ok(Response::ok_rows(rows))
}

#[allow(clippy::too_many_arguments)]
async fn handle_get_rows(
    engine: &TableEngine,
    owner: OwnerId,
    table: &str,
    fields: Vec<String>,
    filters: &serde_json::Value,
    order_by: Vec<OrderWire>,
    limit: Option<u64>,
    offset: Option<u64>,
) -> Result<Response, DynError> {
    let filter = PredicateSpec::from_filters(filters)?;
    let mut select = engine.select(owner, table).fields(fields).filter(filter);
    for order in &order_by {
        select = if order.descending {
            select.order_by_desc(&order.column)
        } else {
            select.order_by(&order.column)
        };
    }
    if let Some(n) = limit {
        select = select.limit(n);
    }
    if let Some(n) = offset {
        select = select.offset(n);
    }
    let rows: Vec<Row> = select.execute().await?;
    Ok(Response::ok_rows(rows))
}

fn columns_from_wire(columns: Vec<ColumnWire>) -> Result<Vec<ColumnDescriptor>, SchemaError> {
    columns.into_iter().map(ColumnWire::into_descriptor).collect()
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}

/// Error code sent in the `error` field of a response.
pub fn error_code(err: &DynError) -> &'static str {
    match err {
        DynError::Schema(e) => match e {
            SchemaError::InvalidColumn { .. } => "InvalidColumn",
            SchemaError::InvalidTableName { .. } => "InvalidTableName",
            SchemaError::InvalidOwner(_) => "InvalidOwner",
            SchemaError::NoColumns => "NoColumns",
            SchemaError::PrimaryKeyRequired => "PrimaryKeyRequired",
            SchemaError::MultiplePrimaryKeys(_) => "MultiplePrimaryKeys",
            SchemaError::TableAlreadyExists(_) => "TableAlreadyExists",
            SchemaError::DuplicateTable(_) => "DuplicateTable",
            SchemaError::NotFound(_) => "NotFound",
            SchemaError::ColumnExists(_) => "ColumnExists",
            SchemaError::ColumnNotFound(_) => "ColumnNotFound",
            SchemaError::UseDropTableInstead(_) => "UseDropTableInstead",
            SchemaError::PrimaryKeyConflict { .. } => "PrimaryKeyConflict",
            SchemaError::DropPrimaryColumn(_) => "DropPrimaryColumn",
        },
        DynError::Query(e) => match e {
            QueryError::UnknownColumn(_) => "UnknownColumn",
            QueryError::InvalidBooleanFilter { .. } => "InvalidBooleanFilter",
            QueryError::EmptyValueList { .. } => "EmptyValueList",
            QueryError::InvalidFilter(_) => "InvalidFilter",
            QueryError::EmptyFilter => "EmptyFilter",
            QueryError::ValueTooLong { .. } => "ValueTooLong",
            QueryError::InvalidValue { .. } => "InvalidValue",
            QueryError::MissingRequiredColumn { .. } => "MissingRequiredColumn",
            QueryError::NullRequiredColumn { .. } => "NullRequiredColumn",
            QueryError::MissingPrimaryValue { .. } => "MissingPrimaryValue",
            QueryError::NoPrimaryColumn(_) => "NoPrimaryColumn",
            QueryError::NothingToUpdate { .. } => "NothingToUpdate",
            QueryError::EmptyPayload => "EmptyPayload",
            QueryError::EmptyRow { .. } => "EmptyRow",
        },
        DynError::Backend(e) => match e.kind {
            BackendErrorKind::UniqueViolation | BackendErrorKind::NotNullViolation => {
                "ConstraintViolation"
            }
            BackendErrorKind::InvalidValue => "InvalidValue",
            _ => "InternalError",
        },
        DynError::Catalog(_) => "InternalError",
    }
}

fn dyn_error_to_response(err: DynError) -> Response {
    let code = error_code(&err);
    if code == "InternalError" {
        error!(error = %err, "request failed");
    } else {
        debug!(code, error = %err, "request rejected");
    }
    Response::error(code, err.to_string())
}
