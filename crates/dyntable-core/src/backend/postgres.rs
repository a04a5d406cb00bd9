//! PostgreSQL backend over `tokio-postgres`.
//!
//! Every bind value is sent as text and converted by the `$n::TYPE` cast the
//! renderer emits. Row-returning statements are wrapped in
//! `row_to_json` so rows of any shape decode into a JSON map.
//!
//! The backend owns a single connection. When it is found closed at the start
//! of a transaction the backend reconnects once with the original URL; a
//! connection lost in the middle of a transaction fails that transaction with
//! a `Connection` error.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info, warn};

use crate::error::{BackendError, BackendErrorKind};
use crate::sql::{Literal, Statement};
use crate::types::Row;

use super::{Backend, Transaction};

/// A backend holding one PostgreSQL connection.
#[derive(Clone)]
pub struct PgBackend {
    url: Arc<str>,
    client: Arc<Mutex<Client>>,
}

impl PgBackend {
    /// Connect with a libpq-style connection string or URL.
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let client = open_client(url).await?;
        Ok(Self {
            url: Arc::from(url),
            client: Arc::new(Mutex::new(client)),
        })
    }
}

async fn open_client(url: &str) -> Result<Client, BackendError> {
    let (client, connection) = tokio_postgres::connect(url, NoTls)
        .await
        .map_err(map_pg_error)?;
    tokio::spawn(async move {
        match connection.await {
            Ok(()) => warn!("postgres connection closed"),
            Err(e) => error!(error = %e, "postgres connection lost"),
        }
    });
    Ok(client)
}

#[async_trait]
impl Backend for PgBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, BackendError> {
        let mut client = Arc::clone(&self.client).lock_owned().await;
        if client.is_closed() {
            warn!("postgres connection is closed, reconnecting");
            *client = open_client(&self.url).await?;
            info!("postgres connection re-established");
        }
        client.batch_execute("BEGIN").await.map_err(map_pg_error)?;
        Ok(Box::new(PgTransaction {
            client: Some(client),
        }))
    }
}

/// A transaction on the backend's connection. The connection stays locked
/// until the transaction finishes.
pub struct PgTransaction {
    client: Option<OwnedMutexGuard<Client>>,
}

impl PgTransaction {
    fn client(&self) -> Result<&Client, BackendError> {
        self.client
            .as_deref()
            .ok_or_else(|| BackendError::new(BackendErrorKind::Other, "transaction is finished"))
    }

    async fn finish(mut self: Box<Self>, command: &str) -> Result<(), BackendError> {
        match self.client.take() {
            Some(client) => client.batch_execute(command).await.map_err(map_pg_error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn execute(&mut self, stmt: &Statement) -> Result<u64, BackendError> {
        let rendered = stmt.render();
        debug!(backend = "postgres", sql = %rendered.sql, params = rendered.params.len(), "execute");
        let client = self.client()?;
        let texts = bind_texts(&rendered.params);
        let params = bind_refs(&texts);
        let prepared = client
            .prepare_typed(&rendered.sql, &vec![Type::TEXT; texts.len()])
            .await
            .map_err(map_pg_error)?;
        client
            .execute(&prepared, &params)
            .await
            .map_err(|e| classify_statement_error(stmt, map_pg_error(e)))
    }

    async fn query(&mut self, stmt: &Statement) -> Result<Vec<Row>, BackendError> {
        if !stmt.returns_rows() {
            return Err(BackendError::new(
                BackendErrorKind::Other,
                "statement does not return rows",
            ));
        }
        let rendered = stmt.render();
        let sql = format!("WITH q AS ({}) SELECT row_to_json(q) FROM q", rendered.sql);
        debug!(backend = "postgres", sql = %sql, params = rendered.params.len(), "query");

        let client = self.client()?;
        let texts = bind_texts(&rendered.params);
        let params = bind_refs(&texts);
        let prepared = client
            .prepare_typed(&sql, &vec![Type::TEXT; texts.len()])
            .await
            .map_err(map_pg_error)?;
        let rows = client
            .query(&prepared, &params)
            .await
            .map_err(|e| classify_statement_error(stmt, map_pg_error(e)))?;

        rows.iter()
            .map(|row| match row.try_get::<_, Value>(0).map_err(map_pg_error)? {
                Value::Object(map) => Ok(map),
                other => Err(BackendError::new(
                    BackendErrorKind::Other,
                    format!("expected a JSON object row, got {other}"),
                )),
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), BackendError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), BackendError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        warn!(error = %e, "rollback of abandoned transaction failed");
                    }
                });
            }
            Err(_) => warn!("transaction dropped outside a runtime; connection left in a transaction"),
        }
    }
}

fn bind_texts(params: &[Literal]) -> Vec<Option<String>> {
    params.iter().map(Literal::to_text).collect()
}

fn bind_refs(texts: &[Option<String>]) -> Vec<&(dyn ToSql + Sync)> {
    texts.iter().map(|t| t as &(dyn ToSql + Sync)).collect()
}

/// A unique violation while creating a table is a race on the table's row
/// type, i.e. another session created the same table.
fn classify_statement_error(stmt: &Statement, err: BackendError) -> BackendError {
    match stmt {
        Statement::CreateTable { .. } if err.is(BackendErrorKind::UniqueViolation) => {
            BackendError::new(BackendErrorKind::DuplicateTable, err.message)
        }
        _ => err,
    }
}

fn map_pg_error(e: tokio_postgres::Error) -> BackendError {
    let message = match e.as_db_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    };
    let kind = match e.code() {
        Some(code) if *code == SqlState::DUPLICATE_TABLE => BackendErrorKind::DuplicateTable,
        Some(code) if *code == SqlState::UNDEFINED_TABLE => BackendErrorKind::UndefinedTable,
        Some(code) if *code == SqlState::DUPLICATE_COLUMN => BackendErrorKind::DuplicateColumn,
        Some(code) if *code == SqlState::UNDEFINED_COLUMN => BackendErrorKind::UndefinedColumn,
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => BackendErrorKind::UniqueViolation,
        Some(code) if *code == SqlState::NOT_NULL_VIOLATION => BackendErrorKind::NotNullViolation,
        Some(code)
            if *code == SqlState::INVALID_TEXT_REPRESENTATION
                || *code == SqlState::STRING_DATA_RIGHT_TRUNCATION
                || *code == SqlState::NUMERIC_VALUE_OUT_OF_RANGE =>
        {
            BackendErrorKind::InvalidValue
        }
        Some(_) => BackendErrorKind::Other,
        None if e.is_closed() => BackendErrorKind::Connection,
        None => BackendErrorKind::Other,
    };
    BackendError::new(kind, message)
}
