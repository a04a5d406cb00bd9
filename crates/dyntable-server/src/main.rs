//! DynTable server binary.
//!
//! Opens the table engine over the configured backend and serves it over a
//! Unix domain socket.

use std::sync::Arc;

use clap::Parser;
use dyntable_core::api::TableEngine;
use dyntable_core::backend::{Backend, MemoryBackend, PgBackend};
use dyntable_server::config::{BackendKind, Cli};
use dyntable_server::DynTableServer;
use tracing::info;

async fn open_backend(cli: &Cli) -> Result<Arc<dyn Backend>, Box<dyn std::error::Error>> {
    match cli.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::Postgres => {
            let url = cli
                .database_url
                .as_deref()
                .ok_or("--database-url (or DATABASE_URL) is required for the postgres backend")?;
            Ok(Arc::new(PgBackend::connect(url).await?))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket_path = cli.socket_path();

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(
        socket = %socket_path.display(),
        backend = ?cli.backend,
        catalog = %cli.catalog_table,
        "starting"
    );

    let backend = open_backend(&cli).await?;
    let engine = TableEngine::open(backend, cli.engine_config()).await?;

    let server = DynTableServer::new(engine, socket_path);
    server.run().await?;

    Ok(())
}
