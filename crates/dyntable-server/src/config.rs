//! Command-line configuration for the server binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dyntable_core::api::EngineConfig;
use dyntable_core::types::DEFAULT_CATALOG_TABLE;

/// Storage the engine runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// In-process tables, lost on exit.
    Memory,
    /// A PostgreSQL database reached through `--database-url`.
    Postgres,
}

/// Serve the dyntable engine over a Unix socket.
#[derive(Debug, Clone, Parser)]
#[command(name = "dyntable-server", version, about)]
pub struct Cli {
    /// Socket path. Defaults to `<data_local_dir>/dyntable/server.sock`.
    #[arg(long, env = "DYNTABLE_SOCKET")]
    pub socket: Option<PathBuf>,

    #[arg(long, value_enum, env = "DYNTABLE_BACKEND", default_value = "postgres")]
    pub backend: BackendKind,

    /// Connection string for the postgres backend.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Name of the shared metadata table.
    #[arg(long, env = "DYNTABLE_CATALOG_TABLE", default_value = DEFAULT_CATALOG_TABLE)]
    pub catalog_table: String,
}

impl Cli {
    pub fn socket_path(&self) -> PathBuf {
        self.socket
            .clone()
            .unwrap_or_else(|| default_data_dir().join("server.sock"))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            catalog_table: self.catalog_table.clone(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dyntable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["dyntable-server", "--backend", "memory"]).unwrap();
        assert_eq!(cli.backend, BackendKind::Memory);
        assert_eq!(cli.catalog_table, DEFAULT_CATALOG_TABLE);
    }

    #[test]
    fn test_explicit_flags() {
        let cli = Cli::try_parse_from([
            "dyntable-server",
            "--socket",
            "/tmp/dt.sock",
            "--backend",
            "postgres",
            "--database-url",
            "postgres://localhost/app",
            "--catalog-table",
            "meta_tables",
        ])
        .unwrap();
        assert_eq!(cli.socket_path(), PathBuf::from("/tmp/dt.sock"));
        assert_eq!(cli.backend, BackendKind::Postgres);
        assert_eq!(cli.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(cli.engine_config().catalog_table, "meta_tables");
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(Cli::try_parse_from(["dyntable-server", "--backend", "sqlite"]).is_err());
    }
}
