//! DynTable server and client library.
//!
//! Serves a `TableEngine` over a local Unix socket with a JSON-line protocol,
//! so request handlers in other processes can share one engine and one
//! database connection.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::DynTableClient;
pub use server::DynTableServer;
