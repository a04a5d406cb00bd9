//! Integration tests for dyntable-server: start server, connect client, verify ops.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::time::{sleep, Duration};

use dyntable_core::api::{EngineConfig, TableEngine};
use dyntable_core::backend::MemoryBackend;
use dyntable_core::compile::PredicateSpec;
use dyntable_core::types::{ColumnDescriptor, ColumnType, Row};
use dyntable_server::client::{DynTableClient, RowQuery};
use dyntable_server::error::ClientError;
use dyntable_server::protocol::OrderWire;
use dyntable_server::server::DynTableServer;

/// Start a server on a temp socket and return the socket path.
/// The server runs in a background tokio task.
async fn start_test_server() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let socket_path = dir.path().join("test.sock");

    let engine = TableEngine::open(Arc::new(MemoryBackend::new()), EngineConfig::default())
        .await
        .unwrap();
    let server = DynTableServer::new(engine, socket_path.clone());

    tokio::spawn(async move {
        server.run().await.unwrap();
    });

    // Give the server a moment to bind.
    sleep(Duration::from_millis(50)).await;

    (dir, socket_path)
}

fn users_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("id", ColumnType::Serial).primary(),
        ColumnDescriptor::new("name", ColumnType::Varchar)
            .length(40)
            .required(),
        ColumnDescriptor::new("age", ColumnType::Integer),
        ColumnDescriptor::new("active", ColumnType::Boolean).default_value(true),
    ]
}

fn rows(value: Value) -> Vec<Row> {
    serde_json::from_value(value).unwrap()
}

fn server_code(err: &ClientError) -> &str {
    err.code().unwrap_or("<not a server error>")
}

#[tokio::test]
async fn test_table_lifecycle() {
    let (_dir, sock) = start_test_server().await;
    let mut client = DynTableClient::connect(&sock, 1).await.unwrap();

    let schema = client.create_table("users", &users_columns()).await.unwrap();
    assert_eq!(schema.name, "users");
    assert_eq!(schema.owner_id, 1);
    assert_eq!(schema.columns.len(), 4);

    let tables = client.list_tables().await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "users");

    let described = client.describe_table("users").await.unwrap();
    assert_eq!(described.id, schema.id);
    assert_eq!(described.columns, schema.columns);

    let added = client
        .add_columns("users", &[ColumnDescriptor::new("email", ColumnType::Text).unique()])
        .await
        .unwrap();
    assert!(added.has_column("email"));

    let dropped = client.drop_columns("users", &["age"]).await.unwrap();
    assert!(!dropped.has_column("age"));
    assert_eq!(
        dropped.column_names().collect::<Vec<_>>(),
        vec!["id", "name", "active", "email"]
    );

    client.drop_table("users").await.unwrap();
    assert!(client.list_tables().await.unwrap().is_empty());

    let err = client.describe_table("users").await.unwrap_err();
    assert_eq!(server_code(&err), "NotFound");
}

#[tokio::test]
async fn test_row_round_trip() {
    let (_dir, sock) = start_test_server().await;
    let mut client = DynTableClient::connect(&sock, 1).await.unwrap();
    client.create_table("users", &users_columns()).await.unwrap();

    let inserted = client
        .insert_rows(
            "users",
            &rows(json!([
                {"name": "alice", "age": 30, "active": true},
                {"name": "bob", "age": 25, "active": false},
                {"name": "carol", "age": 41, "active": true}
            ])),
        )
        .await
        .unwrap();
    assert_eq!(inserted, 3);

    let query = RowQuery {
        fields: vec!["name".to_string()],
        filter: PredicateSpec::new().and("active", [true]),
        order_by: vec![OrderWire {
            column: "age".to_string(),
            descending: true,
        }],
        ..RowQuery::default()
    };
    let found = client.get_rows("users", &query).await.unwrap();
    assert_eq!(found, rows(json!([{"name": "carol"}, {"name": "alice"}])));

    let updated = client
        .update_rows("users", &rows(json!([{"id": 2, "age": 26}])))
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let query = RowQuery {
        fields: vec!["age".to_string()],
        filter: PredicateSpec::new().or("name", ["bob"]),
        ..RowQuery::default()
    };
    let found = client.get_rows("users", &query).await.unwrap();
    assert_eq!(found, rows(json!([{"age": 26}])));

    let deleted = client
        .delete_rows("users", &PredicateSpec::new().or("name", ["alice", "bob"]))
        .await
        .unwrap();
    assert_eq!(deleted.len(), 2);

    let remaining = client.get_rows("users", &RowQuery::default()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["name"], "carol");
}

#[tokio::test]
async fn test_paging() {
    let (_dir, sock) = start_test_server().await;
    let mut client = DynTableClient::connect(&sock, 1).await.unwrap();
    client.create_table("users", &users_columns()).await.unwrap();
    client
        .insert_rows(
            "users",
            &rows(json!([
                {"name": "a"}, {"name": "b"}, {"name": "c"}, {"name": "d"}
            ])),
        )
        .await
        .unwrap();

    let query = RowQuery {
        fields: vec!["name".to_string()],
        order_by: vec![OrderWire {
            column: "id".to_string(),
            descending: false,
        }],
        limit: Some(2),
        offset: Some(1),
        ..RowQuery::default()
    };
    let page = client.get_rows("users", &query).await.unwrap();
    assert_eq!(page, rows(json!([{"name": "b"}, {"name": "c"}])));
}

#[tokio::test]
async fn test_owner_isolation() {
    let (_dir, sock) = start_test_server().await;
    let mut alice = DynTableClient::connect(&sock, 1).await.unwrap();
    let mut bob = DynTableClient::connect(&sock, 2).await.unwrap();

    alice.create_table("users", &users_columns()).await.unwrap();

    assert!(bob.list_tables().await.unwrap().is_empty());
    let err = bob
        .insert_rows("users", &rows(json!([{"name": "mallory"}])))
        .await
        .unwrap_err();
    assert_eq!(server_code(&err), "NotFound");

    // Physical table names are shared by all owners.
    let err = bob.create_table("users", &users_columns()).await.unwrap_err();
    assert_eq!(server_code(&err), "DuplicateTable");
}

#[tokio::test]
async fn test_validation_errors() {
    let (_dir, sock) = start_test_server().await;
    let mut client = DynTableClient::connect(&sock, 1).await.unwrap();

    let err = client
        .create_table_raw(
            "files",
            json!([
                {"name": "id", "type": "serial", "primary": true},
                {"name": "data", "type": "bytea"}
            ]),
        )
        .await
        .unwrap_err();
    assert_eq!(server_code(&err), "InvalidColumn");

    let err = client
        .create_table("files", &[ColumnDescriptor::new("name", ColumnType::Text)])
        .await
        .unwrap_err();
    assert_eq!(server_code(&err), "PrimaryKeyRequired");

    client.create_table("users", &users_columns()).await.unwrap();

    let err = client
        .insert_rows("users", &rows(json!([{"name": "x", "nickname": "y"}])))
        .await
        .unwrap_err();
    assert_eq!(server_code(&err), "UnknownColumn");

    let err = client
        .insert_rows("users", &rows(json!([{"age": 3}])))
        .await
        .unwrap_err();
    assert_eq!(server_code(&err), "MissingRequiredColumn");

    let err = client
        .delete_rows("users", &PredicateSpec::new())
        .await
        .unwrap_err();
    assert_eq!(server_code(&err), "EmptyFilter");

    let query = RowQuery {
        filter: PredicateSpec::new().or("active", ["yes"]),
        ..RowQuery::default()
    };
    let err = client.get_rows("users", &query).await.unwrap_err();
    assert_eq!(server_code(&err), "InvalidBooleanFilter");

    let err = client.drop_columns("users", &["id"]).await.unwrap_err();
    assert_eq!(server_code(&err), "DropPrimaryColumn");
}

#[tokio::test]
async fn test_malformed_requests() {
    let (_dir, sock) = start_test_server().await;
    let mut client = DynTableClient::connect(&sock, 1).await.unwrap();

    let resp = client
        .request(&json!({"op": "no_such_op", "owner": 1}))
        .await
        .unwrap();
    assert_eq!(resp["error"], "ParseError");

    let resp = client
        .request(&json!({"op": "list_tables", "owner": 0}))
        .await
        .unwrap();
    assert_eq!(resp["error"], "InvalidOwner");

    let resp = client
        .request(&json!({
            "op": "get_rows",
            "owner": 1,
            "table": "users",
            "filters": {"name": "alice"}
        }))
        .await
        .unwrap();
    assert_eq!(resp["error"], "InvalidFilter");

    // The connection survives errors.
    assert!(client.list_tables().await.unwrap().is_empty());
}
