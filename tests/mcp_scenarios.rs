//! End-to-end scenarios against the MCP and OpenAPI frontends, each
//! matching one of the concrete walkthroughs.

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;
use tempfile::tempdir;

use tooldock::config::AppConfig;
use tooldock::loader::handlers;
use tooldock::persistence::SqlxPersistence;
use tooldock::registry::ToolRegistry;
use tooldock::reload::ReloadEngine;
use tooldock::session::SessionStore;
use tooldock::sse::SseRegistry;
use tooldock::supervisor::Supervisor;
use tooldock::{mcp_http, openapi, AppState};

async fn test_state() -> AppState {
    let dir = tempdir().expect("tempdir");
    let config = Arc::new(
        AppConfig::load_from_args(vec![
            "tooldock",
            "--data-dir",
            dir.path().to_str().unwrap(),
            "--no-manage-processes",
        ])
        .expect("config loads"),
    );

    let persistence = Arc::new(
        SqlxPersistence::connect(None, &config.data_dir_path())
            .await
            .expect("persistence connects"),
    );
    let registry = Arc::new(ToolRegistry::new(config.tool_timeout()));

    let greet_schema = json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "additionalProperties": false
    });
    registry
        .register("shared", "greet", "Greets someone", greet_schema, handlers::lookup("greet").unwrap())
        .expect("register greet");

    let add_schema = json!({
        "type": "object",
        "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
        "required": ["a", "b"],
        "additionalProperties": false
    });
    registry
        .register("shared", "add", "Adds two numbers", add_schema, handlers::lookup("add").unwrap())
        .expect("register add");

    let supervisor = Arc::new(Supervisor::new(
        persistence.clone(),
        registry.clone(),
        config.data_dir_path(),
        false,
    ));
    let reload_engine = Arc::new(ReloadEngine::new(registry.clone(), config.data_dir_path().join("tools"), Vec::new(), false));

    AppState {
        registry,
        supervisor,
        persistence,
        sessions: SessionStore::new(),
        sse: SseRegistry::new(),
        reload_engine,
        config,
    }
}

#[tokio::test]
async fn initialize_negotiates_version_and_issues_a_session() {
    let state = test_state().await;
    let server = TestServer::new(mcp_http::router().with_state(state)).unwrap();

    let response = server
        .post("/mcp")
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2024-11-05", "clientInfo": {"name": "t"}}
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    let session_header = response.header("mcp-session-id");
    assert!(!session_header.to_str().unwrap().is_empty());
}

#[tokio::test]
async fn cross_namespace_call_through_shared_namespace_succeeds() {
    let state = test_state().await;
    let server = TestServer::new(mcp_http::router().with_state(state)).unwrap();

    let response = server
        .post("/shared/mcp")
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "greet", "arguments": {"name": "Alice"}}
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["result"]["isError"], false);
    assert_eq!(body["result"]["content"][0]["text"], "Hello, Alice!");
}

#[tokio::test]
async fn calling_a_tool_from_the_wrong_namespace_is_rejected() {
    let state = test_state().await;
    let server = TestServer::new(mcp_http::router().with_state(state)).unwrap();

    let response = server
        .post("/team/mcp")
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "greet", "arguments": {}}
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], -32602);
    assert!(body["error"]["message"].as_str().unwrap().contains("not found in namespace 'team'"));
}

#[tokio::test]
async fn batched_requests_are_rejected() {
    let state = test_state().await;
    let server = TestServer::new(mcp_http::router().with_state(state)).unwrap();

    let response = server
        .post("/mcp")
        .json(&json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "id": 2, "method": "ping"}
        ]))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["error"]["message"], "JSON-RPC batching is not supported");
}

#[tokio::test]
async fn reserved_namespace_prefix_is_not_found() {
    let state = test_state().await;
    let server = TestServer::new(mcp_http::router().with_state(state)).unwrap();

    let response = server.get("/api/nothing/mcp").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn rest_schema_validation_failure_is_422() {
    let state = test_state().await;
    let server = TestServer::new(openapi::router().with_state(state)).unwrap();

    let response = server.post("/tools/add").json(&json!({"a": 1, "b": "x"})).await;

    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "validation_error");
    assert!(body["details"]["error"].as_str().unwrap().contains('b'));
}

#[tokio::test]
async fn rest_result_is_the_raw_handler_value_not_the_mcp_envelope() {
    let state = test_state().await;
    let server = TestServer::new(openapi::router().with_state(state)).unwrap();

    let response = server.post("/tools/add").json(&json!({"a": 2, "b": 3})).await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["tool"], "add");
    // The MCP envelope (`{content, isError}`) must not leak into the REST
    // response; `result` is whatever the handler itself returned.
    assert!(body["result"].get("content").is_none());
    assert!(body["result"].get("isError").is_none());
}

#[tokio::test]
async fn post_with_event_stream_accept_returns_a_single_sse_event() {
    let state = test_state().await;
    let server = TestServer::new(mcp_http::router().with_state(state)).unwrap();

    let response = server
        .post("/mcp")
        .add_header(axum::http::header::ACCEPT, "text/event-stream")
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "ping"
        }))
        .await;

    response.assert_status_ok();
    let content_type = response.header(axum::http::header::CONTENT_TYPE.as_str());
    assert!(content_type.to_str().unwrap().starts_with("text/event-stream"));
    let text = response.text();
    assert!(text.starts_with("data:"));
    assert!(text.contains("\"id\":9"));
}
