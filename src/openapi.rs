//! REST/OpenAPI frontend (spec §4.6): one endpoint per tool, global and
//! namespace-scoped, returning `{tool, result}` on success and the
//! `ToolError` envelope on failure.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

use crate::mcp_http::headers::json_response;
use crate::namespace;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_global))
        .route("/tools/{name}", post(call_global))
        .route("/{namespace}/openapi/health", get(namespace_health))
        .route("/{namespace}/openapi/tools", get(list_namespaced))
        .route("/{namespace}/openapi/tools/{name}", post(call_namespaced))
}

async fn health() -> Response {
    json_response(StatusCode::OK, &json!({"status": "ok"}))
}

async fn namespace_health(Path(namespace): Path<String>) -> Response {
    if namespace::is_reserved(&namespace) {
        return StatusCode::NOT_FOUND.into_response();
    }
    json_response(StatusCode::OK, &json!({"status": "ok", "namespace": namespace}))
}

async fn list_global(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, &json!({"tools": state.registry.list_all()}))
}

async fn list_namespaced(State(state): State<AppState>, Path(namespace): Path<String>) -> Response {
    if namespace::is_reserved(&namespace) {
        return StatusCode::NOT_FOUND.into_response();
    }
    json_response(
        StatusCode::OK,
        &json!({"tools": state.registry.list_for_namespace(&namespace)}),
    )
}

async fn call_global(State(state): State<AppState>, Path(name): Path<String>, body: axum::body::Bytes) -> Response {
    invoke(&state, &name, None, &body).await
}

async fn call_namespaced(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> Response {
    if namespace::is_reserved(&namespace) {
        return StatusCode::NOT_FOUND.into_response();
    }
    invoke(&state, &name, Some(&namespace), &body).await
}

async fn invoke(state: &AppState, name: &str, namespace: Option<&str>, body: &[u8]) -> Response {
    let Some(descriptor) = state.registry.describe(name, namespace) else {
        return json_response(
            StatusCode::NOT_FOUND,
            &tool_error("not_found", format!("tool '{name}' not found")),
        );
    };

    let arguments: Value = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(err) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &tool_error("bad_request", format!("invalid JSON body: {err}")),
                );
            }
        }
    };

    if let Err(message) = crate::registry::validate_arguments(&descriptor.input_schema, &arguments) {
        return json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &json!({
                "code": "validation_error",
                "message": "request body failed schema validation",
                "details": {"error": message},
            }),
        );
    }

    let result = state.registry.call(name, arguments, namespace).await;
    if result.is_error {
        return json_response(StatusCode::BAD_REQUEST, &tool_error("tool_error", result.text()));
    }

    json_response(StatusCode::OK, &json!({"tool": descriptor.name, "result": result.raw_value()}))
}

fn tool_error(code: &str, message: impl Into<String>) -> Value {
    json!({"code": code, "message": message.into(), "details": Value::Null})
}
