//! MCP Streamable-HTTP Protocol Layer (spec §4.5): JSON-RPC 2.0 over POST,
//! SSE over GET, session identity via `Mcp-Session-Id`.
//!
//! Route registration order matters for matching (SPEC_FULL §11): static
//! routes (`/health`, `/mcp/namespaces`, `/mcp/info`) are registered before
//! the global `/mcp` routes, which in turn precede the dynamic
//! `/{namespace}/mcp` routes, so a literal path always wins over a
//! namespace-capturing one.

pub mod jsonrpc;
pub mod headers;

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::Stream;
use serde_json::{json, Value};

use crate::namespace;
use crate::sse::{SseRegistry, HEARTBEAT_INTERVAL};
use crate::AppState;
use headers::{json_response, origin_allowed, session_id, validate_accept, validate_content_type, wants_event_stream, SESSION_HEADER};
use jsonrpc::{JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/mcp/namespaces", get(list_namespaces))
        .route("/mcp/info", get(global_info))
        .route("/mcp/sse", get(mcp_get_global).post(mcp_post_global))
        .route("/mcp", post(mcp_post_global).get(mcp_get_global).delete(mcp_delete_global))
        .route("/{namespace}/mcp/info", get(namespace_info))
        .route("/{namespace}/mcp/sse", get(mcp_get_namespaced).post(mcp_post_namespaced))
        .route(
            "/{namespace}/mcp",
            post(mcp_post_namespaced).get(mcp_get_namespaced).delete(mcp_delete_namespaced),
        )
}

async fn health(State(state): State<AppState>) -> Response {
    let stats = state.registry.stats();
    json_response(StatusCode::OK, &json!({"status": "ok", "tools": stats}))
}

async fn list_namespaces(State(state): State<AppState>) -> Response {
    let stats = state.registry.stats();
    let names: Vec<&String> = stats.per_namespace.keys().collect();
    json_response(StatusCode::OK, &json!({"namespaces": names}))
}

async fn global_info(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, &server_info(&state, None))
}

async fn namespace_info(State(state): State<AppState>, Path(namespace): Path<String>) -> Response {
    if namespace::is_reserved(&namespace) {
        return StatusCode::NOT_FOUND.into_response();
    }
    json_response(StatusCode::OK, &server_info(&state, Some(&namespace)))
}

fn server_info(state: &AppState, namespace: Option<&str>) -> Value {
    let name = match namespace {
        Some(ns) => format!("{}/{}", state.config.mcp.server_name, ns),
        None => state.config.mcp.server_name.clone(),
    };
    json!({
        "serverInfo": {"name": name, "version": env!("CARGO_PKG_VERSION")},
        "protocolVersions": state.config.mcp.supported_protocol_versions,
    })
}

// ── POST (JSON-RPC) ─────────────────────────────────────────────────────

async fn mcp_post_global(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    handle_post(state, None, headers, body).await
}

async fn mcp_post_namespaced(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if namespace::is_reserved(&namespace) {
        return StatusCode::NOT_FOUND.into_response();
    }
    handle_post(state, Some(namespace), headers, body).await
}

async fn handle_post(state: AppState, namespace: Option<String>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    if !origin_allowed(&headers, &state.config.cors.origins) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if validate_accept(&headers).is_err() {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    if !validate_content_type(&headers) {
        return json_response(
            StatusCode::OK,
            &JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error: unsupported content-type", None),
        );
    }

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            return json_response(
                StatusCode::OK,
                &JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error", None),
            );
        }
    };

    if raw.is_array() {
        return json_response(
            StatusCode::OK,
            &JsonRpcResponse::error(Value::Null, INVALID_REQUEST, "JSON-RPC batching is not supported", None),
        );
    }

    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(_) => {
            return json_response(
                StatusCode::OK,
                &JsonRpcResponse::error(Value::Null, INVALID_REQUEST, "Invalid Request", None),
            );
        }
    };

    if request.jsonrpc.as_deref() != Some("2.0") {
        return json_response(
            StatusCode::OK,
            &JsonRpcResponse::error(request.id.unwrap_or(Value::Null), INVALID_REQUEST, "jsonrpc must be \"2.0\"", None),
        );
    }

    if request.method != "initialize" {
        if let Some(sid) = session_id(&headers) {
            if state.sessions.get(&sid).is_none() {
                return json_response(
                    StatusCode::NOT_FOUND,
                    &JsonRpcResponse::error(request.id.clone().unwrap_or(Value::Null), INVALID_REQUEST, "unknown or expired session", None),
                );
            }
        }
    }

    let is_notification = request.id.is_none();
    let id = request.id.clone().unwrap_or(Value::Null);
    let method = request.method.clone();
    let (result, new_session_id) = dispatch(&state, namespace.as_deref(), request).await;

    if is_notification {
        return StatusCode::ACCEPTED.into_response();
    }

    let response = match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err((code, message, data)) => JsonRpcResponse::error(id, code, message, data),
    };

    let mut resp = if wants_event_stream(&headers) {
        single_event_sse(&response)
    } else {
        json_response(StatusCode::OK, &response)
    };
    if let Some(sid) = new_session_id {
        if let Ok(value) = HeaderValue::from_str(&sid) {
            resp.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    let _ = method; // retained for future per-method metrics hooks
    resp
}

/// Wraps a single JSON-RPC response as one `data:` SSE event (spec §4.5.6):
/// a POST with `Accept: text/event-stream` gets the same payload a plain
/// JSON POST would, just framed as a one-shot event stream instead of a body.
fn single_event_sse(response: &JsonRpcResponse) -> Response {
    let payload = serde_json::to_string(response).unwrap_or_else(|_| "{}".to_owned());
    let stream = futures::stream::once(async move { Ok::<_, Infallible>(Event::default().data(payload)) });
    Sse::new(stream).into_response()
}

type DispatchError = (i64, String, Option<Value>);

async fn dispatch(state: &AppState, namespace: Option<&str>, request: JsonRpcRequest) -> (Result<Value, DispatchError>, Option<String>) {
    match request.method.as_str() {
        "initialize" => handle_initialize(state, namespace, &request.params),
        "initialized" | "notifications/initialized" => (Ok(Value::Null), None),
        "ping" => (Ok(json!({})), None),
        "tools/list" => (Ok(handle_tools_list(state, namespace)), None),
        "tools/call" => (handle_tools_call(state, namespace, &request.params).await, None),
        _ => (Err((METHOD_NOT_FOUND, format!("Method not found: {}", request.method), None)), None),
    }
}

fn handle_initialize(state: &AppState, namespace: Option<&str>, params: &Value) -> (Result<Value, DispatchError>, Option<String>) {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let negotiated = match requested {
        Some(version) if state.config.mcp.supported_protocol_versions.iter().any(|v| v == version) => version.to_owned(),
        Some(version) => {
            return (
                Err((
                    INVALID_PARAMS,
                    format!("Unsupported protocol version: {version}"),
                    Some(json!({"supported": state.config.mcp.supported_protocol_versions})),
                )),
                None,
            );
        }
        None => state.config.mcp.default_protocol_version.clone(),
    };

    let client_info = params.get("clientInfo").cloned();
    let session = state.sessions.create(negotiated.clone(), client_info, namespace.map(str::to_owned));

    let name = match namespace {
        Some(ns) => format!("{}/{}", state.config.mcp.server_name, ns),
        None => state.config.mcp.server_name.clone(),
    };

    (
        Ok(json!({
            "protocolVersion": negotiated,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": name, "version": "1.0.0"},
        })),
        Some(session.id().to_owned()),
    )
}

fn handle_tools_list(state: &AppState, namespace: Option<&str>) -> Value {
    let tools = match namespace {
        Some(ns) => state.registry.list_for_namespace(ns),
        None => state.registry.list_all(),
    };
    json!({ "tools": tools })
}

async fn handle_tools_call(state: &AppState, namespace: Option<&str>, params: &Value) -> Result<Value, DispatchError> {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return Err((INVALID_PARAMS, "missing params.name".to_owned(), None));
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    if let Some(ns) = namespace {
        if !state.registry.scoped_lookup(name, ns) {
            return Err((
                INVALID_PARAMS,
                format!("Tool '{name}' not found in namespace '{ns}'"),
                None,
            ));
        }
    }

    let result = state.registry.call(name, arguments, namespace).await;
    serde_json::to_value(&result).map_err(|e| (INTERNAL_ERROR, e.to_string(), None))
}

// ── GET (SSE) ────────────────────────────────────────────────────────────

async fn mcp_get_global(State(state): State<AppState>, headers: HeaderMap) -> Response {
    build_sse(&state, None, &headers)
}

async fn mcp_get_namespaced(State(state): State<AppState>, Path(namespace): Path<String>, headers: HeaderMap) -> Response {
    if namespace::is_reserved(&namespace) {
        return StatusCode::NOT_FOUND.into_response();
    }
    build_sse(&state, Some(namespace), &headers)
}

fn build_sse(state: &AppState, namespace: Option<String>, headers: &HeaderMap) -> Response {
    if !origin_allowed(headers, &state.config.cors.origins) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if !wants_event_stream(headers) {
        // Lenient: still open the stream even without an explicit Accept,
        // matching the reference implementation's tolerance for probes.
    }

    let registry = state.sse.clone();
    let stream = sse_stream(registry, namespace);
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat"))
        .into_response()
}

fn sse_stream(registry: SseRegistry, namespace: Option<String>) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut handle = registry.subscribe(namespace.as_deref());
        yield Ok(Event::default().comment("connected"));
        while let Some(message) = handle.receiver.recv().await {
            yield Ok(Event::default().data(message));
        }
    }
}

// ── DELETE (session termination) ────────────────────────────────────────

async fn mcp_delete_global(State(state): State<AppState>, headers: HeaderMap) -> Response {
    terminate_session(&state, &headers)
}

async fn mcp_delete_namespaced(State(state): State<AppState>, Path(namespace): Path<String>, headers: HeaderMap) -> Response {
    if namespace::is_reserved(&namespace) {
        return StatusCode::NOT_FOUND.into_response();
    }
    terminate_session(&state, &headers)
}

fn terminate_session(state: &AppState, headers: &HeaderMap) -> Response {
    let Some(sid) = session_id(headers) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match state.sessions.remove(&sid) {
        Some(_) => StatusCode::OK.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

const _: Duration = HEARTBEAT_INTERVAL;
