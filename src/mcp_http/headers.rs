//! Request header handling (spec §4.5.6) and the `_json_response` technique
//! (spec §11): JSON bodies are written with a bare `Content-Type:
//! application/json` header, never `; charset=utf-8`.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// `Accept` values a POST handler may serve a plain JSON body for.
fn accepts_json(headers: &HeaderMap) -> bool {
    match headers.get(axum::http::header::ACCEPT).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(value) => {
            value.is_empty()
                || value.contains("application/json")
                || value.contains("*/*")
                || value.contains("application/*")
        }
    }
}

/// `true` if the client explicitly asked for an SSE-wrapped response.
pub fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

/// Validates the `Accept` header for a POST request. `Ok(())` when
/// acceptable — including `text/event-stream`, which `handle_post` answers
/// by SSE-wrapping the single JSON-RPC response instead of returning it as
/// a plain body; `Err(406)` otherwise.
pub fn validate_accept(headers: &HeaderMap) -> Result<(), StatusCode> {
    if accepts_json(headers) || wants_event_stream(headers) {
        Ok(())
    } else {
        Err(StatusCode::NOT_ACCEPTABLE)
    }
}

/// Validates the `Content-Type` header for a POST body. Returns `true` when
/// acceptable; a caller should answer with JSON-RPC `-32700` when `false`.
#[must_use]
pub fn validate_content_type(headers: &HeaderMap) -> bool {
    match headers.get(axum::http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(value) => {
            value.starts_with("application/json") || value.starts_with("application/*") || value.starts_with("*/*")
        }
    }
}

/// Checks `Origin` against the configured allow-list. `origins` empty or
/// containing `"*"` permits any origin.
#[must_use]
pub fn origin_allowed(headers: &HeaderMap, origins: &[String]) -> bool {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return true;
    }
    match headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(origin) => origins.iter().any(|o| o == origin),
    }
}

/// Serializes `body` to JSON with an explicit charset-free content type,
/// matching the reference implementation's `_json_response` helper
/// (spec §11) rather than axum's `Json` extractor, which appends
/// `; charset=utf-8`.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(axum::body::Body::from(payload));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Reads the `Mcp-Session-Id` request header, if present.
#[must_use]
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_permits_any_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        assert!(origin_allowed(&headers, &[]));
    }

    #[test]
    fn configured_list_rejects_unknown_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        let origins = vec!["https://trusted.example".to_owned()];
        assert!(!origin_allowed(&headers, &origins));
    }

    #[test]
    fn wildcard_permits_any_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ORIGIN, HeaderValue::from_static("https://anything.example"));
        assert!(origin_allowed(&headers, &["*".to_owned()]));
    }
}
