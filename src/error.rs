//! Typed error taxonomy that crosses every transport boundary.
//!
//! Internal plumbing (config loading, process spawning, I/O) uses
//! `anyhow::Result` and is converted into [`ToolDockError::Internal`] at the
//! point it would otherwise leak to a client, with the original error logged
//! via `tracing::error!` rather than forwarded verbatim.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ToolDockError {
    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("tool call timed out")]
    Timeout,

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error")]
    Internal(#[source] anyhow::Error),

    #[error("tool '{0}' already registered in namespace '{1}'")]
    DuplicateTool(String, String),

    #[error("namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("namespace '{0}' is invalid")]
    NamespaceInvalid(String),

    #[error("package '{0}' not found")]
    PackageNotFound(String),

    #[error("install failed: {0}")]
    InstallFailed(String),

    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("worker did not become ready in time")]
    WorkerTimeout,

    #[error("proxy is not connected")]
    NotConnected,

    #[error("{0} cannot be reloaded because it is an external namespace")]
    CannotReloadExternal(String),
}

impl ToolDockError {
    /// Short machine-readable code, matching the taxonomy in the spec.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ToolNotFound(_) => "tool_not_found",
            Self::Validation(_) => "validation_error",
            Self::Timeout => "tool_timeout",
            Self::Unauthorized => "unauthorized",
            Self::Internal(_) => "internal_error",
            Self::DuplicateTool(_, _) => "duplicate_tool",
            Self::NamespaceNotFound(_) => "namespace_not_found",
            Self::NamespaceInvalid(_) => "namespace_invalid",
            Self::PackageNotFound(_) => "package_not_found",
            Self::InstallFailed(_) => "install_failed",
            Self::WorkerCrashed(_) => "worker_crashed",
            Self::WorkerTimeout => "worker_timeout",
            Self::NotConnected => "not_connected",
            Self::CannotReloadExternal(_) => "cannot_reload_external",
        }
    }

    /// HTTP status used by the OpenAPI/REST and admin surfaces.
    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::ToolNotFound(_) | Self::NamespaceNotFound(_) | Self::PackageNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Validation(_) | Self::NamespaceInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Timeout | Self::WorkerTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::DuplicateTool(_, _) => StatusCode::CONFLICT,
            Self::CannotReloadExternal(_) => StatusCode::BAD_REQUEST,
            Self::InstallFailed(_) | Self::WorkerCrashed(_) | Self::NotConnected => {
                StatusCode::BAD_REQUEST
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON-RPC error code for the MCP surface. Most tool-level failures map
    /// to `-32602` (invalid params) per the spec's `tools/call` handling;
    /// transport/framing issues use their own reserved codes elsewhere.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            Self::ToolNotFound(_) => -32602,
            Self::Validation(_) => -32602,
            _ => -32603,
        }
    }

    /// Render the OpenAPI error envelope `{error:{code,message,details}}`.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        if let Self::Internal(source) = self {
            tracing::error!(error = %source, "internal error");
        }
        ErrorEnvelope {
            error: ErrorBody {
                code: self.code().to_owned(),
                message: self.to_string(),
                details: None,
            },
        }
    }

    pub fn to_envelope_with_details(&self, details: Value) -> ErrorEnvelope {
        let mut envelope = self.to_envelope();
        envelope.error.details = Some(details);
        envelope
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl axum::response::IntoResponse for ToolDockError {
    fn into_response(self) -> axum::response::Response {
        let status = self.http_status();
        let envelope = self.to_envelope();
        (status, axum::Json(envelope)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ToolDockError>;
