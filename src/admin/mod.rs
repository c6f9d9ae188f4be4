//! Admin surface (spec §4.10, §6.3): external-server CRUD over the
//! supervisor, native-tool manifest uploads that trigger a hot reload, and
//! masked listings of persisted server configuration.

use std::collections::HashMap;
use std::sync::LazyLock;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Result, ToolDockError};
use crate::mcp_http::headers::json_response;
use crate::namespace;
use crate::persistence::record::{ExternalServerRecord, InstallMethod, PackageRegistryType, ServerStatus, TransportType};
use crate::supervisor::install::{self, InstallRequest};
use crate::AppState;

/// Case-insensitive match on a secret-shaped env-var key (spec §4.10).
static SECRET_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(token|secret|password|key|credential|connection.*string)").expect("valid regex"));

/// Manifest filename pattern. The reference implementation uploads `.py`
/// sources (spec §6.3); this crate's tool loader takes JSON manifests
/// instead (see `src/loader.rs`), so the accepted extension is adapted
/// accordingly — noted in DESIGN.md.
static MANIFEST_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*\.json$").expect("valid regex"));

const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/servers", get(list_servers).post(create_server))
        .route("/admin/servers/{id}/start", post(start_server))
        .route("/admin/servers/{id}/stop", post(stop_server))
        .route("/admin/servers/{id}", delete(delete_server))
        .route("/admin/tools/{namespace}/{filename}", put(upload_tool))
        .route("/admin/reload/{namespace}", post(reload_namespace))
}

async fn list_servers(State(state): State<AppState>) -> Result<Response> {
    let servers = state.persistence.list_servers().await.map_err(ToolDockError::Internal)?;
    let masked: Vec<Value> = servers.iter().map(mask_record).collect();
    Ok(json_response(StatusCode::OK, &json!({"servers": masked})))
}

/// Replaces env-var values whose key looks secret-shaped with
/// `"***MASKED***"`, exempting bare `${VAR}` indirections so an operator
/// can still see which variable backs a value.
fn mask_record(record: &ExternalServerRecord) -> Value {
    let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
    if let Some(env) = value.get_mut("env_vars").and_then(Value::as_object_mut) {
        for (key, entry) in env.iter_mut() {
            let Some(text) = entry.as_str() else { continue };
            if SECRET_KEY_RE.is_match(key) && !crate::envsub::is_bare_placeholder(text) {
                *entry = Value::String("***MASKED***".to_owned());
            }
        }
    }
    value
}

#[derive(Debug, Deserialize)]
struct CreateServerRequest {
    namespace: String,
    install_method: String,
    #[serde(default)]
    package_registry_type: Option<String>,
    #[serde(default)]
    package_identifier: Option<String>,
    #[serde(default)]
    package_version: Option<String>,
    #[serde(default)]
    repo_url: Option<String>,
    #[serde(default)]
    entrypoint: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    command_args: Vec<String>,
    #[serde(default)]
    env_vars: HashMap<String, String>,
    #[serde(default)]
    server_url: Option<String>,
    #[serde(default = "default_transport")]
    transport_type: String,
    #[serde(default)]
    auto_start: bool,
    /// Caller's explicit acknowledgement to proceed past a blocked safety
    /// check (spec §4.3.1). Has no effect when the check doesn't block.
    #[serde(default)]
    override_safety: bool,
}

fn default_transport() -> String {
    "stdio".to_owned()
}

async fn create_server(State(state): State<AppState>, body: axum::Json<CreateServerRequest>) -> Result<Response> {
    let req = body.0;
    namespace::validate(&req.namespace)?;
    if state.registry.has_namespace(&req.namespace) {
        return Err(ToolDockError::Validation(format!(
            "namespace '{}' already has a registered server",
            req.namespace
        )));
    }

    let install_request = build_install_request(&req)?;
    let safety = install::safety_check(&install_request);
    if safety.blocked && !req.override_safety {
        return Err(ToolDockError::InstallFailed(format!(
            "blocked by safety check: {} (pass override_safety to proceed anyway)",
            safety.risk_level
        )));
    }

    let outcome = install::install(&state.config.data_dir_path(), &req.namespace, &install_request)
        .await
        .map_err(|e| ToolDockError::InstallFailed(e.to_string()))?;

    let transport_type = TransportType::parse(&req.transport_type).unwrap_or(TransportType::Stdio);
    let now = chrono::Utc::now();
    let record = ExternalServerRecord {
        id: Uuid::new_v4().to_string(),
        namespace: req.namespace.clone(),
        server_name: req.package_identifier.clone().unwrap_or_else(|| req.namespace.clone()),
        version: req.package_version.clone(),
        install_method: InstallMethod::parse(&req.install_method).unwrap_or(InstallMethod::Manual),
        package_identifier: req.package_identifier.clone(),
        package_registry_type: req.package_registry_type.as_deref().and_then(PackageRegistryType::parse),
        repo_url: req.repo_url.clone(),
        entrypoint: outcome.entrypoint.or(req.entrypoint.clone()),
        startup_command: Some(outcome.startup_command),
        command_args: outcome.command_args,
        env_vars: outcome.env_vars,
        config_file: None,
        transport_type,
        server_url: outcome.server_url.or(req.server_url.clone()),
        port: None,
        venv_path: outcome.venv_path,
        status: ServerStatus::Stopped,
        pid: None,
        last_error: None,
        auto_start: req.auto_start,
        created_at: now,
        updated_at: now,
    };

    state.persistence.insert_server(&record).await.map_err(ToolDockError::Internal)?;

    if req.auto_start && state.config.manage_processes {
        state.supervisor.start(&record.id).await?;
    }

    Ok(json_response(StatusCode::CREATED, &mask_record(&record)))
}

fn build_install_request(req: &CreateServerRequest) -> Result<InstallRequest> {
    match req.install_method.as_str() {
        "package" => {
            let registry_type = req
                .package_registry_type
                .as_deref()
                .and_then(PackageRegistryType::parse)
                .ok_or_else(|| ToolDockError::Validation("package_registry_type is required".to_owned()))?;
            let identifier = req
                .package_identifier
                .clone()
                .ok_or_else(|| ToolDockError::Validation("package_identifier is required".to_owned()))?;
            Ok(InstallRequest::Package {
                registry_type,
                identifier,
                version: req.package_version.clone(),
            })
        }
        "repo" => {
            let repo_url = req.repo_url.clone().ok_or_else(|| ToolDockError::Validation("repo_url is required".to_owned()))?;
            Ok(InstallRequest::Repo {
                repo_url,
                entrypoint: req.entrypoint.clone(),
            })
        }
        "manual" => {
            let command = req.command.clone().ok_or_else(|| ToolDockError::Validation("command is required".to_owned()))?;
            Ok(InstallRequest::Manual {
                command,
                args: req.command_args.clone(),
                env: req.env_vars.clone(),
            })
        }
        "http" => {
            let server_url = req.server_url.clone().ok_or_else(|| ToolDockError::Validation("server_url is required".to_owned()))?;
            Ok(InstallRequest::Http { server_url })
        }
        other => Err(ToolDockError::Validation(format!("unknown install_method '{other}'"))),
    }
}

async fn start_server(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    state.supervisor.start(&id).await?;
    Ok(StatusCode::OK.into_response())
}

async fn stop_server(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    state.supervisor.stop(&id).await?;
    Ok(StatusCode::OK.into_response())
}

async fn delete_server(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    state.supervisor.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn upload_tool(
    State(state): State<AppState>,
    Path((namespace, filename)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> Result<Response> {
    namespace::validate(&namespace)?;
    if state.registry.namespace_is_external(&namespace) {
        return Err(ToolDockError::CannotReloadExternal(namespace));
    }
    if !MANIFEST_FILENAME_RE.is_match(&filename) {
        return Err(ToolDockError::Validation(format!("invalid manifest filename '{filename}'")));
    }
    if body.len() > MAX_UPLOAD_BYTES {
        return Err(ToolDockError::Validation("manifest exceeds the 1 MiB upload limit".to_owned()));
    }

    let namespace_dir = state.config.data_dir_path().join("tools").join(&namespace);
    tokio::fs::create_dir_all(&namespace_dir).await.map_err(|e| ToolDockError::Internal(e.into()))?;
    let target = install::confine_to_base(&namespace_dir, &namespace_dir.join(&filename))
        .map_err(|_| ToolDockError::Validation("path escapes the namespace directory".to_owned()))?;
    tokio::fs::write(&target, &body).await.map_err(|e| ToolDockError::Internal(e.into()))?;

    let result = state.reload_engine.reload_namespace(&namespace)?;
    state.reload_engine.fan_out().await;

    Ok(json_response(StatusCode::OK, &result))
}

async fn reload_namespace(State(state): State<AppState>, Path(namespace): Path<String>) -> Result<Response> {
    let result = state.reload_engine.reload_namespace(&namespace)?;
    state.reload_engine.fan_out().await;
    Ok(json_response(StatusCode::OK, &result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_safety_defaults_to_false() {
        let req: CreateServerRequest = serde_json::from_value(json!({
            "namespace": "shared",
            "install_method": "manual",
            "command": "true",
        }))
        .unwrap();
        assert!(!req.override_safety);
    }

    #[test]
    fn override_safety_can_be_set_explicitly() {
        let req: CreateServerRequest = serde_json::from_value(json!({
            "namespace": "shared",
            "install_method": "manual",
            "command": "true",
            "override_safety": true,
        }))
        .unwrap();
        assert!(req.override_safety);
    }
}
