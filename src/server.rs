//! Top-level wiring: persistence, registry, supervisor, and the three
//! frontends (MCP, OpenAPI, admin/web), each served on its own configured
//! port from a single process.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::loader;
use crate::persistence::SqlxPersistence;
use crate::registry::ToolRegistry;
use crate::reload::ReloadEngine;
use crate::session::SessionStore;
use crate::sse::SseRegistry;
use crate::supervisor::Supervisor;
use crate::{admin, auth, mcp_http, openapi, AppState};

/// Builds shared state and starts the MCP, OpenAPI, and admin/web servers.
/// Each binds its own configured port; all three share one `AppState` and
/// therefore one in-memory registry, so within a single process no fan-out
/// round-trip is ever required to see a sibling's mutation — `fan_out()`
/// exists for deployments where the frontends are split across processes.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let data_dir = config.data_dir_path();
    std::fs::create_dir_all(&data_dir)?;
    std::fs::create_dir_all(data_dir.join("tools"))?;
    std::fs::create_dir_all(data_dir.join("logs"))?;

    let persistence = Arc::new(SqlxPersistence::connect(config.persistence.database_url.as_deref(), &data_dir).await?);
    let registry = Arc::new(ToolRegistry::new(config.tool_timeout()));

    let tools_dir = data_dir.join("tools");
    for namespace in loader::discover_namespaces(&tools_dir) {
        let report = loader::load_namespace(&registry, &tools_dir, &namespace);
        info!(namespace = %namespace, loaded = report.loaded, skipped = report.skipped.len(), "loaded native namespace");
    }

    let supervisor = Arc::new(Supervisor::new(persistence.clone(), registry.clone(), data_dir.clone(), config.manage_processes));
    if let Err(err) = supervisor.sync_from_db().await {
        tracing::error!(error = %err, "initial supervisor sync failed");
    }

    let reload_engine = Arc::new(ReloadEngine::new(registry.clone(), tools_dir, Vec::new(), !cfg!(test)));

    let state = AppState {
        registry,
        supervisor,
        persistence: persistence as Arc<dyn crate::persistence::PersistenceLayer>,
        sessions: SessionStore::new(),
        sse: SseRegistry::new(),
        reload_engine,
        config: config.clone(),
    };

    let mcp_app = build_app(mcp_http::router(), &state);
    let openapi_app = build_app(openapi::router(), &state);
    let admin_app = build_app(admin::router(), &state);

    let mcp_addr = format!("{}:{}", config.server.host, config.server.mcp_port);
    let openapi_addr = format!("{}:{}", config.server.host, config.server.openapi_port);
    let admin_addr = format!("{}:{}", config.server.host, config.server.web_port);

    let mcp_listener = tokio::net::TcpListener::bind(&mcp_addr).await?;
    let openapi_listener = tokio::net::TcpListener::bind(&openapi_addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr).await?;

    info!(mcp = %mcp_addr, openapi = %openapi_addr, admin = %admin_addr, "tooldock listening");

    tokio::try_join!(
        axum::serve(mcp_listener, mcp_app.into_make_service()),
        axum::serve(openapi_listener, openapi_app.into_make_service()),
        axum::serve(admin_listener, admin_app.into_make_service()),
    )?;

    Ok(())
}

/// Wraps a frontend's routes with the shared middleware stack: request
/// timeout, body-size limit, bearer/basic auth, and HTTP tracing.
fn build_app(router: Router<AppState>, state: &AppState) -> Router {
    router
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth::require_auth))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(axum::middleware::from_fn(|req: Request, next: Next| async move {
            match tokio::time::timeout(Duration::from_secs(30), next.run(req)).await {
                Ok(response) => response,
                Err(_) => (StatusCode::REQUEST_TIMEOUT, "request timed out").into_response(),
            }
        }))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone())
}
