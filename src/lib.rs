//! ToolDock: a multi-transport gateway that exposes heterogeneous "tools"
//! as typed RPC endpoints.
//!
//! # Architecture
//!
//! - **Tool Registry** ([`registry`]): namespace-partitioned catalog of
//!   native and external tools, at-most-one-name per namespace.
//! - **External Server Supervisor** ([`supervisor`]): installs, starts,
//!   stops, and bridges subprocess-backed MCP servers.
//! - **MCP Streamable-HTTP Protocol Layer** ([`mcp_http`]): JSON-RPC 2.0 +
//!   SSE frontend speaking the MCP wire protocol.
//! - **OpenAPI/REST frontend** ([`openapi`]): one endpoint per tool.
//! - **Hot-Reload Engine** ([`reload`]): replaces a native namespace's tool
//!   set without restarting the process, with cross-process fan-out.
//! - **Persistence** ([`persistence`]): durable server records and a
//!   registry metadata cache, SQLite by default.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod admin;
pub mod auth;
pub mod config;
pub mod envsub;
pub mod error;
pub mod loader;
pub mod mcp_http;
pub mod namespace;
pub mod openapi;
pub mod persistence;
pub mod proxy;
pub mod registry;
pub mod reload;
pub mod server;
pub mod session;
pub mod sse;
pub mod supervisor;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::persistence::PersistenceLayer;
use crate::registry::ToolRegistry;
use crate::reload::ReloadEngine;
use crate::session::SessionStore;
use crate::sse::SseRegistry;
use crate::supervisor::Supervisor;

/// Application state shared across all handlers and all three frontends
/// (MCP, OpenAPI, admin).
#[derive(Clone)]
pub struct AppState {
    /// Namespace-partitioned tool catalog.
    pub registry: Arc<ToolRegistry>,
    /// External server subprocess lifecycle owner.
    pub supervisor: Arc<Supervisor>,
    /// Durable server records and registry cache.
    pub persistence: Arc<dyn PersistenceLayer>,
    /// Active MCP sessions, keyed by `Mcp-Session-Id`.
    pub sessions: SessionStore,
    /// SSE subscriber registries (global + per-namespace).
    pub sse: SseRegistry,
    /// Hot-reload engine for native tool namespaces.
    pub reload_engine: Arc<ReloadEngine>,
    /// Layered application configuration.
    pub config: Arc<AppConfig>,
}
