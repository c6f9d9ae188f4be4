//! ToolDock: a multi-transport gateway exposing heterogeneous tools as
//! typed RPC endpoints over MCP Streamable-HTTP, REST/OpenAPI, and an
//! admin surface.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::map_err_ignore)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::unused_async)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::default_trait_access)]

use std::sync::Arc;

use mimalloc::MiMalloc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Global allocator for improved throughput under concurrent subprocess
/// supervision and proxying.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use tooldock::config::AppConfig;
use tooldock::server;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).json())
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = server::start_server(Arc::new(config)).await {
        tracing::error!(error = %err, "tooldock exited with an error");
        std::process::exit(1);
    }
}
