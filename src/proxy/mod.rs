//! MCP Proxy Client (spec §4.4): speaks MCP JSON-RPC toward a subprocess or
//! remote server over stdio or streamable HTTP, and folds every failure
//! into the uniform `{isError:true, content:[...]}` envelope at this
//! boundary so callers above never need a recovery path beyond `connect()`.

pub mod http;
pub mod stdio;
pub mod types;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};

use crate::envsub;
use crate::registry::{CallContent, ToolCallResult, ToolProxy};
use types::McpTool;

pub enum Transport {
    Stdio(stdio::StdioTransport),
    Http(http::HttpTransport),
}

/// One proxy per external server record; owned exclusively by the
/// Supervisor, which hands the Registry only a weak reference.
pub struct McpProxyClient {
    namespace: String,
    transport: RwLock<Option<Transport>>,
    tools: RwLock<Vec<McpTool>>,
    connected: AtomicBool,
    /// Bounds concurrent RPCs to this subprocess (§4.3.2 `namespace_max_concurrency`).
    concurrency: Semaphore,
}

impl McpProxyClient {
    pub fn new(namespace: impl Into<String>, max_concurrency: usize) -> Self {
        Self {
            namespace: namespace.into(),
            transport: RwLock::new(None),
            tools: RwLock::new(Vec::new()),
            connected: AtomicBool::new(false),
            concurrency: Semaphore::new(max_concurrency.max(1)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// One-shot. A subsequent call on an already-connected proxy is a no-op.
    pub async fn connect_stdio(
        &self,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> anyhow::Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let expanded_env = envsub::expand_map(env);
        let transport = stdio::StdioTransport::spawn(command, args, &expanded_env).await?;
        let tools = transport.list_tools().await?;
        *self.tools.write().await = tools;
        *self.transport.write().await = Some(Transport::Stdio(transport));
        self.connected.store(true, Ordering::Release);
        tracing::info!(namespace = %self.namespace, "mcp proxy connected over stdio");
        Ok(())
    }

    pub async fn connect_http(&self, url: &str) -> anyhow::Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let transport = http::HttpTransport::connect(url).await?;
        let tools = transport.list_tools().await?;
        *self.tools.write().await = tools;
        *self.transport.write().await = Some(Transport::Http(transport));
        self.connected.store(true, Ordering::Release);
        tracing::info!(namespace = %self.namespace, "mcp proxy connected over http");
        Ok(())
    }

    pub async fn tools(&self) -> Vec<McpTool> {
        self.tools.read().await.clone()
    }

    pub async fn disconnect(&self) {
        *self.transport.write().await = None;
        self.connected.store(false, Ordering::Release);
    }
}

#[async_trait]
impl ToolProxy for McpProxyClient {
    async fn call_tool(&self, original_name: &str, arguments: Value) -> ToolCallResult {
        if !self.is_connected() {
            return ToolCallResult::error("proxy is not connected");
        }
        let known = self
            .tools
            .read()
            .await
            .iter()
            .any(|t| t.name == original_name);
        if !known {
            return ToolCallResult::error(format!("tool '{original_name}' not found"));
        }

        let Ok(_permit) = self.concurrency.acquire().await else {
            return ToolCallResult::error("proxy is shutting down");
        };

        let guard = self.transport.read().await;
        let result = match guard.as_ref() {
            Some(Transport::Stdio(t)) => t.call_tool(original_name, arguments).await,
            Some(Transport::Http(t)) => t.call_tool(original_name, arguments).await,
            None => return ToolCallResult::error("proxy is not connected"),
        };

        match result {
            Ok(value) => content_from_mcp_result(value),
            Err(err) => ToolCallResult::error(err.to_string()),
        }
    }
}

/// Maps a raw MCP `tools/call` result value's `content` blocks into the
/// uniform envelope (text/data/unknown).
fn content_from_mcp_result(value: Value) -> ToolCallResult {
    let is_error = value
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let content = value
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .map(|block| match block.get("type").and_then(Value::as_str) {
                    Some("text") => CallContent::Text {
                        text: block
                            .get("text")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_owned(),
                    },
                    Some("data") => CallContent::Data {
                        data: block.get("data").cloned().unwrap_or(Value::Null),
                    },
                    _ => CallContent::Unknown {
                        value: block.clone(),
                    },
                })
                .collect()
        })
        .unwrap_or_else(|| vec![CallContent::Text { text: value.to_string() }]);

    ToolCallResult { content, is_error }
}
