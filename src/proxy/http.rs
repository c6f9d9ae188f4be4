//! Streamable-HTTP transport for the MCP Proxy Client, backed by `rmcp`'s
//! reqwest-based streamable-HTTP client transport — the same transport the
//! teacher's `mcp::registry::McpRegistry` uses for its remote MCP servers.

use anyhow::Context;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{DynService, RoleClient, RunningService, ServiceExt};
use rmcp::transport::StreamableHttpClientTransport;
use serde_json::Value;

use super::types::McpTool;

type ClientService = RunningService<RoleClient, Box<dyn DynService<RoleClient>>>;

pub struct HttpTransport {
    service: ClientService,
}

impl HttpTransport {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let transport = StreamableHttpClientTransport::from_uri(url.to_owned());
        let service = ().into_dyn().serve(transport).await.context("streamable-http MCP handshake failed")?;
        Ok(Self { service })
    }

    pub async fn list_tools(&self) -> anyhow::Result<Vec<McpTool>> {
        let result = self.service.list_tools(Default::default()).await?;
        Ok(result.tools.into_iter().map(McpTool::from).collect())
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        let arguments = arguments.as_object().cloned();
        let result = self
            .service
            .call_tool(CallToolRequestParam {
                name: name.to_owned().into(),
                arguments,
            })
            .await
            .with_context(|| format!("tools/call failed for '{name}'"))?;
        Ok(serde_json::to_value(result)?)
    }
}
