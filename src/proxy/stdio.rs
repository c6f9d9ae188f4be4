//! Stdio transport for the MCP Proxy Client: spawns the external server as
//! a child process and speaks MCP over its stdio via `rmcp`'s own client
//! transport and service machinery, the same way the teacher's
//! `mcp::registry::McpRegistry` bridges stdio-based servers.

use std::collections::HashMap;

use anyhow::Context;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{DynService, RoleClient, RunningService, ServiceExt};
use rmcp::transport::TokioChildProcess;
use serde_json::Value;
use tokio::process::Command;

use super::types::McpTool;

type ClientService = RunningService<RoleClient, Box<dyn DynService<RoleClient>>>;

pub struct StdioTransport {
    service: ClientService,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> anyhow::Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let transport = TokioChildProcess::new(cmd).context("failed to spawn MCP server process")?;
        let service = ().into_dyn().serve(transport).await.context("stdio MCP handshake failed")?;
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
