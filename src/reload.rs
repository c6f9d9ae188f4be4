//! Hot-Reload Engine (spec §4.8): replace a native namespace's tool set
//! without restarting the process, then fan the event out to sibling
//! processes on a best-effort basis.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, ToolDockError};
use crate::loader;
use crate::registry::ToolRegistry;

#[derive(Debug, Serialize)]
pub struct ReloadResult {
    pub namespace: String,
    pub unloaded: usize,
    pub loaded: usize,
    pub success: bool,
    pub error: Option<String>,
}

pub struct ReloadEngine {
    registry: Arc<ToolRegistry>,
    tools_dir: PathBuf,
    fanout_targets: Vec<String>,
    fanout_enabled: bool,
    http: reqwest::Client,
}

impl ReloadEngine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        tools_dir: PathBuf,
        fanout_targets: Vec<String>,
        fanout_enabled: bool,
    ) -> Self {
        Self {
            registry,
            tools_dir,
            fanout_targets,
            fanout_enabled,
            http: reqwest::Client::builder()
                .timeout(Duration::from_millis(500))
                .build()
                .expect("http client"),
        }
    }

    pub fn reload_namespace(&self, namespace: &str) -> Result<ReloadResult> {
        if self.registry.namespace_is_external(namespace) {
            return Err(ToolDockError::CannotReloadExternal(namespace.to_owned()));
        }
        if !self.tools_dir.join(namespace).exists() {
            return Err(ToolDockError::NamespaceNotFound(namespace.to_owned()));
        }

        let existing: Vec<String> = self
            .registry
            .list_for_namespace(namespace)
            .into_iter()
            .map(|d| d.name)
            .collect();
        let unloaded = existing.len();
        for name in &existing {
            self.registry.unregister(namespace, name);
        }

        loader::bump_generation();

        let report = loader::load_namespace(&self.registry, &self.tools_dir, namespace);

        Ok(ReloadResult {
            namespace: namespace.to_owned(),
            unloaded,
            loaded: report.loaded,
            success: report.skipped.is_empty(),
            error: (!report.skipped.is_empty()).then(|| {
                report
                    .skipped
                    .iter()
                    .map(|(f, e)| format!("{f}: {e}"))
                    .collect::<Vec<_>>()
                    .join("; ")
            }),
        })
    }

    pub fn reload_all(&self) -> Vec<ReloadResult> {
        loader::discover_namespaces(&self.tools_dir)
            .into_iter()
            .filter(|ns| !self.registry.namespace_is_external(ns))
            .map(|ns| {
                self.reload_namespace(&ns).unwrap_or_else(|err| ReloadResult {
                    namespace: ns.clone(),
                    unloaded: 0,
                    loaded: 0,
                    success: false,
                    error: Some(err.to_string()),
                })
            })
            .collect()
    }

    /// Best-effort notification of sibling processes that shared state
    /// changed. Failures are logged and never propagated; suppressed when
    /// `fanout_enabled` is false (set to `false` under test).
    pub async fn fan_out(&self) {
        if !self.fanout_enabled {
            return;
        }
        for target in &self.fanout_targets {
            let http = self.http.clone();
            let target = target.clone();
            tokio::spawn(async move {
                if let Err(err) = http.post(&target).send().await {
                    tracing::warn!(target = %target, error = %err, "reload fan-out failed");
                }
            });
        }
    }
}
