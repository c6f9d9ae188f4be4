//! External Server Supervisor (spec §4.3): bridges durable
//! `ExternalServerRecord`s to live subprocess providers.

pub mod install;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Result, ToolDockError};
use crate::persistence::record::{ExternalServerRecord, ServerStatus, TransportType};
use crate::persistence::PersistenceLayer;
use crate::proxy::McpProxyClient;
use crate::registry::ToolRegistry;

const READINESS_ATTEMPTS: u32 = 5;
const READINESS_INTERVAL: Duration = Duration::from_millis(250);
const STOP_GRACE: Duration = Duration::from_secs(3);
const SYNC_RECONNECT_ATTEMPTS: u32 = 5;
const SYNC_RECONNECT_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_NAMESPACE_MAX_CONCURRENCY: usize = 8;

struct RunningProcess {
    child: Child,
}

pub struct Supervisor {
    persistence: Arc<dyn PersistenceLayer>,
    registry: Arc<ToolRegistry>,
    data_dir: PathBuf,
    manage_processes: bool,
    proxies: RwLock<HashMap<String, Arc<McpProxyClient>>>,
    processes: Mutex<HashMap<String, RunningProcess>>,
    /// Serializes state transitions per record (spec §5).
    record_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Supervisor {
    pub fn new(
        persistence: Arc<dyn PersistenceLayer>,
        registry: Arc<ToolRegistry>,
        data_dir: PathBuf,
        manage_processes: bool,
    ) -> Self {
        Self {
            persistence,
            registry,
            data_dir,
            manage_processes,
            proxies: RwLock::new(HashMap::new()),
            processes: Mutex::new(HashMap::new()),
            record_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.record_locks
            .lock()
            .await
            .entry(id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn assign_port(namespace: &str) -> u16 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        namespace.hash(&mut hasher);
        let base = 30000 + (hasher.finish() % 20000) as u16;
        if std::net::TcpListener::bind(("127.0.0.1", base)).is_ok() {
            return base;
        }
        std::net::TcpListener::bind(("127.0.0.1", 0))
            .and_then(|l| l.local_addr())
            .map(|a| a.port())
            .unwrap_or(base)
    }

    /// `start(id)` (spec §4.3.2). Refuses when the supervisor is read-only.
    pub async fn start(&self, id: &str) -> Result<()> {
        if !self.manage_processes {
            return Err(ToolDockError::InstallFailed(
                "supervisor is read-only (manage_processes=false)".to_owned(),
            ));
        }
        let record_lock = self.lock_for(id).await;
        let _guard = record_lock.lock().await;

        let mut record = self
            .persistence
            .get_server(id)
            .await
            .map_err(ToolDockError::Internal)?
            .ok_or_else(|| ToolDockError::NamespaceNotFound(id.to_owned()))?;

        match record.transport_type {
            TransportType::Http => {
                if record.server_url.is_none() {
                    self.start_subprocess(&mut record).await?;
                }
            }
            TransportType::Stdio => {
                // Stdio transport is bridged directly by the proxy client;
                // no local port or readiness probe applies.
            }
        }

        record.status = ServerStatus::Running;
        record.last_error = None;
        self.persistence
            .update_server(&record)
            .await
            .map_err(ToolDockError::Internal)?;

        self.publish(&record).await?;
        Ok(())
    }

    async fn start_subprocess(&self, record: &mut ExternalServerRecord) -> Result<()> {
        let port = Self::assign_port(&record.namespace);
        let mut env = record.env_vars.clone();
        env.insert("FASTMCP_HOST".to_owned(), "127.0.0.1".to_owned());
        env.insert("FASTMCP_PORT".to_owned(), port.to_string());
        env.insert("FASTMCP_STREAMABLE_HTTP_PATH".to_owned(), "/mcp".to_owned());
        if let Some(venv) = &record.venv_path {
            let site_packages = format!("{venv}/lib/site-packages");
            let existing = std::env::var("PYTHONPATH").unwrap_or_default();
            env.insert(
                "PYTHONPATH".to_owned(),
                if existing.is_empty() {
                    site_packages
                } else {
                    format!("{site_packages}:{existing}")
                },
            );
        }

        let log_dir = self.data_dir.join("logs");
        std::fs::create_dir_all(&log_dir).map_err(|e| ToolDockError::Internal(e.into()))?;
        let log_file = std::fs::File::create(log_dir.join(format!("{}.log", record.namespace)))
            .map_err(|e| ToolDockError::Internal(e.into()))?;
        let log_file_err = log_file
            .try_clone()
            .map_err(|e| ToolDockError::Internal(e.into()))?;

        let Some(command) = record.startup_command.clone().filter(|c| !c.is_empty()) else {
            return Err(ToolDockError::InstallFailed("no startup command recorded".to_owned()));
        };

        let mut cmd = tokio::process::Command::new(&command);
        cmd.args(&record.command_args)
            .stdin(std::process::Stdio::null())
            .stdout(log_file)
            .stderr(log_file_err);
        for (k, v) in crate::envsub::expand_map(&env) {
            cmd.env(k, v);
        }

        let child = cmd.spawn().map_err(|e| ToolDockError::WorkerCrashed(e.to_string()))?;
        let pid = child.id().map(|p| p as i32);

        self.processes
            .lock()
            .await
            .insert(record.id.clone(), RunningProcess { child });

        record.port = Some(i32::from(port));
        record.pid = pid;
        record.server_url = None;

        if let Err(err) = self.probe_ready(port).await {
            self.kill_process(&record.id).await;
            record.status = ServerStatus::Error;
            record.last_error = Some(err.to_string());
            let _ = self.persistence.update_server(record).await;
            return Err(ToolDockError::WorkerTimeout);
        }

        Ok(())
    }

    async fn probe_ready(&self, port: u16) -> anyhow::Result<()> {
        let url = format!("http://127.0.0.1:{port}/mcp");
        let client = reqwest::Client::new();
        for attempt in 0..READINESS_ATTEMPTS {
            tokio::time::sleep(READINESS_INTERVAL).await;
            let probe = serde_json::json!({
                "jsonrpc": "2.0", "id": 0, "method": "initialize",
                "params": {"protocolVersion": "2025-03-26", "capabilities": {}, "clientInfo": {"name": "tooldock-probe"}}
            });
            match client.post(&url).json(&probe).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => {
                    tracing::warn!(attempt, port, "readiness probe not ready yet");
                }
            }
        }
        anyhow::bail!("subprocess on port {port} did not become ready")
    }

    async fn kill_process(&self, id: &str) {
        if let Some(mut proc) = self.processes.lock().await.remove(id) {
            let _ = proc.child.start_kill();
        }
    }

    /// `stop(id)` (spec §4.3.2): graceful terminate, 3s, then kill.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let record_lock = self.lock_for(id).await;
        let _guard = record_lock.lock().await;

        let mut record = self
            .persistence
            .get_server(id)
            .await
            .map_err(ToolDockError::Internal)?
            .ok_or_else(|| ToolDockError::NamespaceNotFound(id.to_owned()))?;

        if let Some(mut proc) = self.processes.lock().await.remove(id) {
            if let Some(pid) = proc.child.id() {
                send_terminate(pid);
            }
            match tokio::time::timeout(STOP_GRACE, proc.child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    let _ = proc.child.start_kill();
                    let _ = proc.child.wait().await;
                }
            }
        }

        if let Some(proxy) = self.proxies.write().await.remove(id) {
            proxy.disconnect().await;
        }
        self.registry.unregister_server(id);

        record.status = ServerStatus::Stopped;
        record.pid = None;
        self.persistence
            .update_server(&record)
            .await
            .map_err(ToolDockError::Internal)?;
        Ok(())
    }

    /// `delete(id)` (spec §4.3.2): stops if running, removes the record and
    /// its on-disk tree, confined to the server's own base directory.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let record = self
            .persistence
            .get_server(id)
            .await
            .map_err(ToolDockError::Internal)?
            .ok_or_else(|| ToolDockError::NamespaceNotFound(id.to_owned()))?;

        if record.status == ServerStatus::Running {
            self.stop(id).await?;
        }

        let servers_base = self.data_dir.join("external").join("servers");
        let target = servers_base.join(&record.namespace);
        if target.exists() {
            if let Ok(confined) = install::confine_to_base(&servers_base, &target) {
                let _ = std::fs::remove_dir_all(confined);
            }
        }
        if let Some(venv) = &record.venv_path {
            let venv_base = self.data_dir.join("venvs");
            let venv_path = PathBuf::from(venv);
            if let Ok(confined) = install::confine_to_base(&venv_base, &venv_path) {
                let _ = std::fs::remove_dir_all(confined);
            }
        }

        self.persistence
            .delete_server(id)
            .await
            .map_err(ToolDockError::Internal)?;
        Ok(())
    }

    /// Publication (spec §4.3.3): connect a proxy and register its tools
    /// under the record's namespace with displayed name `ns:tool`.
    async fn publish(&self, record: &ExternalServerRecord) -> Result<()> {
        let proxy = Arc::new(McpProxyClient::new(
            record.namespace.clone(),
            DEFAULT_NAMESPACE_MAX_CONCURRENCY,
        ));

        let connect_result = match record.transport_type {
            TransportType::Stdio => {
                let command = record.startup_command.clone().unwrap_or_default();
                proxy
                    .connect_stdio(&command, &record.command_args, &record.env_vars)
                    .await
            }
            TransportType::Http => {
                let url = record
                    .server_url
                    .clone()
                    .unwrap_or_else(|| format!("http://127.0.0.1:{}/mcp", record.port.unwrap_or(0)));
                proxy.connect_http(&url).await
            }
        };
        connect_result.map_err(|e| ToolDockError::WorkerCrashed(e.to_string()))?;

        let tools = proxy.tools().await;
        let weak: std::sync::Weak<dyn crate::registry::ToolProxy> =
            Arc::downgrade(&(proxy.clone() as Arc<dyn crate::registry::ToolProxy>));
        for tool in tools {
            let _ = self.registry.register_external(
                &record.namespace,
                &tool.name,
                tool.description.as_deref().unwrap_or(""),
                tool.input_schema.clone(),
                &record.id,
                weak.clone(),
            );
        }

        self.proxies.write().await.insert(record.id.clone(), proxy);
        tracing::info!(namespace = %record.namespace, server_id = %record.id, "external server published");
        Ok(())
    }

    async fn unpublish(&self, id: &str) {
        if let Some(proxy) = self.proxies.write().await.remove(id) {
            proxy.disconnect().await;
        }
        self.registry.unregister_server(id);
    }

    /// `sync_from_db()` (spec §4.3.4): reconciles persisted state with live
    /// state. Idempotent; safe to call repeatedly (spec §8 "Supervisor
    /// idempotence").
    pub async fn sync_from_db(&self) -> Result<()> {
        let records = self.persistence.list_servers().await.map_err(ToolDockError::Internal)?;
        let bridged: Vec<String> = self.proxies.read().await.keys().cloned().collect();

        for record in &records {
            let is_bridged = bridged.contains(&record.id);

            if record.status == ServerStatus::Stopped && record.auto_start && self.manage_processes {
                if let Err(err) = self.start(&record.id).await {
                    tracing::warn!(server_id = %record.id, error = %err, "auto-start failed during sync");
                }
                continue;
            }

            if record.status == ServerStatus::Running && !is_bridged {
                if let Some(pid) = record.pid {
                    if !process_alive(pid) {
                        tracing::info!(server_id = %record.id, "crash detected during sync");
                        let mut demoted = record.clone();
                        demoted.status = ServerStatus::Stopped;
                        demoted.pid = None;
                        let _ = self.persistence.update_server(&demoted).await;
                        continue;
                    }
                }
                if let Err(err) = self.reconnect_with_backoff(record).await {
                    tracing::warn!(server_id = %record.id, error = %err, "failed to bridge running record");
                }
            }

            if record.status != ServerStatus::Running && is_bridged {
                self.unpublish(&record.id).await;
            }
        }

        let live_ids: std::collections::HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        for id in bridged {
            if !live_ids.contains(id.as_str()) {
                self.unpublish(&id).await;
            }
        }

        Ok(())
    }

    async fn reconnect_with_backoff(&self, record: &ExternalServerRecord) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..SYNC_RECONNECT_ATTEMPTS {
            match self.publish(record).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(attempt, server_id = %record.id, error = %err, "reconnect attempt failed");
                    last_err = Some(err);
                    tokio::time::sleep(SYNC_RECONNECT_INTERVAL).await;
                }
            }
        }
        Err(last_err.unwrap_or(ToolDockError::NotConnected))
    }
}

/// Sends a graceful-shutdown signal to `pid` by shelling out (spec §4.3.2
/// `stop`), keeping this module free of a raw-syscall dependency.
fn send_terminate(pid: u32) {
    #[cfg(unix)]
    {
        let _ = std::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status();
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// PID liveness check used by crash detection (spec §4.3.4).
fn process_alive(pid: i32) -> bool {
    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}
