//! Layered configuration (spec §10.3): defaults → `config.yaml` under
//! `DATA_DIR` → environment variables (§6.5) → CLI flag overrides, matching
//! the teacher's `AppConfig::load()` layering.

use std::env;
use std::path::PathBuf;

use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (defaults to `<data_dir>/config.yaml`).
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// MCP JSON-RPC server port.
    #[arg(long, env = "MCP_PORT")]
    pub mcp_port: Option<u16>,

    /// OpenAPI server port.
    #[arg(long, env = "OPENAPI_PORT")]
    pub openapi_port: Option<u16>,

    /// Admin/web server port.
    #[arg(long, env = "WEB_PORT")]
    pub web_port: Option<u16>,

    /// Root of the persisted layout.
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<String>,

    /// Disable process management (useful for tests driving the router
    /// without spawning real subprocesses).
    #[arg(long)]
    pub no_manage_processes: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub mcp: McpConfig,
    pub persistence: PersistenceConfig,
    pub cors: CorsConfig,
    #[serde(default)]
    pub manage_processes: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub mcp_port: u16,
    pub openapi_port: u16,
    pub web_port: u16,
    pub data_dir: String,
    pub tool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub bearer_token: String,
    pub admin_username: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct McpConfig {
    pub server_name: String,
    pub default_protocol_version: String,
    pub supported_protocol_versions: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub origins: Vec<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let args: Vec<String> = env::args().collect();
        if cfg!(test) || env::var("TOOLDOCK_TEST_MODE").is_ok() {
            Self::load_from_args(vec!["tooldock".to_string()])
        } else {
            Self::load_from_args(args)
        }
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = match Cli::try_parse_from(args) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Warning: failed to parse CLI args: {e}");
                Cli {
                    config: None,
                    mcp_port: None,
                    openapi_port: None,
                    web_port: None,
                    data_dir: None,
                    no_manage_processes: false,
                }
            }
        };

        let mut builder = Config::builder();

        builder = builder
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.mcp_port", 3100)?
            .set_default("server.openapi_port", 3200)?
            .set_default("server.web_port", 3300)?
            .set_default("server.data_dir", "./data")?
            .set_default("server.tool_timeout_seconds", 30)?
            .set_default("auth.bearer_token", "")?
            .set_default("auth.admin_username", "admin")?
            .set_default("mcp.server_name", "tooldock")?
            .set_default("mcp.default_protocol_version", "2024-11-05")?
            .set_default(
                "mcp.supported_protocol_versions",
                vec!["2024-11-05", "2025-03-26"],
            )?
            .set_default::<_, Option<String>>("persistence.database_url", None)?
            .set_default("cors.origins", Vec::<String>::new())?
            .set_default("manage_processes", true)?;

        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| env::var("DATA_DIR").ok())
            .unwrap_or_else(|| "./data".to_owned());

        let explicit_config = cli.config.clone().or_else(|| env::var("CONFIG_FILE").ok());
        let config_path = explicit_config.unwrap_or_else(|| format!("{data_dir}/config.yaml"));
        if std::path::Path::new(&config_path).exists() {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml));
        }

        builder = builder.add_source(
            Environment::with_prefix("TOOLDOCK")
                .separator("__")
                .try_parsing(true),
        );

        if let Ok(val) = env::var("BEARER_TOKEN") {
            builder = builder.set_override("auth.bearer_token", val)?;
        }
        if let Ok(val) = env::var("ADMIN_USERNAME") {
            builder = builder.set_override("auth.admin_username", val)?;
        }
        if let Ok(val) = env::var("DATA_DIR") {
            builder = builder.set_override("server.data_dir", val)?;
        }
        if let Ok(val) = env::var("DATABASE_URL") {
            builder = builder.set_override("persistence.database_url", val)?;
        }
        if let Ok(val) = env::var("HOST") {
            let normalized = if val == "0.0.0.0" { "127.0.0.1".to_owned() } else { val };
            builder = builder.set_override("server.host", normalized)?;
        }
        if let Ok(val) = env::var("TOOL_TIMEOUT_SECONDS") {
            if let Ok(secs) = val.parse::<u64>() {
                builder = builder.set_override("server.tool_timeout_seconds", secs as i64)?;
            }
        }
        if let Ok(val) = env::var("MCP_SERVER_NAME") {
            builder = builder.set_override("mcp.server_name", val)?;
        }
        if let Ok(val) = env::var("MCP_PROTOCOL_VERSION") {
            builder = builder.set_override("mcp.default_protocol_version", val)?;
        }
        if let Ok(val) = env::var("MCP_PROTOCOL_VERSIONS") {
            let versions: Vec<String> = val.split(',').map(|s| s.trim().to_owned()).collect();
            builder = builder.set_override("mcp.supported_protocol_versions", versions)?;
        }
        if let Ok(val) = env::var("CORS_ORIGINS") {
            let origins: Vec<String> = val.split(',').map(|s| s.trim().to_owned()).collect();
            builder = builder.set_override("cors.origins", origins)?;
        }

        if let Some(port) = cli.mcp_port {
            builder = builder.set_override("server.mcp_port", port as i64)?;
        }
        if let Some(port) = cli.openapi_port {
            builder = builder.set_override("server.openapi_port", port as i64)?;
        }
        if let Some(port) = cli.web_port {
            builder = builder.set_override("server.web_port", port as i64)?;
        }
        if let Some(dir) = cli.data_dir {
            builder = builder.set_override("server.data_dir", dir)?;
        }
        if cli.no_manage_processes {
            builder = builder.set_override("manage_processes", false)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }

    #[must_use]
    pub fn data_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.server.data_dir)
    }

    #[must_use]
    pub fn tool_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.server.tool_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let cfg = AppConfig::load_from_args(vec!["tooldock"]).unwrap();
        assert_eq!(cfg.server.mcp_port, 3100);
        assert_eq!(cfg.mcp.server_name, "tooldock");
        assert!(cfg.manage_processes);
    }

    #[test]
    fn cli_flag_overrides_default_port() {
        let cfg = AppConfig::load_from_args(vec!["tooldock", "--mcp-port", "9999"]).unwrap();
        assert_eq!(cfg.server.mcp_port, 9999);
    }

    #[test]
    fn no_manage_processes_flag_disables_supervisor_management() {
        let cfg = AppConfig::load_from_args(vec!["tooldock", "--no-manage-processes"]).unwrap();
        assert!(!cfg.manage_processes);
    }
}
