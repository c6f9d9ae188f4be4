//! Durable record types (spec §3.4, §3.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMethod {
    Package,
    Repo,
    Manual,
    Http,
}

impl InstallMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Repo => "repo",
            Self::Manual => "manual",
            Self::Http => "http",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "package" => Some(Self::Package),
            "repo" => Some(Self::Repo),
            "manual" => Some(Self::Manual),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageRegistryType {
    Pypi,
    Npm,
    Oci,
}

impl PackageRegistryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pypi => "pypi",
            Self::Npm => "npm",
            Self::Oci => "oci",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pypi" => Some(Self::Pypi),
            "npm" => Some(Self::Npm),
            "oci" => Some(Self::Oci),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Stdio,
    Http,
}

impl TransportType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stdio" => Some(Self::Stdio),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

/// Persisted status. `starting` is deliberately absent: it is a transient
/// in-memory supervisor state (§4.3.2), never written to the durable row,
/// matching the ownership rule that the supervisor never caches long-lived
/// row handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Installing,
    Stopped,
    Running,
    Error,
}

impl ServerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "installing" => Self::Installing,
            "running" => Self::Running,
            "error" => Self::Error,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalServerRecord {
    pub id: String,
    pub namespace: String,
    pub server_name: String,
    pub version: Option<String>,
    pub install_method: InstallMethod,
    pub package_identifier: Option<String>,
    pub package_registry_type: Option<PackageRegistryType>,
    pub repo_url: Option<String>,
    pub entrypoint: Option<String>,
    pub startup_command: Option<String>,
    pub command_args: Vec<String>,
    pub env_vars: std::collections::HashMap<String, String>,
    pub config_file: Option<String>,
    pub transport_type: TransportType,
    pub server_url: Option<String>,
    pub port: Option<i32>,
    pub venv_path: Option<String>,
    pub status: ServerStatus,
    pub pid: Option<i32>,
    pub last_error: Option<String>,
    pub auto_start: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryCacheEntry {
    pub server_name: String,
    pub latest_version: Option<String>,
    pub metadata_json: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
