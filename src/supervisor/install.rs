//! Installation recipes (spec §4.3.1): turns an `install_method` and its
//! parameters into a runnable command recipe plus a `stopped` record.

use std::path::{Path, PathBuf};

use crate::error::{Result, ToolDockError};
use crate::persistence::record::{ExternalServerRecord, PackageRegistryType};

#[derive(Debug, Clone)]
pub enum InstallRequest {
    Package {
        registry_type: PackageRegistryType,
        identifier: String,
        version: Option<String>,
    },
    Repo {
        repo_url: String,
        entrypoint: Option<String>,
    },
    Manual {
        command: String,
        args: Vec<String>,
        env: std::collections::HashMap<String, String>,
    },
    Http {
        server_url: String,
    },
}

/// Advisory pre-install safety check (spec §4.3.1). This reference
/// implementation has no external risk-scoring feed to call, so it reports
/// the conservative default (never blocked) and leaves the hook in place
/// for an operator to wire up a real scanner.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SafetyReport {
    pub risk_level: &'static str,
    pub risk_score: f32,
    pub blocked: bool,
}

pub fn safety_check(_request: &InstallRequest) -> SafetyReport {
    SafetyReport {
        risk_level: "low",
        risk_score: 0.0,
        blocked: false,
    }
}

/// Materializes a recipe for `request` under `<data_dir>/external/servers/<namespace>`.
/// Returns the populated fields the caller should merge into a fresh
/// `ExternalServerRecord` before persisting it with status `stopped`.
pub async fn install(
    data_dir: &Path,
    namespace: &str,
    request: &InstallRequest,
) -> Result<InstallOutcome> {
    match request {
        InstallRequest::Package {
            registry_type,
            identifier,
            version,
        } => install_package(*registry_type, identifier, version.as_deref()).await,
        InstallRequest::Repo { repo_url, entrypoint } => {
            install_repo(data_dir, namespace, repo_url, entrypoint.as_deref()).await
        }
        InstallRequest::Manual { command, args, env } => Ok(InstallOutcome {
            startup_command: command.clone(),
            command_args: args.clone(),
            env_vars: env.clone(),
            entrypoint: None,
            venv_path: None,
            server_url: None,
        }),
        InstallRequest::Http { server_url } => Ok(InstallOutcome {
            startup_command: String::new(),
            command_args: vec![],
            env_vars: std::collections::HashMap::new(),
            entrypoint: None,
            venv_path: None,
            server_url: Some(server_url.clone()),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub startup_command: String,
    pub command_args: Vec<String>,
    pub env_vars: std::collections::HashMap<String, String>,
    pub entrypoint: Option<String>,
    pub venv_path: Option<String>,
    pub server_url: Option<String>,
}

async fn install_package(
    registry_type: PackageRegistryType,
    identifier: &str,
    version: Option<&str>,
) -> Result<InstallOutcome> {
    match registry_type {
        PackageRegistryType::Pypi => {
            let ident = match version {
                Some(v) => format!("{identifier}=={v}"),
                None => identifier.to_owned(),
            };
            Ok(InstallOutcome {
                startup_command: "uvx".to_owned(),
                command_args: vec![ident],
                env_vars: std::collections::HashMap::new(),
                entrypoint: None,
                venv_path: None,
                server_url: None,
            })
        }
        PackageRegistryType::Npm => {
            probe_npm_package(identifier)
                .await
                .map_err(|_| ToolDockError::PackageNotFound(identifier.to_owned()))?;
            let ident = match version {
                Some(v) => format!("{identifier}@{v}"),
                None => identifier.to_owned(),
            };
            Ok(InstallOutcome {
                startup_command: "npx".to_owned(),
                command_args: vec!["-y".to_owned(), ident],
                env_vars: std::collections::HashMap::new(),
                entrypoint: None,
                venv_path: None,
                server_url: None,
            })
        }
        PackageRegistryType::Oci => Ok(InstallOutcome {
            startup_command: "docker".to_owned(),
            command_args: vec!["run".to_owned(), "-i".to_owned(), "--rm".to_owned(), identifier.to_owned()],
            env_vars: std::collections::HashMap::new(),
            entrypoint: None,
            venv_path: None,
            server_url: None,
        }),
    }
}

async fn probe_npm_package(identifier: &str) -> anyhow::Result<()> {
    let url = format!("https://registry.npmjs.org/{identifier}");
    let resp = reqwest::Client::new()
        .get(&url)
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await?;
    if resp.status().is_success() {
        Ok(())
    } else {
        anyhow::bail!("package '{identifier}' not found on npm")
    }
}

async fn install_repo(
    data_dir: &Path,
    namespace: &str,
    repo_url: &str,
    entrypoint: Option<&str>,
) -> Result<InstallOutcome> {
    let dest = data_dir.join("external").join("servers").join(namespace).join("repo");
    std::fs::create_dir_all(dest.parent().expect("has parent"))
        .map_err(|e| ToolDockError::InstallFailed(e.to_string()))?;

    let status = tokio::process::Command::new("git")
        .args(["clone", "--depth", "1", repo_url, dest.to_str().unwrap_or_default()])
        .status()
        .await
        .map_err(|e| ToolDockError::InstallFailed(e.to_string()))?;
    if !status.success() {
        return Err(ToolDockError::InstallFailed(format!(
            "git clone of {repo_url} failed"
        )));
    }

    let resolved_entrypoint = match entrypoint {
        Some(e) => e.to_owned(),
        None => auto_detect_entrypoint(&dest)
            .ok_or_else(|| ToolDockError::InstallFailed("no entrypoint found in repo".to_owned()))?,
    };

    let requirements = dest.join("requirements.txt");
    if requirements.exists() {
        let venv_path = data_dir.join("venvs").join(namespace);
        std::fs::create_dir_all(&venv_path).map_err(|e| ToolDockError::InstallFailed(e.to_string()))?;
        let _ = tokio::process::Command::new("python3")
            .args(["-m", "venv", venv_path.to_str().unwrap_or_default()])
            .status()
            .await;
        let pip = venv_path.join("bin").join("pip");
        let _ = tokio::process::Command::new(pip)
            .args(["install", "-r", requirements.to_str().unwrap_or_default()])
            .status()
            .await;
        return Ok(InstallOutcome {
            startup_command: "python".to_owned(),
            command_args: vec![resolved_entrypoint.clone()],
            env_vars: std::collections::HashMap::new(),
            entrypoint: Some(resolved_entrypoint),
            venv_path: Some(venv_path.display().to_string()),
            server_url: None,
        });
    }

    Ok(InstallOutcome {
        startup_command: "python".to_owned(),
        command_args: vec![resolved_entrypoint.clone()],
        env_vars: std::collections::HashMap::new(),
        entrypoint: Some(resolved_entrypoint),
        venv_path: None,
        server_url: None,
    })
}

fn auto_detect_entrypoint(dir: &Path) -> Option<String> {
    let read_dir = std::fs::read_dir(dir).ok()?;
    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        if let Ok(contents) = std::fs::read_to_string(&path) {
            if contents.contains("__main__") {
                return path.to_str().map(str::to_owned);
            }
        }
    }
    None
}

/// Confines a deletion target to be a descendant of `base`; refuses
/// otherwise (spec §4.3.2 `delete`).
pub fn confine_to_base(base: &Path, target: &Path) -> Result<PathBuf> {
    let canonical_base = base
        .canonicalize()
        .map_err(|e| ToolDockError::Internal(e.into()))?;
    let canonical_target = target
        .canonicalize()
        .unwrap_or_else(|_| target.to_path_buf());
    if !canonical_target.starts_with(&canonical_base) {
        return Err(ToolDockError::InstallFailed(format!(
            "refusing to delete path outside base: {}",
            target.display()
        )));
    }
    Ok(canonical_target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confine_rejects_escaping_path() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("external").join("servers").join("ns");
        std::fs::create_dir_all(&base).unwrap();
        let escaping = dir.path().join("..").join("etc");
        assert!(confine_to_base(&base, &escaping).is_err());
    }

    #[test]
    fn confine_accepts_descendant_path() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("external").join("servers").join("ns");
        std::fs::create_dir_all(&base).unwrap();
        let child = base.join("repo");
        std::fs::create_dir_all(&child).unwrap();
        assert!(confine_to_base(&base, &child).is_ok());
    }
}
