//! Directory-tree tool loader (spec §4.2).
//!
//! The reference implementation imports Python source files and calls a
//! `register_tools(registry)` hook inside each. A compiled language can't
//! import source at runtime, so SPEC_FULL §9 treats this as a behavioral
//! contract rather than a mechanism: native tools are declared as small JSON
//! manifests (`<tools_dir>/<namespace>/<file>.json`) naming a `handler` key
//! into a small compiled-in dispatch table, and "reload" becomes "re-read
//! the manifests and re-resolve the dispatch table" rather than a fresh
//! module import. Handler implementations live in [`handlers`].
//!
//! Filenames follow the same shape as the source spec's Python convention
//! (`^[a-zA-Z][a-zA-Z0-9_-]*\.json$`), with leading-`_` files ignored.

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::sync::atomic::{AtomicUsize, Ordering};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::registry::{NativeHandler, ToolRegistry};

pub mod handlers;

static MANIFEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*\.json$").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct ToolManifest {
    name: String,
    description: String,
    input_schema: Value,
    handler: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<(String, String)>,
}

/// Scans `<tools_dir>/<namespace>` non-recursively for manifest files and
/// registers each as a native tool. A malformed manifest is logged and
/// skipped; it never aborts loading of its siblings.
pub fn load_namespace(registry: &ToolRegistry, tools_dir: &Path, namespace: &str) -> LoadReport {
    let mut report = LoadReport::default();
    let dir = tools_dir.join(namespace);
    let Ok(read_dir) = std::fs::read_dir(&dir) else {
        tracing::debug!(namespace, path = %dir.display(), "no native tool directory to load");
        return report;
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        if filename.starts_with('_') || !MANIFEST_RE.is_match(filename) {
            continue;
        }

        match load_manifest(&path) {
            Ok(manifest) => match resolve_handler(&manifest.handler) {
                Some(handler) => {
                    match registry.register(
                        namespace,
                        &manifest.name,
                        &manifest.description,
                        manifest.input_schema,
                        handler,
                    ) {
                        Ok(()) => {
                            report.loaded += 1;
                            tracing::info!(namespace, tool = %manifest.name, "tool registered");
                        }
                        Err(err) => {
                            tracing::warn!(namespace, file = filename, error = %err, "failed to register tool");
                            report.skipped.push((filename.to_owned(), err.to_string()));
                        }
                    }
                }
                None => {
                    tracing::warn!(namespace, file = filename, handler = %manifest.handler, "unknown handler");
                    report
                        .skipped
                        .push((filename.to_owned(), format!("unknown handler '{}'", manifest.handler)));
                }
            },
            Err(err) => {
                tracing::warn!(namespace, file = filename, error = %err, "failed to parse tool manifest");
                report.skipped.push((filename.to_owned(), err));
            }
        }
    }

    report
}

fn load_manifest(path: &Path) -> Result<ToolManifest, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&contents).map_err(|e| e.to_string())
}

fn resolve_handler(key: &str) -> Option<Arc<dyn NativeHandler>> {
    handlers::lookup(key)
}

/// Non-recursive directory walk of `tools_dir`, yielding namespace names
/// that have at least one entry on disk (used by `reload_all`).
pub fn discover_namespaces(tools_dir: &Path) -> Vec<String> {
    let Ok(read_dir) = std::fs::read_dir(tools_dir) else {
        return Vec::new();
    };
    let mut namespaces: Vec<String> = read_dir
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| crate::namespace::validate(name).is_ok())
        .collect();
    namespaces.sort();
    namespaces
}

/// Monotonic generation counter invalidating any cached interpretation of a
/// namespace's manifests (spec §4.8 step 4). Manifests are re-read from
/// disk on every load, so this only needs to exist to satisfy the "fresh
/// read" contract for callers that might otherwise memoize by generation.
pub static RELOAD_GENERATION: AtomicUsize = AtomicUsize::new(0);

pub fn bump_generation() -> usize {
    RELOAD_GENERATION.fetch_add(1, Ordering::SeqCst) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn loads_valid_manifest_and_skips_broken_sibling() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ns_dir = dir.path().join("shared");
        std::fs::create_dir_all(&ns_dir).unwrap();
        std::fs::write(
            ns_dir.join("greet.json"),
            r#"{"name":"greet","description":"greets","input_schema":{"type":"object","properties":{"name":{"type":"string"}},"additionalProperties":false},"handler":"greet"}"#,
        )
        .unwrap();
        std::fs::write(ns_dir.join("broken.json"), "{ not json").unwrap();
        std::fs::write(ns_dir.join("_ignored.json"), "{}").unwrap();

        let registry = ToolRegistry::new(Duration::from_secs(5));
        let report = load_namespace(&registry, dir.path(), "shared");
        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(registry.tool_in_namespace("shared", "greet"));
    }
}
