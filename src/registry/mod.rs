//! Namespace-partitioned tool catalog (spec §4.1).
//!
//! Reads are lock-free against other reads; mutations (register, unregister,
//! hot-reload) take a short exclusive lock and update the name map, the
//! namespace index, and the reverse index atomically.

mod call_result;
mod validate;

pub use call_result::{CallContent, ToolCallResult};
pub use validate::validate_arguments;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, ToolDockError};

/// Handle a supervisor-owned proxy exposes to the registry. The registry
/// never owns a proxy's lifetime, only this weak-referenceable lookup.
#[async_trait]
pub trait ToolProxy: Send + Sync {
    async fn call_tool(&self, original_name: &str, arguments: Value) -> ToolCallResult;
}

/// In-process handler for a native tool.
#[async_trait]
pub trait NativeHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> anyhow::Result<Value>;
}

enum Execution {
    Native(Arc<dyn NativeHandler>),
    External {
        server_id: String,
        original_name: String,
        proxy: Weak<dyn ToolProxy>,
    },
}

struct Entry {
    name: String,
    description: String,
    input_schema: Value,
    namespace: String,
    execution: Execution,
}

impl Entry {
    fn is_external(&self) -> bool {
        matches!(self.execution, Execution::External { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    pub namespace: String,
    pub kind: &'static str,
}

#[derive(Debug, Default, Serialize)]
pub struct RegistryStats {
    pub native: usize,
    pub external: usize,
    pub total: usize,
    pub namespaces: usize,
    pub per_namespace: HashMap<String, usize>,
}

struct Inner {
    /// `(namespace, tool_name) -> entry`, keyed by the unprefixed name.
    entries: HashMap<(String, String), Entry>,
    /// `namespace -> {tool_name}` reverse index.
    by_namespace: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_namespace: HashMap::new(),
        }
    }
}

/// Namespace → tool-name catalog, safe for concurrent lookup during
/// mutation-free periods.
pub struct ToolRegistry {
    inner: RwLock<Inner>,
    tool_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(tool_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
            tool_timeout,
        }
    }

    pub fn register(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
        input_schema: Value,
        handler: Arc<dyn NativeHandler>,
    ) -> Result<()> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let key = (namespace.to_owned(), name.to_owned());
        if inner.entries.contains_key(&key) {
            return Err(ToolDockError::DuplicateTool(
                name.to_owned(),
                namespace.to_owned(),
            ));
        }
        inner.entries.insert(
            key,
            Entry {
                name: name.to_owned(),
                description: description.to_owned(),
                input_schema,
                namespace: namespace.to_owned(),
                execution: Execution::Native(handler),
            },
        );
        inner
            .by_namespace
            .entry(namespace.to_owned())
            .or_default()
            .insert(name.to_owned());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_external(
        &self,
        namespace: &str,
        original_name: &str,
        description: &str,
        input_schema: Value,
        server_id: &str,
        proxy: Weak<dyn ToolProxy>,
    ) -> Result<()> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let key = (namespace.to_owned(), original_name.to_owned());
        if inner.entries.contains_key(&key) {
            return Err(ToolDockError::DuplicateTool(
                original_name.to_owned(),
                namespace.to_owned(),
            ));
        }
        inner.entries.insert(
            key,
            Entry {
                name: original_name.to_owned(),
                description: description.to_owned(),
                input_schema,
                namespace: namespace.to_owned(),
                execution: Execution::External {
                    server_id: server_id.to_owned(),
                    original_name: original_name.to_owned(),
                    proxy,
                },
            },
        );
        inner
            .by_namespace
            .entry(namespace.to_owned())
            .or_default()
            .insert(original_name.to_owned());
        Ok(())
    }

    /// Removes every entry under `namespace` whose unprefixed name is in
    /// `names`. Used on namespace unregistration / reload.
    pub fn unregister(&self, namespace: &str, name: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.entries.remove(&(namespace.to_owned(), name.to_owned()));
        if let Some(set) = inner.by_namespace.get_mut(namespace) {
            set.remove(name);
            if set.is_empty() {
                inner.by_namespace.remove(namespace);
            }
        }
    }

    /// Removes every entry belonging to `server_id` (external namespace
    /// unpublish on supervisor stop/crash).
    pub fn unregister_server(&self, server_id: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let doomed: Vec<(String, String)> = inner
            .entries
            .iter()
            .filter_map(|(key, entry)| match &entry.execution {
                Execution::External { server_id: sid, .. } if sid == server_id => {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect();
        for key in doomed {
            inner.entries.remove(&key);
            if let Some(set) = inner.by_namespace.get_mut(&key.0) {
                set.remove(&key.1);
                if set.is_empty() {
                    inner.by_namespace.remove(&key.0);
                }
            }
        }
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .by_namespace
            .contains_key(namespace)
    }

    pub fn tool_in_namespace(&self, namespace: &str, name: &str) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .entries
            .contains_key(&(namespace.to_owned(), name.to_owned()))
    }

    pub fn get_namespace(&self, name: &str) -> Option<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .entries
            .keys()
            .find(|(_, n)| n == name)
            .map(|(ns, _)| ns.clone())
    }

    /// Whether `namespace` currently holds any external entries, used by the
    /// "native or external, never both" invariant at publication time.
    pub fn namespace_is_external(&self, namespace: &str) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .by_namespace
            .get(namespace)
            .and_then(|names| names.iter().next())
            .and_then(|name| inner.entries.get(&(namespace.to_owned(), name.clone())))
            .map(Entry::is_external)
            .unwrap_or(false)
    }

    pub fn list_for_namespace(&self, namespace: &str) -> Vec<ToolDescriptor> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut out: Vec<_> = inner
            .entries
            .values()
            .filter(|e| e.namespace == namespace)
            .map(Self::to_descriptor)
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn list_all(&self) -> Vec<ToolDescriptor> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut out: Vec<_> = inner.entries.values().map(Self::to_descriptor).collect();
        out.sort_by(|a, b| (a.namespace.as_str(), a.name.as_str()).cmp(&(b.namespace.as_str(), b.name.as_str())));
        out
    }

    fn to_descriptor(entry: &Entry) -> ToolDescriptor {
        ToolDescriptor {
            name: entry.name.clone(),
            description: entry.description.clone(),
            input_schema: entry.input_schema.clone(),
            namespace: entry.namespace.clone(),
            kind: if entry.is_external() { "external" } else { "native" },
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut stats = RegistryStats {
            namespaces: inner.by_namespace.len(),
            ..Default::default()
        };
        for entry in inner.entries.values() {
            if entry.is_external() {
                stats.external += 1;
            } else {
                stats.native += 1;
            }
            *stats.per_namespace.entry(entry.namespace.clone()).or_insert(0) += 1;
        }
        stats.total = stats.native + stats.external;
        stats
    }

    /// Resolves `name` within an optional namespace scope, applying the
    /// tie-break order from SPEC_FULL §11: literal, then `*__name` suffix
    /// stripped at the last `__`, then a unique `*:name` suffix match.
    fn resolve(&self, name: &str, scope: Option<&str>) -> Option<(String, String)> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let matches_scope = |ns: &str| scope.is_none_or(|s| s == ns);

        if let Some((ns, _)) = inner
            .entries
            .keys()
            .find(|(ns, n)| n == name && matches_scope(ns))
        {
            return Some((ns.clone(), name.to_owned()));
        }

        if let Some(pos) = name.rfind("__") {
            let stripped = &name[pos + 2..];
            if let Some((ns, _)) = inner
                .entries
                .keys()
                .find(|(ns, n)| n == stripped && matches_scope(ns))
            {
                return Some((ns.clone(), stripped.to_owned()));
            }
        }

        let suffix = format!(":{name}");
        let mut hits: Vec<(String, String)> = inner
            .entries
            .keys()
            .filter(|(ns, n)| matches_scope(ns) && format!("{ns}:{n}").ends_with(&suffix))
            .cloned()
            .collect();
        if hits.len() == 1 {
            return hits.pop();
        }
        None
    }

    /// Validates `arguments` against the entry's schema and invokes its
    /// handler, racing it against `TOOL_TIMEOUT_SECONDS`.
    pub async fn call(&self, name: &str, arguments: Value, scope: Option<&str>) -> ToolCallResult {
        let resolved = {
            let inner_scope = scope;
            self.resolve(name, inner_scope)
        };
        let Some((namespace, resolved_name)) = resolved else {
            return ToolCallResult::error(format!("Tool '{name}' not found"));
        };

        let (schema, execution_kind) = {
            let inner = self.inner.read().expect("registry lock poisoned");
            let Some(entry) = inner.entries.get(&(namespace.clone(), resolved_name.clone())) else {
                return ToolCallResult::error(format!("Tool '{name}' not found"));
            };
            (entry.input_schema.clone(), clone_execution(&entry.execution))
        };

        if let Err(message) = validate::validate_arguments(&schema, &arguments) {
            return ToolCallResult::error(message);
        }

        let fut = async move {
            match execution_kind {
                ExecutionClone::Native(handler) => match handler.call(arguments).await {
                    Ok(value) => ToolCallResult::from_value(value),
                    Err(err) => ToolCallResult::error(err.to_string()),
                },
                ExecutionClone::External { original_name, proxy, .. } => {
                    let Some(proxy) = proxy.upgrade() else {
                        return ToolCallResult::error("server is no longer connected".to_owned());
                    };
                    proxy.call_tool(&original_name, arguments).await
                }
            }
        };

        match tokio::time::timeout(self.tool_timeout, fut).await {
            Ok(result) => result,
            Err(_) => ToolCallResult::error("tool call timed out".to_owned()),
        }
    }

    /// Looks up a tool by name without executing it; used by the namespace-
    /// scoped `tools/call` guard that must reject cross-namespace calls with
    /// a specific message rather than a generic not-found.
    pub fn scoped_lookup(&self, name: &str, namespace: &str) -> bool {
        self.resolve(name, Some(namespace)).is_some()
    }

    /// Resolves and returns the full descriptor for `name` within an
    /// optional namespace scope; used by the REST frontend to validate a
    /// request body against the tool's schema before invoking it.
    pub fn describe(&self, name: &str, scope: Option<&str>) -> Option<ToolDescriptor> {
        let (namespace, resolved_name) = self.resolve(name, scope)?;
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.entries.get(&(namespace, resolved_name)).map(Self::to_descriptor)
    }

    /// Resolves `name` with no namespace restriction, returning the owning
    /// namespace. Used by namespace-scoped `tools/call` handlers to produce
    /// the specific "not found in namespace 'ns'" message (SPEC_FULL §4.5.4)
    /// rather than a generic not-found when the tool exists elsewhere.
    pub fn resolve_public(&self, name: &str) -> Option<(String, String)> {
        self.resolve(name, None)
    }
}

enum ExecutionClone {
    Native(Arc<dyn NativeHandler>),
    External {
        #[allow(dead_code)]
        server_id: String,
        original_name: String,
        proxy: Weak<dyn ToolProxy>,
    },
}

fn clone_execution(execution: &Execution) -> ExecutionClone {
    match execution {
        Execution::Native(handler) => ExecutionClone::Native(handler.clone()),
        Execution::External {
            server_id,
            original_name,
            proxy,
        } => ExecutionClone::External {
            server_id: server_id.clone(),
            original_name: original_name.clone(),
            proxy: proxy.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl NativeHandler for Echo {
        async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
            Ok(arguments)
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(Duration::from_secs(5))
    }

    #[test]
    fn duplicate_registration_rejected() {
        let reg = registry();
        let schema = json!({"type": "object", "properties": {}, "additionalProperties": false});
        reg.register("shared", "echo", "echoes", schema.clone(), Arc::new(Echo))
            .unwrap();
        let err = reg
            .register("shared", "echo", "echoes", schema, Arc::new(Echo))
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_tool");
    }

    #[tokio::test]
    async fn cross_namespace_call_not_found() {
        let reg = registry();
        let schema = json!({"type": "object", "properties": {}, "additionalProperties": false});
        reg.register("shared", "greet", "greets", schema, Arc::new(Echo))
            .unwrap();
        let result = reg.call("greet", json!({}), Some("team")).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn unregister_removes_empty_namespace() {
        let reg = registry();
        let schema = json!({"type": "object", "properties": {}, "additionalProperties": false});
        reg.register("shared", "echo", "echoes", schema, Arc::new(Echo))
            .unwrap();
        assert!(reg.has_namespace("shared"));
        reg.unregister("shared", "echo");
        assert!(!reg.has_namespace("shared"));
    }

    #[tokio::test]
    async fn name_resolution_tie_break_prefix_strip() {
        let reg = registry();
        let schema = json!({"type": "object", "properties": {}, "additionalProperties": false});
        reg.register("shared", "greet", "greets", schema, Arc::new(Echo))
            .unwrap();
        let resolved = reg.resolve("default__greet", None);
        assert_eq!(resolved, Some(("shared".to_owned(), "greet".to_owned())));
    }

    #[tokio::test]
    async fn name_resolution_tie_break_suffix_match() {
        let reg = registry();
        let schema = json!({"type": "object", "properties": {}, "additionalProperties": false});
        reg.register("shared", "greet", "greets", schema, Arc::new(Echo))
            .unwrap();
        let resolved = reg.resolve("shared:greet", None);
        assert_eq!(resolved, Some(("shared".to_owned(), "greet".to_owned())));
    }
}
