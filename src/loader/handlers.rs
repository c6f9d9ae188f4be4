//! Built-in native tool handlers, looked up by the `handler` key in a tool
//! manifest (see [`super::resolve_handler`]).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::registry::NativeHandler;

pub fn lookup(key: &str) -> Option<Arc<dyn NativeHandler>> {
    match key {
        "echo" => Some(Arc::new(Echo)),
        "greet" => Some(Arc::new(Greet)),
        "add" => Some(Arc::new(Add)),
        _ => None,
    }
}

/// Returns its arguments verbatim.
struct Echo;

#[async_trait]
impl NativeHandler for Echo {
    async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
        Ok(arguments)
    }
}

/// `greet(name: string = "World") -> "Hello, {name}!"` — grounds spec §8
/// scenario 2 end to end.
struct Greet;

#[async_trait]
impl NativeHandler for Greet {
    async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
        let name = arguments
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("World");
        Ok(json!(format!("Hello, {name}!")))
    }
}

/// `add(a: number, b: number) -> a + b` — grounds spec §8 scenario 6
/// (REST schema-validation rejection) end to end.
struct Add;

#[async_trait]
impl NativeHandler for Add {
    async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
        let a = arguments.get("a").and_then(Value::as_f64).unwrap_or(0.0);
        let b = arguments.get("b").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(json!(a + b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn greet_defaults_to_world() {
        let result = Greet.call(json!({})).await.unwrap();
        assert_eq!(result, json!("Hello, World!"));
    }

    #[tokio::test]
    async fn greet_uses_supplied_name() {
        let result = Greet.call(json!({"name": "Alice"})).await.unwrap();
        assert_eq!(result, json!("Hello, Alice!"));
    }
}
