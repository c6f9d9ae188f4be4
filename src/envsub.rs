//! `${VAR}` environment-variable substitution (spec §4.4, §4.10).
//!
//! Applied in exactly two places per SPEC_FULL §11: building a subprocess's
//! environment map at connect time, and reading `external/config.yaml` back
//! from disk. An unresolved `${VAR}` (the variable is unset) becomes the
//! empty string rather than being left as a literal placeholder.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

pub fn expand(input: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

pub fn expand_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter().map(|(k, v)| (k.clone(), expand(v))).collect()
}

/// `true` if `value` is, verbatim, a single `${VAR}` placeholder — used by
/// the secret-masking pass to exempt indirections from masking even when
/// their key matches a secret-like pattern.
pub fn is_bare_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.starts_with("${") && trimmed.ends_with('}') && PLACEHOLDER_RE.find_iter(trimmed).count() == 1
        && PLACEHOLDER_RE.find(trimmed).is_some_and(|m| m.start() == 0 && m.end() == trimmed.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_var() {
        unsafe { std::env::set_var("TOOLDOCK_TEST_VAR", "value") };
        assert_eq!(expand("prefix-${TOOLDOCK_TEST_VAR}-suffix"), "prefix-value-suffix");
        unsafe { std::env::remove_var("TOOLDOCK_TEST_VAR") };
    }

    #[test]
    fn unresolved_becomes_empty() {
        unsafe { std::env::remove_var("TOOLDOCK_TEST_MISSING") };
        assert_eq!(expand("${TOOLDOCK_TEST_MISSING}"), "");
    }

    #[test]
    fn bare_placeholder_detection() {
        assert!(is_bare_placeholder("${MY_SECRET}"));
        assert!(!is_bare_placeholder("prefix-${MY_SECRET}"));
        assert!(!is_bare_placeholder("literal"));
    }
}
