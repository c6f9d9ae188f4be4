//! Namespace identifier validation (spec §3.3 / §6.3).

use std::sync::LazyLock;

use regex::Regex;

/// Reserved words that can never be accepted as a user namespace because
/// they collide with static routing prefixes. Superset of the reference
/// implementation's narrower word list (see SPEC_FULL §11); the extra
/// entries are defensive reservations for admin routes.
pub const RESERVED: &[&str] = &[
    "api", "mcp", "openapi", "docs", "assets", "health", "tools", "static", "shared", "external",
    "config", "cache", "tmp", "temp",
];

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]{1,49}$").expect("valid regex"));

/// `true` if `name` is syntactically a valid namespace identifier,
/// independent of whether it's reserved.
pub fn is_syntactically_valid(name: &str) -> bool {
    NAMESPACE_RE.is_match(name)
}

/// `true` if `name` is a reserved word that must never be accepted as a
/// user namespace.
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Full validation: syntactically valid and not reserved.
pub fn validate(name: &str) -> Result<(), crate::error::ToolDockError> {
    if !is_syntactically_valid(name) {
        return Err(crate::error::ToolDockError::NamespaceInvalid(
            name.to_owned(),
        ));
    }
    if is_reserved(name) {
        return Err(crate::error::ToolDockError::NamespaceInvalid(
            name.to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_namespace() {
        assert!(validate("shared_tools").is_ok());
        assert!(validate("team-a").is_ok());
    }

    #[test]
    fn rejects_reserved_words() {
        for word in RESERVED {
            assert!(validate(word).is_err(), "{word} should be reserved");
        }
    }

    #[test]
    fn rejects_uppercase_and_leading_digit() {
        assert!(validate("Team").is_err());
        assert!(validate("1team").is_err());
    }

    #[test]
    fn rejects_too_short_and_too_long() {
        assert!(validate("a").is_err());
        let long = "a".repeat(60);
        assert!(validate(&long).is_err());
    }
}
