//! Host environment variables forwarded into a sandbox.
//!
//! Nothing from the host is forwarded implicitly. Variables reach a sandbox
//! either by carrying a known prefix (`SANDBOX_ENV_API_KEY` becomes `API_KEY`)
//! or by being named on an explicit allow-list. Forwarded values are also
//! known secrets, so the overlay doubles as a redactor for log output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default prefix marking host variables meant for the sandbox.
pub const DEFAULT_ENV_PREFIX: &str = "SANDBOX_ENV_";

/// Variables to inject into a sandbox, keyed by their in-sandbox name.
///
/// An empty overlay is valid and means "inject nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvironmentOverlay {
    /// Creates an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps entries whose name starts with `prefix`, stripping the prefix.
    ///
    /// A variable named exactly `prefix` would map to an empty key and is
    /// skipped.
    pub fn from_prefixed<I, K, V>(vars: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let name = key.as_ref().strip_prefix(prefix)?;
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.into()))
            })
            .collect();
        Self { vars }
    }

    /// Captures the named host variables through `lookup`.
    ///
    /// Returns the overlay and the names that `lookup` could not resolve.
    pub fn from_allow_list<F>(names: &[String], lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut overlay = Self::new();
        let mut missing = Vec::new();

        for name in names {
            match lookup(name) {
                Some(value) => {
                    overlay.insert(name.clone(), value);
                }
                None => missing.push(name.clone()),
            }
        }

        (overlay, missing)
    }

    /// Adds or replaces a variable.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Merges `other` into this overlay; entries in `other` win.
    pub fn extend(&mut self, other: EnvironmentOverlay) {
        self.vars.extend(other.vars);
    }

    /// Returns the value forwarded under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Returns true if nothing will be forwarded.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Number of forwarded variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Forwarded variable names, without values.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Read-only view of the variables.
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Replaces every forwarded value in `text` with `[REDACTED:<name>]`.
    ///
    /// Longer values are replaced first so that a value containing another
    /// one is not partially leaked.
    pub fn redact(&self, text: &str) -> String {
        let mut secrets: Vec<(&String, &String)> =
            self.vars.iter().filter(|(_, v)| !v.is_empty()).collect();
        secrets.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut result = text.to_string();
        for (name, value) in secrets {
            result = result.replace(value.as_str(), &format!("[REDACTED:{}]", name));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Vec<(String, String)> {
        vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("SANDBOX_ENV_API_KEY".to_string(), "test-key-123".to_string()),
            (
                "SANDBOX_ENV_DATABASE_URL".to_string(),
                "postgresql://localhost".to_string(),
            ),
            ("HOME".to_string(), "/root".to_string()),
        ]
    }

    #[test]
    fn prefixed_vars_are_stripped_and_kept() {
        let overlay = EnvironmentOverlay::from_prefixed(host(), DEFAULT_ENV_PREFIX);

        assert_eq!(overlay.len(), 2);
        assert_eq!(overlay.get("API_KEY"), Some("test-key-123"));
        assert_eq!(overlay.get("DATABASE_URL"), Some("postgresql://localhost"));
        assert_eq!(overlay.get("PATH"), None);
    }

    #[test]
    fn no_matching_vars_yields_empty_overlay() {
        let overlay = EnvironmentOverlay::from_prefixed(
            vec![("HOME".to_string(), "/root".to_string())],
            DEFAULT_ENV_PREFIX,
        );
        assert!(overlay.is_empty());
    }

    #[test]
    fn bare_prefix_is_skipped() {
        let overlay = EnvironmentOverlay::from_prefixed(
            vec![("SANDBOX_ENV_".to_string(), "x".to_string())],
            DEFAULT_ENV_PREFIX,
        );
        assert!(overlay.is_empty());
    }

    #[test]
    fn allow_list_reports_missing_names() {
        let names = vec!["OPENAI_API_KEY".to_string(), "NOT_SET".to_string()];
        let (overlay, missing) = EnvironmentOverlay::from_allow_list(&names, |name| {
            (name == "OPENAI_API_KEY").then(|| "sk-abc".to_string())
        });

        assert_eq!(overlay.get("OPENAI_API_KEY"), Some("sk-abc"));
        assert_eq!(missing, vec!["NOT_SET".to_string()]);
    }

    #[test]
    fn redact_replaces_longest_value_first() {
        let mut overlay = EnvironmentOverlay::new();
        overlay.insert("SHORT", "abc");
        overlay.insert("LONG", "abc123");

        let redacted = overlay.redact("token abc123 and abc");

        assert_eq!(redacted, "token [REDACTED:LONG] and [REDACTED:SHORT]");
    }

    #[test]
    fn redact_ignores_empty_values() {
        let mut overlay = EnvironmentOverlay::new();
        overlay.insert("EMPTY", "");
        assert_eq!(overlay.redact("unchanged"), "unchanged");
    }

    #[test]
    fn overlay_serializes_as_plain_map() {
        let mut overlay = EnvironmentOverlay::new();
        overlay.insert("API_KEY", "v");
        assert_eq!(serde_json::to_string(&overlay).unwrap(), r#"{"API_KEY":"v"}"#);
    }
}
