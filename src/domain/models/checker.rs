//! Checker definitions and the resolved checker table.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire protocol spoken by a checker process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolDialect {
    /// Language Server Protocol over stdio.
    #[default]
    Lsp,
}

/// The kind of request issued for each sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// `textDocument/definition`
    #[default]
    Definition,
    /// `textDocument/diagnostic` (pull diagnostics)
    Diagnostics,
}

impl RequestKind {
    /// LSP method name for this request kind.
    pub const fn method(self) -> &'static str {
        match self {
            Self::Definition => "textDocument/definition",
            Self::Diagnostics => "textDocument/diagnostic",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definition => write!(f, "definition"),
            Self::Diagnostics => write!(f, "diagnostics"),
        }
    }
}

/// Static configuration of one checker, as read from config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CheckerConfig {
    /// Short key used in reports (e.g. `pyright`)
    pub key: String,

    /// Human readable name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Executable to launch
    pub command: String,

    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,

    /// Protocol dialect
    #[serde(default)]
    pub dialect: ProtocolDialect,

    /// Arguments used to query the installed version
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,

    /// Executable used for the version query, defaults to `command`
    #[serde(default)]
    pub version_command: Option<String>,

    /// Payload sent through `workspace/didChangeConfiguration` after initialize
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

impl CheckerConfig {
    /// Create a checker configuration with a command line.
    pub fn new(key: impl Into<String>, command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            key: key.into(),
            display_name: None,
            command: command.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            dialect: ProtocolDialect::Lsp,
            version_args: default_version_args(),
            version_command: None,
            settings: None,
        }
    }

    #[must_use]
    pub fn with_version_command(mut self, command: impl Into<String>) -> Self {
        self.version_command = Some(command.into());
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Built-in table of the checkers typebench knows how to launch.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("pyright", "pyright-langserver", &["--stdio"])
                .with_version_command("pyright")
                .with_settings(serde_json::json!({
                    "python": {
                        "analysis": {
                            "indexing": false,
                            "autoSearchPaths": false,
                            "useLibraryCodeForTypes": false
                        }
                    }
                })),
            Self::new("pyrefly", "pyrefly", &["lsp", "--indexing-mode", "none"]),
            Self::new("ty", "ty", &["server"]),
            Self::new("zuban", "zubanls", &[]).with_version_command("zuban"),
        ]
    }
}

/// Whether a checker could be resolved on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Availability {
    Installed,
    NotInstalled(String),
}

/// A checker resolved once at startup: configuration plus installed version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checker {
    pub config: CheckerConfig,
    pub version: String,
    pub availability: Availability,
}

impl Checker {
    /// A checker assumed installed, with a known version string.
    pub fn installed(config: CheckerConfig, version: impl Into<String>) -> Self {
        Self {
            config,
            version: version.into(),
            availability: Availability::Installed,
        }
    }

    /// A checker that could not be resolved.
    pub fn unavailable(config: CheckerConfig, reason: impl Into<String>) -> Self {
        Self {
            config,
            version: "not installed".to_string(),
            availability: Availability::NotInstalled(reason.into()),
        }
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn display_name(&self) -> &str {
        self.config
            .display_name
            .as_deref()
            .unwrap_or(&self.config.key)
    }

    pub const fn is_available(&self) -> bool {
        matches!(self.availability, Availability::Installed)
    }
}

/// Explicit, ordered table of checkers for one run.
///
/// Passed into the scheduler at construction; there is no process-wide
/// registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckerTable {
    checkers: Vec<Checker>,
}

impl CheckerTable {
    pub fn new(checkers: Vec<Checker>) -> Self {
        Self { checkers }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checker> {
        self.checkers.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Checker> {
        self.checkers.iter().find(|c| c.key() == key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.checkers.iter().map(|c| c.key().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Version string per checker key.
    pub fn versions(&self) -> BTreeMap<String, String> {
        self.checkers
            .iter()
            .map(|c| (c.key().to_string(), c.version.clone()))
            .collect()
    }

    /// Restrict the table to a subset of keys, keeping table order.
    ///
    /// Returns the first unknown key as an error.
    pub fn select(&self, keys: &[String]) -> Result<Self, String> {
        if let Some(unknown) = keys.iter().find(|k| self.get(k).is_none()) {
            return Err(unknown.clone());
        }
        Ok(Self {
            checkers: self
                .checkers
                .iter()
                .filter(|c| keys.iter().any(|k| k == c.key()))
                .cloned()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CheckerTable {
        CheckerTable::new(
            CheckerConfig::defaults()
                .into_iter()
                .map(|c| Checker::installed(c, "1.0.0"))
                .collect(),
        )
    }

    #[test]
    fn defaults_cover_known_checkers() {
        let keys: Vec<_> = CheckerConfig::defaults().into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["pyright", "pyrefly", "ty", "zuban"]);
    }

    #[test]
    fn select_keeps_table_order() {
        let selected = table()
            .select(&["ty".to_string(), "pyright".to_string()])
            .unwrap();
        assert_eq!(selected.keys(), vec!["pyright", "ty"]);
    }

    #[test]
    fn select_rejects_unknown_key() {
        let err = table().select(&["mypy".to_string()]).unwrap_err();
        assert_eq!(err, "mypy");
    }

    #[test]
    fn unavailable_checker_reports_not_installed() {
        let checker = Checker::unavailable(CheckerConfig::new("ty", "ty", &["server"]), "missing");
        assert!(!checker.is_available());
        assert_eq!(checker.version, "not installed");
    }

    #[test]
    fn request_kind_methods() {
        assert_eq!(RequestKind::Definition.method(), "textDocument/definition");
        assert_eq!(RequestKind::Diagnostics.method(), "textDocument/diagnostic");
    }
}
