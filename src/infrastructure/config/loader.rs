use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::domain::models::config::Config;
use crate::domain::models::PackageSpec;

/// Upper bound on `max_concurrency`
pub const MAX_CONCURRENCY: usize = 64;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrency: {0}. Must be between 1 and {MAX_CONCURRENCY}")]
    InvalidConcurrency(usize),

    #[error("Invalid runs_per_package: {0}. Must be at least 1")]
    InvalidRuns(u32),

    #[error("Invalid samples_per_run: {0}. Must be at least 1")]
    InvalidSamples(u32),

    #[error("Invalid timeout {name}: must be positive")]
    InvalidTimeout { name: &'static str },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Checker at position {0} has an empty key")]
    EmptyCheckerKey(usize),

    #[error("Checker '{0}' command cannot be empty")]
    EmptyCheckerCommand(String),

    #[error("Checker '{0}' is configured more than once")]
    DuplicateChecker(String),

    #[error("Enabled checker '{0}' is not in the checker table")]
    UnknownChecker(String),

    #[error("Failed to read package file {path}: {message}")]
    PackageFile { path: PathBuf, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Deserialize)]
struct PackageFile {
    #[serde(default)]
    packages: Vec<PackageFileEntry>,
}

#[derive(Debug, Deserialize)]
struct PackageFileEntry {
    name: String,
    #[serde(default)]
    github_url: Option<String>,
    #[serde(default)]
    local_path: Option<PathBuf>,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .typebench/config.yaml (project config)
    /// 3. .typebench/local.yaml (project local overrides, optional)
    /// 4. Environment variables (TYPEBENCH_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment(None)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment
    /// overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config: Config = Self::figment(Some(path))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(file: Option<&Path>) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = match file {
            Some(path) => figment.merge(Yaml::file(path)),
            None => figment
                .merge(Yaml::file(".typebench/config.yaml"))
                .merge(Yaml::file(".typebench/local.yaml")),
        };
        figment.merge(Env::prefixed("TYPEBENCH_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_concurrency == 0 || config.max_concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::InvalidConcurrency(config.max_concurrency));
        }
        if config.runs_per_package == 0 {
            return Err(ConfigError::InvalidRuns(config.runs_per_package));
        }
        if config.samples_per_run == 0 {
            return Err(ConfigError::InvalidSamples(config.samples_per_run));
        }

        let timeouts = [
            ("startup_secs", config.timeouts.startup_secs),
            ("request_secs", config.timeouts.request_secs),
            ("shutdown_grace_secs", config.timeouts.shutdown_grace_secs),
            ("prepare_secs", config.timeouts.prepare_secs),
            ("version_secs", config.timeouts.version_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::InvalidTimeout { name });
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let mut keys = HashSet::new();
        for (position, checker) in config.checkers.iter().enumerate() {
            if checker.key.trim().is_empty() {
                return Err(ConfigError::EmptyCheckerKey(position));
            }
            if checker.command.trim().is_empty() {
                return Err(ConfigError::EmptyCheckerCommand(checker.key.clone()));
            }
            if !keys.insert(checker.key.as_str()) {
                return Err(ConfigError::DuplicateChecker(checker.key.clone()));
            }
        }

        if let Some(unknown) = config
            .enabled_checkers
            .iter()
            .find(|key| !keys.contains(key.as_str()))
        {
            return Err(ConfigError::UnknownChecker(unknown.clone()));
        }

        Ok(())
    }

    /// Read a JSON package list of the form `{"packages": [{"name", "github_url"}]}`.
    ///
    /// Rankings follow file order. Entries with neither a URL nor a local path
    /// are skipped.
    pub fn load_package_file(path: &Path) -> Result<Vec<PackageSpec>, ConfigError> {
        let package_file_error = |message: String| ConfigError::PackageFile {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| package_file_error(e.to_string()))?;
        let file: PackageFile =
            serde_json::from_str(&text).map_err(|e| package_file_error(e.to_string()))?;

        let mut specs = Vec::with_capacity(file.packages.len());
        for (entry, ranking) in file.packages.into_iter().zip(1..) {
            if entry.github_url.is_none() && entry.local_path.is_none() {
                warn!(package = %entry.name, "no source location in package file, skipping");
                continue;
            }
            specs.push(PackageSpec {
                name: entry.name,
                github_url: entry.github_url,
                local_path: entry.local_path,
                ranking: Some(ranking),
            });
        }
        Ok(specs)
    }

    /// Package list for a run: the package file when configured and present,
    /// otherwise the configured list.
    pub fn resolve_packages(config: &Config) -> Result<Vec<PackageSpec>, ConfigError> {
        match &config.packages_file {
            Some(path) if path.exists() => Self::load_package_file(path),
            Some(path) => {
                warn!(path = %path.display(), "package file not found, using configured packages");
                Ok(config.packages.clone())
            }
            None => Ok(config.packages.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::domain::models::CheckerConfig;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
package_count: 3
runs_per_package: 2
max_concurrency: 8
request_kind: diagnostics
enabled_checkers: [ty, pyright]
timeouts:
  request_secs: 5
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.package_count, 3);
        assert_eq!(config.runs_per_package, 2);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.timeouts.request_secs, 5);
        assert_eq!(config.logging.format, "json");
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_concurrency_bounds() {
        for bad in [0, MAX_CONCURRENCY + 1] {
            let config = Config {
                max_concurrency: bad,
                ..Default::default()
            };
            assert!(matches!(
                ConfigLoader::validate(&config),
                Err(ConfigError::InvalidConcurrency(n)) if n == bad
            ));
        }
    }

    #[test]
    fn test_validate_zero_runs_and_samples() {
        let config = Config {
            runs_per_package: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRuns(0))
        ));

        let config = Config {
            samples_per_run: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidSamples(0))
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.timeouts.request_secs = 0;
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidTimeout { name }) => assert_eq!(name, "request_secs"),
            other => panic!("Expected InvalidTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_settings() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRotation(_))
        ));
    }

    #[test]
    fn test_validate_checker_table() {
        let mut config = Config::default();
        config.checkers.push(CheckerConfig::new("", "x", &[]));
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyCheckerKey(4))
        ));

        let mut config = Config::default();
        config.checkers.push(CheckerConfig::new("mypy", " ", &[]));
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyCheckerCommand(key)) if key == "mypy"
        ));

        let mut config = Config::default();
        config.checkers.push(CheckerConfig::new("ty", "ty", &["server"]));
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::DuplicateChecker(key)) if key == "ty"
        ));
    }

    #[test]
    fn test_validate_unknown_enabled_checker() {
        let config = Config {
            enabled_checkers: vec!["mypy".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownChecker(key)) if key == "mypy"
        ));
    }

    #[test]
    fn test_env_override() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "runs_per_package: 3\nlogging:\n  level: info").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("TYPEBENCH_RUNS_PER_PACKAGE", Some("7")),
                ("TYPEBENCH_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).unwrap();
                assert_eq!(config.runs_per_package, 7);
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "max_concurrency: 4\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "max_concurrency: 6\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.max_concurrency, 6, "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }

    #[test]
    fn test_load_package_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"packages": [
                {{"name": "requests", "github_url": "https://github.com/psf/requests"}},
                {{"name": "orphan"}},
                {{"name": "flask", "github_url": "https://github.com/pallets/flask", "has_py_typed": true}}
            ]}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let specs = ConfigLoader::load_package_file(file.path()).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "requests");
        assert_eq!(specs[0].ranking, Some(1));
        assert_eq!(specs[1].name, "flask");
        assert_eq!(specs[1].ranking, Some(3));
    }

    #[test]
    fn test_missing_package_file_falls_back() {
        let config = Config {
            packages_file: Some(PathBuf::from("/definitely/not/here.json")),
            ..Default::default()
        };
        let specs = ConfigLoader::resolve_packages(&config).unwrap();
        assert_eq!(specs.len(), config.packages.len());
    }
}
