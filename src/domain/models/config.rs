use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::checker::{CheckerConfig, RequestKind};
use super::package::PackageSpec;

/// Main configuration structure for typebench
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Number of packages to benchmark from the package list
    #[serde(default = "default_package_count")]
    pub package_count: usize,

    /// Independent runs per (package, checker) pair
    #[serde(default = "default_runs_per_package")]
    pub runs_per_package: u32,

    /// Samples issued within each run
    #[serde(default = "default_samples_per_run")]
    pub samples_per_run: u32,

    /// Maximum number of cells executing at once (1-64)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Request issued for each sample
    #[serde(default)]
    pub request_kind: RequestKind,

    /// Checker keys to run; empty means every configured checker
    #[serde(default)]
    pub enabled_checkers: Vec<String>,

    /// Checker table
    #[serde(default = "CheckerConfig::defaults")]
    pub checkers: Vec<CheckerConfig>,

    /// Package list, in ranking order
    #[serde(default = "PackageSpec::fallback_list")]
    pub packages: Vec<PackageSpec>,

    /// JSON file with a package list, overrides `packages` when set
    #[serde(default)]
    pub packages_file: Option<PathBuf>,

    /// Directory packages are cloned into; a temporary directory when unset
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,

    /// Timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Run budget
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Sample selection tuning
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Result store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_package_count() -> usize {
    10
}

const fn default_runs_per_package() -> u32 {
    5
}

const fn default_samples_per_run() -> u32 {
    1
}

const fn default_max_concurrency() -> usize {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            package_count: default_package_count(),
            runs_per_package: default_runs_per_package(),
            samples_per_run: default_samples_per_run(),
            max_concurrency: default_max_concurrency(),
            request_kind: RequestKind::default(),
            enabled_checkers: vec![],
            checkers: CheckerConfig::defaults(),
            packages: PackageSpec::fallback_list(),
            packages_file: None,
            workspace_dir: None,
            timeouts: TimeoutConfig::default(),
            budget: BudgetConfig::default(),
            sampling: SamplingConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Timeouts applied to checker processes and package preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Process start plus initialize handshake
    #[serde(default = "default_startup_secs")]
    pub startup_secs: u64,

    /// A single protocol request
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,

    /// Wait after `exit` before killing the process group
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Fetching one package
    #[serde(default = "default_prepare_secs")]
    pub prepare_secs: u64,

    /// Version probe of one checker
    #[serde(default = "default_version_secs")]
    pub version_secs: u64,
}

const fn default_startup_secs() -> u64 {
    120
}

const fn default_request_secs() -> u64 {
    10
}

const fn default_shutdown_grace_secs() -> u64 {
    3
}

const fn default_prepare_secs() -> u64 {
    180
}

const fn default_version_secs() -> u64 {
    10
}

impl TimeoutConfig {
    pub const fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    pub const fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub const fn prepare(&self) -> Duration {
        Duration::from_secs(self.prepare_secs)
    }

    pub const fn version(&self) -> Duration {
        Duration::from_secs(self.version_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_secs: default_startup_secs(),
            request_secs: default_request_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            prepare_secs: default_prepare_secs(),
            version_secs: default_version_secs(),
        }
    }
}

/// Limits that stop submission of new cells
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    /// Wall-clock limit for the whole run
    #[serde(default)]
    pub max_wall_clock_secs: Option<u64>,

    /// Maximum number of cells submitted
    #[serde(default)]
    pub max_cells: Option<usize>,
}

impl BudgetConfig {
    pub fn max_wall_clock(&self) -> Option<Duration> {
        self.max_wall_clock_secs.map(Duration::from_secs)
    }
}

/// Sample selection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SamplingConfig {
    /// Files tried per sample before giving up
    #[serde(default = "default_max_file_tries")]
    pub max_file_tries: usize,

    /// Pause after `didOpen` before the first request on a file
    #[serde(default = "default_didopen_warmup_ms")]
    pub didopen_warmup_ms: u64,
}

const fn default_max_file_tries() -> usize {
    50
}

const fn default_didopen_warmup_ms() -> u64 {
    100
}

impl SamplingConfig {
    pub const fn didopen_warmup(&self) -> Duration {
        Duration::from_millis(self.didopen_warmup_ms)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_file_tries: default_max_file_tries(),
            didopen_warmup_ms: default_didopen_warmup_ms(),
        }
    }
}

/// Result store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Directory holding `benchmark_<date>.json`, `latest.json` and `index.json`
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Persist raw observations and cell records alongside the aggregates
    #[serde(default = "default_true")]
    pub include_raw: bool,

    /// Total time spent retrying a failed persist
    #[serde(default = "default_persist_max_elapsed_secs")]
    pub persist_max_elapsed_secs: u64,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

const fn default_true() -> bool {
    true
}

const fn default_persist_max_elapsed_secs() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            include_raw: true,
            persist_max_elapsed_secs: default_persist_max_elapsed_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation of log files: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.package_count, 10);
        assert_eq!(config.runs_per_package, 5);
        assert_eq!(config.samples_per_run, 1);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.timeouts.request(), Duration::from_secs(10));
        assert_eq!(config.timeouts.startup(), Duration::from_secs(120));
        assert_eq!(config.sampling.max_file_tries, 50);
        assert_eq!(config.checkers.len(), 4);
        assert_eq!(config.packages.len(), 10);
        assert!(config.store.include_raw);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str(
            "runs_per_package: 2\ntimeouts:\n  request_secs: 3\nenabled_checkers: [ty]\n",
        )
        .unwrap();
        assert_eq!(config.runs_per_package, 2);
        assert_eq!(config.timeouts.request_secs, 3);
        assert_eq!(config.timeouts.startup_secs, 120);
        assert_eq!(config.enabled_checkers, vec!["ty"]);
        assert_eq!(config.checkers.len(), 4);
    }
}
