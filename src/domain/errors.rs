//! Domain errors for the typebench engine.
//!
//! Errors are split by the layer that converts them into data: startup and
//! preparation failures become cell or package records, sampling failures become
//! package records, and only store and configuration errors surface as
//! run-level failures.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure to bring a checker process up to a usable state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartupError {
    #[error("Checker binary not found: {0}")]
    BinaryMissing(String),

    #[error("Checker binary is not executable: {0}")]
    NotExecutable(String),

    #[error("Failed to spawn checker process: {0}")]
    SpawnFailed(String),

    #[error("Initialize handshake did not complete within {}s", .0.as_secs_f64())]
    HandshakeTimeout(Duration),

    #[error("Initialize handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Checker not installed: {0}")]
    NotInstalled(String),
}

impl StartupError {
    /// Map a spawn error from the OS into the startup taxonomy.
    pub fn from_spawn(command: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::BinaryMissing(command.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::NotExecutable(command.to_string()),
            _ => Self::SpawnFailed(format!("{command}: {err}")),
        }
    }
}

/// Failure to draw samples from a package.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SamplingError {
    #[error("No eligible source files in package {0}")]
    NoEligibleFiles(String),

    #[error("Failed to scan package directory {path}: {message}")]
    ScanFailed { path: PathBuf, message: String },
}

/// Failure to materialize a package on disk.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreparationError {
    #[error("No source location for package {0}")]
    MissingSource(String),

    #[error("Fetching {url} failed: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Fetching {url} timed out after {}s", .timeout.as_secs())]
    FetchTimeout { url: String, timeout: Duration },

    #[error("Package directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error(transparent)]
    Sampling(#[from] SamplingError),
}

/// Result store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No report stored for {0}")]
    NotFound(String),

    #[error("Report for {date} does not match its recorded digest")]
    DigestMismatch { date: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Run-level errors that abort a benchmark.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("No checkers selected")]
    NoCheckers,

    #[error("None of the selected checkers is installed: {0}")]
    NoCheckersAvailable(String),

    #[error("Unknown checker: {0}")]
    UnknownChecker(String),

    #[error("No packages to benchmark")]
    NoPackages,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Aggregator task failed: {0}")]
    CollectorFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_not_found_maps_to_binary_missing() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        assert_eq!(
            StartupError::from_spawn("pyright-langserver", &err),
            StartupError::BinaryMissing("pyright-langserver".to_string())
        );
    }

    #[test]
    fn spawn_permission_denied_maps_to_not_executable() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            StartupError::from_spawn("ty", &err),
            StartupError::NotExecutable(_)
        ));
    }

    #[test]
    fn handshake_timeout_message_reports_seconds() {
        let err = StartupError::HandshakeTimeout(Duration::from_millis(1500));
        assert_eq!(
            err.to_string(),
            "Initialize handshake did not complete within 1.5s"
        );
    }
}
