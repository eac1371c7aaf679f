//! Result store port.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::errors::StoreError;
use crate::domain::models::BenchmarkReport;

/// Which stored report to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKey {
    Latest,
    Date(NaiveDate),
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Persistent storage for benchmark reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Write the dated artifact, then the `latest` alias, then the index.
    /// Returns the path of the dated artifact.
    async fn persist(&self, report: &BenchmarkReport) -> Result<PathBuf, StoreError>;

    /// Load a stored report. Missing reports are `StoreError::NotFound`.
    async fn load(&self, key: ReportKey) -> Result<BenchmarkReport, StoreError>;

    /// Dates with a stored report, ascending.
    async fn list_dates(&self) -> Result<Vec<NaiveDate>, StoreError>;
}
