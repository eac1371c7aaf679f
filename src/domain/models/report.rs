//! The persisted benchmark report.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::checker::RequestKind;
use super::metrics::{CheckerResult, RunAggregate};
use super::observation::{CellRecord, Observation};

/// Current report schema version.
pub const SCHEMA_VERSION: u32 = 2;

const fn legacy_schema_version() -> u32 {
    1
}

/// Whether every scheduled cell ran to completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Complete,
    /// The budget or an operator interrupt stopped the run early
    Partial,
}

/// Results for one package across every checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageResult {
    pub package_name: String,

    #[serde(default)]
    pub github_url: Option<String>,

    #[serde(default)]
    pub ranking: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_inline_annotations: Option<bool>,

    /// Package-level failure (preparation, no eligible files). When set,
    /// `metrics` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub metrics: BTreeMap<String, CheckerResult>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PackageResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Raw observations and cell records backing the aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResults {
    pub observations: Vec<Observation>,
    pub cells: Vec<CellRecord>,
}

/// A complete benchmark run. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub run_id: Option<Uuid>,

    pub timestamp: DateTime<Utc>,

    pub date: NaiveDate,

    /// Date used to seed sample selection
    #[serde(default)]
    pub seed_date: Option<NaiveDate>,

    #[serde(default)]
    pub status: ReportStatus,

    /// Why the run stopped early, for partial reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    pub type_checkers: Vec<String>,

    #[serde(default)]
    pub type_checker_versions: BTreeMap<String, String>,

    #[serde(default)]
    pub configured_package_count: Option<usize>,

    pub package_count: usize,

    #[serde(default)]
    pub runs_per_package: Option<u32>,

    #[serde(default)]
    pub samples_per_run: Option<u32>,

    #[serde(default)]
    pub request_kind: Option<RequestKind>,

    #[serde(default)]
    pub aggregate: BTreeMap<String, RunAggregate>,

    #[serde(default)]
    pub results: Vec<PackageResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawResults>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BenchmarkReport {
    pub fn is_complete(&self) -> bool {
        self.status == ReportStatus::Complete
    }

    /// Results for a package, if present.
    pub fn package(&self, name: &str) -> Option<&PackageResult> {
        self.results.iter().find(|r| r.package_name == name)
    }

    /// File name of the dated artifact for this report.
    pub fn file_name(&self) -> String {
        dated_file_name(self.date)
    }
}

/// `benchmark_<YYYY-MM-DD>.json`
pub fn dated_file_name(date: NaiveDate) -> String {
    format!("benchmark_{}.json", date.format("%Y-%m-%d"))
}
