//! Aggregate metrics derived from observations.
//!
//! The serialized shape is an open schema: every field the engine does not
//! know about is kept in `extra`, so reports written by other generations of
//! the benchmark (error-count/execution-time metrics) load without loss.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Latency statistics over the successful observations of one cell group, in
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    #[serde(default)]
    pub count: usize,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation (0 with fewer than two samples)
    #[serde(default)]
    pub stddev: f64,
    /// Coefficient of variation, stddev / mean (0 when mean is 0)
    #[serde(default)]
    pub cv: f64,
}

/// Stored latency block, where older reports write `null` for every
/// statistic of a pair without successful requests.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredLatency {
    count: Option<usize>,
    mean: Option<f64>,
    p50: Option<f64>,
    p95: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    stddev: Option<f64>,
    cv: Option<f64>,
}

impl StoredLatency {
    fn into_summary(self) -> Option<LatencySummary> {
        Some(LatencySummary {
            count: self.count.unwrap_or_default(),
            mean: self.mean?,
            p50: self.p50?,
            p95: self.p95?,
            min: self.min?,
            max: self.max?,
            stddev: self.stddev.unwrap_or_default(),
            cv: self.cv.unwrap_or_default(),
        })
    }
}

/// A latency block is absent unless all of mean, p50, p95, min and max are
/// present and numeric.
fn deserialize_latency<'de, D>(deserializer: D) -> Result<Option<LatencySummary>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let stored = Option::<StoredLatency>::deserialize(deserializer)?;
    Ok(stored.and_then(StoredLatency::into_summary))
}

/// Outcome counts for one (package, checker) pair.
///
/// Percentages are 0-100 over `runs`, the number of observations recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeCounts {
    pub runs: u32,
    pub ok_count: u32,
    pub ok_pct: f64,
    pub found_count: u32,
    pub found_pct: f64,
    pub valid_count: u32,
    pub valid_pct: f64,
    pub errors: u32,
    pub timeouts: u32,
    pub failed_cells: u32,
    pub interrupted_cells: u32,
}

/// Metrics for a (package, checker) pair with at least one successful
/// observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageCheckerMetrics {
    pub counts: OutcomeCounts,
    pub latency_ms: Option<LatencySummary>,
    pub extra: BTreeMap<String, Value>,
}

/// A (package, checker) pair with no successful observation.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerFailure {
    pub counts: OutcomeCounts,
    pub error_message: String,
    pub extra: BTreeMap<String, Value>,
}

/// Per-checker result for one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "CheckerMetricsRecord", from = "CheckerMetricsRecord")]
pub enum CheckerResult {
    Measured(PackageCheckerMetrics),
    Failed(CheckerFailure),
}

impl CheckerResult {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Measured(_))
    }

    pub const fn counts(&self) -> &OutcomeCounts {
        match self {
            Self::Measured(m) => &m.counts,
            Self::Failed(f) => &f.counts,
        }
    }

    pub fn latency(&self) -> Option<&LatencySummary> {
        match self {
            Self::Measured(m) => m.latency_ms.as_ref(),
            Self::Failed(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Measured(_) => None,
            Self::Failed(f) => Some(&f.error_message),
        }
    }
}

/// Serialized form of [`CheckerResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckerMetricsRecord {
    ok: bool,
    #[serde(flatten)]
    counts: OutcomeCounts,
    #[serde(default, deserialize_with = "deserialize_latency")]
    latency_ms: Option<LatencySummary>,
    #[serde(default, alias = "error", skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl From<CheckerResult> for CheckerMetricsRecord {
    fn from(result: CheckerResult) -> Self {
        match result {
            CheckerResult::Measured(m) => Self {
                ok: true,
                counts: m.counts,
                latency_ms: m.latency_ms,
                error_message: None,
                extra: m.extra,
            },
            CheckerResult::Failed(f) => Self {
                ok: false,
                counts: f.counts,
                latency_ms: None,
                error_message: Some(f.error_message),
                extra: f.extra,
            },
        }
    }
}

impl From<CheckerMetricsRecord> for CheckerResult {
    fn from(record: CheckerMetricsRecord) -> Self {
        if record.ok {
            Self::Measured(PackageCheckerMetrics {
                counts: record.counts,
                latency_ms: record.latency_ms,
                extra: record.extra,
            })
        } else {
            Self::Failed(CheckerFailure {
                counts: record.counts,
                error_message: record
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string()),
                extra: record.extra,
            })
        }
    }
}

/// Cross-package summary for one checker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunAggregate {
    /// At least one package produced a successful measurement
    pub ok: bool,
    pub packages_tested: u32,
    pub packages_failed: u32,
    pub total_runs: u32,
    pub total_ok: u32,
    pub total_found: u32,
    pub total_valid: u32,
    pub total_errors: u32,
    /// Successful observations across tested packages
    pub latency_sample_count: u32,
    /// Simple mean of the per-package mean latencies
    pub avg_latency_ms: Option<f64>,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    /// total_valid / total_runs, as a percentage
    pub success_rate: f64,
    /// total_ok / total_runs, as a percentage
    pub ok_rate: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
