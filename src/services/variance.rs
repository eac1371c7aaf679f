//! Day-to-day variance of valid-definition rates across stored reports.
//!
//! Samples are redrawn every day, so the spread of `valid_pct` for one
//! (package, checker) pair measures how sensitive a checker is to which
//! symbols happen to be picked.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::stats::{self, SeriesStats};
use crate::domain::errors::StoreError;
use crate::domain::models::BenchmarkReport;
use crate::domain::ports::{ReportKey, ReportStore};

/// Spread of one (package, checker) series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceEntry {
    pub package: String,
    pub checker: String,
    #[serde(flatten)]
    pub stats: SeriesStats,
}

/// Averages of the per-package spreads of one checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerStability {
    pub checker: String,
    pub avg_cv_pct: f64,
    pub avg_stddev: f64,
    pub avg_range: f64,
    pub packages: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarianceReport {
    pub days: usize,
    /// Ordered by the package's mean CV, most variable first
    pub entries: Vec<VarianceEntry>,
    /// Ordered by mean CV, most stable first
    pub checkers: Vec<CheckerStability>,
}

impl VarianceReport {
    /// Entries whose CV exceeds `threshold_pct`, highest first.
    pub fn high_variance(&self, threshold_pct: f64) -> Vec<&VarianceEntry> {
        let mut high: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.stats.cv_pct > threshold_pct)
            .collect();
        high.sort_by(|a, b| b.stats.cv_pct.total_cmp(&a.stats.cv_pct));
        high
    }
}

/// `valid_pct` per (package, checker), one value per report where the
/// checker produced a measured result.
pub fn collect_series(reports: &[BenchmarkReport]) -> BTreeMap<(String, String), Vec<f64>> {
    let mut series: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    for report in reports {
        for result in &report.results {
            for (checker, metrics) in &result.metrics {
                if metrics.is_ok() {
                    series
                        .entry((result.package_name.clone(), checker.clone()))
                        .or_default()
                        .push(metrics.counts().valid_pct);
                }
            }
        }
    }
    series
}

/// Variance of every series with at least two days of data.
pub fn analyze(reports: &[BenchmarkReport]) -> VarianceReport {
    let mut entries: Vec<VarianceEntry> = collect_series(reports)
        .into_iter()
        .filter(|(_, values)| values.len() > 1)
        .filter_map(|((package, checker), values)| {
            stats::describe(&values).map(|stats| VarianceEntry {
                package,
                checker,
                stats,
            })
        })
        .collect();

    let mut package_cv: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for entry in &entries {
        package_cv
            .entry(entry.package.as_str())
            .or_default()
            .push(entry.stats.cv_pct);
    }
    let package_cv: BTreeMap<String, f64> = package_cv
        .into_iter()
        .map(|(package, cvs)| (package.to_string(), stats::mean(&cvs).unwrap_or(0.0)))
        .collect();

    let mut per_checker: BTreeMap<&str, Vec<&SeriesStats>> = BTreeMap::new();
    for entry in &entries {
        per_checker
            .entry(entry.checker.as_str())
            .or_default()
            .push(&entry.stats);
    }
    let mut checkers: Vec<CheckerStability> = per_checker
        .into_iter()
        .map(|(checker, series)| {
            let avg = |f: fn(&SeriesStats) -> f64| {
                stats::mean(&series.iter().map(|s| f(s)).collect::<Vec<_>>()).unwrap_or(0.0)
            };
            CheckerStability {
                checker: checker.to_string(),
                avg_cv_pct: avg(|s| s.cv_pct),
                avg_stddev: avg(|s| s.stddev),
                avg_range: avg(|s| s.range),
                packages: series.len(),
            }
        })
        .collect();
    checkers.sort_by(|a, b| {
        a.avg_cv_pct
            .total_cmp(&b.avg_cv_pct)
            .then_with(|| a.checker.cmp(&b.checker))
    });

    entries.sort_by(|a, b| {
        let cv_a = package_cv.get(&a.package).copied().unwrap_or(0.0);
        let cv_b = package_cv.get(&b.package).copied().unwrap_or(0.0);
        cv_b.total_cmp(&cv_a)
            .then_with(|| a.package.cmp(&b.package))
            .then_with(|| a.checker.cmp(&b.checker))
    });

    VarianceReport {
        days: reports.len(),
        entries,
        checkers,
    }
}

/// Load the most recent `last` stored reports (all when `None`) and analyze
/// them. Reports that fail to load are skipped with a warning.
pub async fn analyze_store(
    store: &dyn ReportStore,
    last: Option<usize>,
) -> Result<VarianceReport, StoreError> {
    let mut dates = store.list_dates().await?;
    if let Some(last) = last {
        let skip = dates.len().saturating_sub(last);
        dates.drain(..skip);
    }

    let mut reports = Vec::with_capacity(dates.len());
    for date in dates {
        match store.load(ReportKey::Date(date)).await {
            Ok(report) => reports.push(report),
            Err(e) => warn!(%date, error = %e, "skipping unreadable report"),
        }
    }
    debug!(days = reports.len(), "analyzing variance");
    Ok(analyze(&reports))
}
