//! Reduction of raw observations into per-package and run-wide metrics.
//!
//! The aggregator is owned by a single collector task. Every `record_*` call
//! is O(1) amortized, and latencies are accumulated as integer nanoseconds so
//! the reduction is exactly order independent: any interleaving of the same
//! records finalizes to the same report.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::stats;
use crate::domain::models::{
    BenchmarkReport, CellOutcome, CellRecord, CellStatus, CheckerFailure, CheckerResult,
    Observation, OutcomeCounts, PackageCheckerMetrics, PackageResult, RawResults, ReportStatus,
    RequestKind, RunAggregate, SCHEMA_VERSION,
};

/// Package attributes copied into the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMeta {
    pub name: String,
    pub github_url: Option<String>,
    pub ranking: Option<u32>,
    pub has_inline_annotations: Option<bool>,
}

/// Run-level facts the aggregator does not observe itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMeta {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub seed_date: NaiveDate,
    pub status: ReportStatus,
    pub stop_reason: Option<String>,
    /// Checker keys in configured order
    pub checkers: Vec<String>,
    pub versions: BTreeMap<String, String>,
    pub packages: Vec<PackageMeta>,
    pub configured_package_count: usize,
    pub runs_per_package: u32,
    pub samples_per_run: u32,
    pub request_kind: RequestKind,
    pub include_raw: bool,
}

#[derive(Debug, Default, Clone)]
struct PairAccumulator {
    runs: u32,
    ok: u32,
    found: u32,
    valid: u32,
    timeouts: u32,
    errors: u32,
    latencies_nanos: Vec<u64>,
    failed_cells: u32,
    interrupted_cells: u32,
    outcome_classes: BTreeMap<&'static str, u32>,
    cell_errors: BTreeMap<String, u32>,
}

impl PairAccumulator {
    fn record(&mut self, observation: &Observation) {
        self.runs += 1;
        let outcome = &observation.outcome;
        if outcome.is_ok() {
            self.ok += 1;
            self.latencies_nanos
                .push(u64::try_from(observation.latency.as_nanos()).unwrap_or(u64::MAX));
        } else {
            self.errors += 1;
            *self.outcome_classes.entry(outcome.class()).or_insert(0) += 1;
        }
        if outcome.is_found() {
            self.found += 1;
        }
        if outcome.is_valid() {
            self.valid += 1;
        }
        if outcome.is_timeout() {
            self.timeouts += 1;
        }
    }

    fn record_cell(&mut self, record: &CellRecord) {
        match record.status {
            CellStatus::Completed => {}
            CellStatus::Failed => {
                self.failed_cells += 1;
                if let Some(error) = &record.error {
                    *self.cell_errors.entry(error.clone()).or_insert(0) += 1;
                }
            }
            CellStatus::Interrupted => self.interrupted_cells += 1,
        }
    }

    fn counts(&self) -> OutcomeCounts {
        let pct = |n: u32| {
            if self.runs == 0 {
                0.0
            } else {
                f64::from(n) / f64::from(self.runs) * 100.0
            }
        };
        OutcomeCounts {
            runs: self.runs,
            ok_count: self.ok,
            ok_pct: pct(self.ok),
            found_count: self.found,
            found_pct: pct(self.found),
            valid_count: self.valid,
            valid_pct: pct(self.valid),
            errors: self.errors,
            timeouts: self.timeouts,
            failed_cells: self.failed_cells,
            interrupted_cells: self.interrupted_cells,
        }
    }

    fn failure_summary(&self) -> String {
        if self.runs > 0 {
            let classes = self
                .outcome_classes
                .iter()
                .map(|(class, n)| format!("{class}: {n}"))
                .collect::<Vec<_>>()
                .join(", ");
            return format!("all {} requests failed ({classes})", self.runs);
        }
        // Most frequent cell error, ties broken by message.
        if let Some((message, _)) = self
            .cell_errors
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        {
            return message.clone();
        }
        if self.interrupted_cells > 0 {
            return "interrupted before any request completed".to_string();
        }
        "no observations".to_string()
    }

    fn result(&self) -> CheckerResult {
        let counts = self.counts();
        match stats::summarize_nanos(&self.latencies_nanos) {
            Some(latency) => CheckerResult::Measured(PackageCheckerMetrics {
                counts,
                latency_ms: Some(latency),
                extra: BTreeMap::new(),
            }),
            None => CheckerResult::Failed(CheckerFailure {
                counts,
                error_message: self.failure_summary(),
                extra: BTreeMap::new(),
            }),
        }
    }
}

/// Accumulates observations, cell records and package errors.
#[derive(Debug, Default)]
pub struct Aggregator {
    pairs: HashMap<(String, String), PairAccumulator>,
    package_errors: HashMap<String, String>,
    observations: Vec<Observation>,
    cells: Vec<CellRecord>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn pair(&mut self, package: &str, checker: &str) -> &mut PairAccumulator {
        self.pairs
            .entry((package.to_string(), checker.to_string()))
            .or_default()
    }

    pub fn record_observation(&mut self, observation: Observation) {
        self.pair(&observation.cell.package, &observation.cell.checker)
            .record(&observation);
        self.observations.push(observation);
    }

    pub fn record_cell(&mut self, record: CellRecord) {
        self.pair(&record.cell.package, &record.cell.checker)
            .record_cell(&record);
        self.cells.push(record);
    }

    /// Record a finished cell together with its observations.
    pub fn record_outcome(&mut self, outcome: CellOutcome) {
        for observation in outcome.observations {
            self.record_observation(observation);
        }
        self.record_cell(outcome.record);
    }

    /// Mark a whole package as failed. Its checker metrics are omitted.
    pub fn record_package_error(&mut self, package: impl Into<String>, error: impl Into<String>) {
        self.package_errors.insert(package.into(), error.into());
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Build the report. Pure: repeated calls with the same `meta` return
    /// identical reports.
    pub fn finalize(&self, meta: &ReportMeta) -> BenchmarkReport {
        let packages = self.ordered_packages(meta);

        let results: Vec<PackageResult> = packages
            .iter()
            .map(|package| self.package_result(package, &meta.checkers))
            .collect();

        let aggregate = meta
            .checkers
            .iter()
            .map(|checker| (checker.clone(), aggregate_for(checker, &results)))
            .collect();

        let raw = meta.include_raw.then(|| {
            let mut observations = self.observations.clone();
            observations.sort_by(|a, b| {
                a.cell
                    .cmp(&b.cell)
                    .then_with(|| a.sample_index.cmp(&b.sample_index))
            });
            let mut cells = self.cells.clone();
            cells.sort_by(|a, b| a.cell.cmp(&b.cell));
            RawResults {
                observations,
                cells,
            }
        });

        BenchmarkReport {
            schema_version: SCHEMA_VERSION,
            run_id: Some(meta.run_id),
            timestamp: meta.timestamp,
            date: meta.date,
            seed_date: Some(meta.seed_date),
            status: meta.status,
            stop_reason: meta.stop_reason.clone(),
            type_checkers: meta.checkers.clone(),
            type_checker_versions: meta.versions.clone(),
            configured_package_count: Some(meta.configured_package_count),
            package_count: results.len(),
            runs_per_package: Some(meta.runs_per_package),
            samples_per_run: Some(meta.samples_per_run),
            request_kind: Some(meta.request_kind),
            aggregate,
            results,
            raw,
            extra: BTreeMap::new(),
        }
    }

    /// Packages from `meta` plus any seen only in records, ordered by ranking
    /// then name.
    fn ordered_packages(&self, meta: &ReportMeta) -> Vec<PackageMeta> {
        let mut packages = meta.packages.clone();
        let known: BTreeSet<&str> = meta.packages.iter().map(|p| p.name.as_str()).collect();
        let unseen: BTreeSet<&str> = self
            .pairs
            .keys()
            .map(|(package, _)| package.as_str())
            .chain(self.package_errors.keys().map(String::as_str))
            .filter(|name| !known.contains(name))
            .collect();
        packages.extend(unseen.into_iter().map(|name| PackageMeta {
            name: name.to_string(),
            github_url: None,
            ranking: None,
            has_inline_annotations: None,
        }));
        packages.sort_by(|a, b| {
            a.ranking
                .unwrap_or(u32::MAX)
                .cmp(&b.ranking.unwrap_or(u32::MAX))
                .then_with(|| a.name.cmp(&b.name))
        });
        packages.dedup_by(|a, b| a.name == b.name);
        packages
    }

    fn package_result(&self, package: &PackageMeta, checkers: &[String]) -> PackageResult {
        let mut result = PackageResult {
            package_name: package.name.clone(),
            github_url: package.github_url.clone(),
            ranking: package.ranking,
            has_inline_annotations: package.has_inline_annotations,
            error: None,
            metrics: BTreeMap::new(),
            extra: BTreeMap::new(),
        };

        if let Some(error) = self.package_errors.get(&package.name) {
            result.error = Some(error.clone());
            return result;
        }

        // Pairs the run never reached carry no metrics.
        for checker in checkers {
            if let Some(acc) = self.pairs.get(&(package.name.clone(), checker.clone())) {
                result.metrics.insert(checker.clone(), acc.result());
            }
        }
        result
    }
}

/// Cross-package summary for one checker. Only packages with a measured
/// result contribute to totals and latency figures.
fn aggregate_for(checker: &str, results: &[PackageResult]) -> RunAggregate {
    let mut agg = RunAggregate::default();
    let mut means = Vec::new();

    for result in results.iter().filter(|r| !r.is_error()) {
        let Some(metrics) = result.metrics.get(checker) else {
            continue;
        };
        match metrics {
            CheckerResult::Measured(m) => {
                agg.packages_tested += 1;
                agg.total_runs += m.counts.runs;
                agg.total_ok += m.counts.ok_count;
                agg.total_found += m.counts.found_count;
                agg.total_valid += m.counts.valid_count;
                agg.total_errors += m.counts.errors;
                if let Some(latency) = &m.latency_ms {
                    agg.latency_sample_count += u32::try_from(latency.count).unwrap_or(u32::MAX);
                    means.push(latency.mean);
                }
            }
            CheckerResult::Failed(_) => agg.packages_failed += 1,
        }
    }

    agg.ok = agg.packages_tested > 0;
    agg.avg_latency_ms = stats::mean(&means);
    agg.min_latency_ms = means.iter().copied().reduce(f64::min);
    agg.max_latency_ms = means.iter().copied().reduce(f64::max);
    if agg.total_runs > 0 {
        agg.success_rate = f64::from(agg.total_valid) / f64::from(agg.total_runs) * 100.0;
        agg.ok_rate = f64::from(agg.total_ok) / f64::from(agg.total_runs) * 100.0;
    }
    agg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::valid_outcome;
    use crate::domain::models::{CellId, Position, RequestOutcome, Sample, SymbolKind};
    use std::time::Duration;

    fn sample() -> Sample {
        Sample {
            file: "a.py".into(),
            position: Position::new(1, 2),
            token: "os".to_string(),
            kind: SymbolKind::ImportedName,
        }
    }

    fn obs(package: &str, checker: &str, run: u32, ms: u64, outcome: RequestOutcome) -> Observation {
        Observation {
            cell: CellId::new(package, checker, run),
            sample_index: 0,
            sample: sample(),
            latency: Duration::from_millis(ms),
            outcome,
        }
    }

    fn meta(packages: &[(&str, u32)], checkers: &[&str]) -> ReportMeta {
        ReportMeta {
            run_id: Uuid::nil(),
            timestamp: DateTime::parse_from_rfc3339("2025-06-01T06:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            seed_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            status: ReportStatus::Complete,
            stop_reason: None,
            checkers: checkers.iter().map(ToString::to_string).collect(),
            versions: BTreeMap::new(),
            packages: packages
                .iter()
                .map(|(name, rank)| PackageMeta {
                    name: (*name).to_string(),
                    github_url: None,
                    ranking: Some(*rank),
                    has_inline_annotations: None,
                })
                .collect(),
            configured_package_count: packages.len(),
            runs_per_package: 2,
            samples_per_run: 1,
            request_kind: RequestKind::Definition,
            include_raw: true,
        }
    }

    #[test]
    fn two_checkers_one_package() {
        let mut agg = Aggregator::new();
        agg.record_observation(obs("p", "a", 0, 10, valid_outcome()));
        agg.record_observation(obs("p", "a", 1, 20, valid_outcome()));
        agg.record_observation(obs("p", "b", 0, 10_000, RequestOutcome::Timeout));
        agg.record_observation(obs("p", "b", 1, 10_000, RequestOutcome::Timeout));
        for c in ["a", "b"] {
            for r in 0..2 {
                agg.record_cell(CellRecord::completed(CellId::new("p", c, r), 1));
            }
        }

        let report = agg.finalize(&meta(&[("p", 1)], &["a", "b"]));
        let p = report.package("p").unwrap();

        let a = &p.metrics["a"];
        assert!(a.is_ok());
        assert!((a.latency().unwrap().mean - 15.0).abs() < 1e-9);
        assert_eq!(a.counts().runs, 2);
        assert!((a.counts().valid_pct - 100.0).abs() < 1e-9);

        let b = &p.metrics["b"];
        assert!(!b.is_ok());
        assert_eq!(b.counts().timeouts, 2);
        assert_eq!(b.error_message(), Some("all 2 requests failed (timeout: 2)"));

        assert!(report.aggregate["a"].ok);
        assert_eq!(report.aggregate["a"].packages_tested, 1);
        assert!(!report.aggregate["b"].ok);
        assert_eq!(report.aggregate["b"].packages_failed, 1);
    }

    #[test]
    fn package_error_has_no_metrics() {
        let mut agg = Aggregator::new();
        agg.record_package_error("broken", "No eligible source files in package broken");
        let report = agg.finalize(&meta(&[("broken", 1)], &["a"]));
        let broken = report.package("broken").unwrap();
        assert!(broken.error.is_some());
        assert!(broken.metrics.is_empty());
        assert_eq!(report.aggregate["a"].packages_tested, 0);
    }

    #[test]
    fn checker_without_cells_is_left_out() {
        let mut agg = Aggregator::new();
        agg.record_observation(obs("p", "a", 0, 10, valid_outcome()));
        agg.record_cell(CellRecord::completed(CellId::new("p", "a", 0), 1));

        let report = agg.finalize(&meta(&[("p", 1)], &["a", "b"]));
        let p = report.package("p").unwrap();
        assert!(p.metrics["a"].is_ok());
        assert!(!p.metrics.contains_key("b"));
        let b = &report.aggregate["b"];
        assert_eq!(b.packages_failed, 0);
        assert_eq!(b.packages_tested, 0);
        assert!(!b.ok);
    }

    #[test]
    fn startup_failure_becomes_failed_result_with_reason() {
        let mut agg = Aggregator::new();
        for r in 0..3 {
            agg.record_cell(CellRecord::failed(
                CellId::new("p", "ghost", r),
                "Checker binary not found: ghost",
            ));
        }
        let report = agg.finalize(&meta(&[("p", 1)], &["ghost"]));
        let result = &report.package("p").unwrap().metrics["ghost"];
        assert_eq!(result.error_message(), Some("Checker binary not found: ghost"));
        assert_eq!(result.counts().failed_cells, 3);
        assert_eq!(result.counts().runs, 0);
    }

    #[test]
    fn aggregate_uses_mean_of_package_means() {
        let mut agg = Aggregator::new();
        agg.record_observation(obs("p1", "a", 0, 10, valid_outcome()));
        agg.record_observation(obs("p2", "a", 0, 30, valid_outcome()));
        agg.record_observation(obs("p2", "a", 1, 50, RequestOutcome::NotFound));
        let report = agg.finalize(&meta(&[("p1", 1), ("p2", 2)], &["a"]));
        let a = &report.aggregate["a"];
        // p1 mean 10, p2 mean 40
        assert!((a.avg_latency_ms.unwrap() - 25.0).abs() < 1e-9);
        assert!((a.min_latency_ms.unwrap() - 10.0).abs() < 1e-9);
        assert!((a.max_latency_ms.unwrap() - 40.0).abs() < 1e-9);
        assert_eq!(a.total_runs, 3);
        assert_eq!(a.total_valid, 2);
        assert!((a.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert!((a.ok_rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn packages_are_ordered_by_ranking_then_name() {
        let mut agg = Aggregator::new();
        agg.record_observation(obs("zeta", "a", 0, 1, valid_outcome()));
        agg.record_observation(obs("alpha", "a", 0, 1, valid_outcome()));
        agg.record_observation(obs("unlisted", "a", 0, 1, valid_outcome()));
        let report = agg.finalize(&meta(&[("zeta", 1), ("alpha", 2)], &["a"]));
        let names: Vec<&str> = report.results.iter().map(|r| r.package_name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "unlisted"]);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut agg = Aggregator::new();
        agg.record_observation(obs("p", "a", 1, 20, valid_outcome()));
        agg.record_observation(obs("p", "a", 0, 10, valid_outcome()));
        let m = meta(&[("p", 1)], &["a"]);
        let first = serde_json::to_vec(&agg.finalize(&m)).unwrap();
        let second = serde_json::to_vec(&agg.finalize(&m)).unwrap();
        assert_eq!(first, second);
    }
}
