//! Common test utilities for integration tests
//!
//! Provides package fixtures, checker tables, scheduler construction and
//! report builders shared across integration test files.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use typebench::adapters::mock::MockLauncher;
use typebench::adapters::packages::LocalPreparer;
use typebench::domain::models::{
    BenchmarkReport, Checker, CheckerConfig, CheckerTable, PackageSpec, ReportStatus, RequestKind,
};
use typebench::services::{
    Aggregator, PackageMeta, ReportMeta, RunExecutor, Scheduler, SchedulerConfig,
};

/// Source file with a handful of imported names to sample.
pub const MODULE_SOURCE: &str = "\
import os
from collections import OrderedDict

def build(path):
    data = OrderedDict()
    data[path] = os.path.join(path, \"x\")
    return data
";

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
}

/// Write `files` under `root`, creating parent directories.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (path, contents) in files {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().expect("file has a parent")).expect("mkdir");
        std::fs::write(full, contents).expect("write file");
    }
}

/// A local package named `name` containing a few Python modules.
pub fn python_package(name: &str, ranking: u32) -> (TempDir, PackageSpec) {
    let dir = temp_dir();
    write_files(
        dir.path(),
        &[
            ("pkg/__init__.py", MODULE_SOURCE),
            ("pkg/core.py", MODULE_SOURCE),
            ("pkg/util.py", MODULE_SOURCE),
        ],
    );
    let spec = PackageSpec::local(name, dir.path(), ranking);
    (dir, spec)
}

/// A local package with no Python sources at all.
pub fn empty_package(name: &str, ranking: u32) -> (TempDir, PackageSpec) {
    let dir = temp_dir();
    write_files(dir.path(), &[("README.md", "# nothing to check\n")]);
    let spec = PackageSpec::local(name, dir.path(), ranking);
    (dir, spec)
}

/// Installed checkers with the given keys; the mock launcher ignores commands.
pub fn checkers(keys: &[&str]) -> CheckerTable {
    CheckerTable::new(
        keys.iter()
            .map(|k| Checker::installed(CheckerConfig::new(*k, *k, &[]), "1.0.0"))
            .collect(),
    )
}

pub fn scheduler_config(runs: u32, concurrency: usize) -> SchedulerConfig {
    let mut config = SchedulerConfig::new(date());
    config.runs_per_package = runs;
    config.max_concurrency = concurrency;
    config
}

pub fn scheduler(
    table: CheckerTable,
    launcher: Arc<MockLauncher>,
    config: SchedulerConfig,
) -> Scheduler {
    Scheduler::new(
        table,
        RunExecutor::new(launcher, RequestKind::Definition),
        Arc::new(LocalPreparer::default()),
        config,
    )
}

/// Report for `date` with no results, suitable for store tests.
pub fn empty_report(date: NaiveDate) -> BenchmarkReport {
    Aggregator::new().finalize(&ReportMeta {
        run_id: Uuid::new_v4(),
        timestamp: Utc
            .from_utc_datetime(&date.and_hms_opt(6, 0, 0).expect("valid time")),
        date,
        seed_date: date,
        status: ReportStatus::Complete,
        stop_reason: None,
        checkers: vec!["ty".to_string()],
        versions: BTreeMap::from([("ty".to_string(), "0.0.1".to_string())]),
        packages: vec![PackageMeta {
            name: "requests".to_string(),
            github_url: Some("https://github.com/psf/requests".to_string()),
            ranking: Some(1),
            has_inline_annotations: None,
        }],
        configured_package_count: 1,
        runs_per_package: 1,
        samples_per_run: 1,
        request_kind: RequestKind::Definition,
        include_raw: false,
    })
}

/// Upper bound for tests that exercise timing.
pub const TEST_DEADLINE: Duration = Duration::from_secs(20);
