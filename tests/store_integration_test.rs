//! Report store persistence, lookup and integrity checks.

mod common;

use std::time::Duration;

use chrono::NaiveDate;

use typebench::adapters::store::{persist_with_retry, JsonReportStore};
use typebench::domain::errors::StoreError;
use typebench::domain::models::ReportStatus;
use typebench::domain::ports::{ReportKey, ReportStore};
use typebench::services::variance;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

#[tokio::test]
async fn persisted_report_loads_by_date_and_latest() {
    let dir = common::temp_dir();
    let store = JsonReportStore::new(dir.path());
    let report = common::empty_report(day(1));

    let path = store.persist(&report).await.unwrap();
    assert_eq!(path, dir.path().join("benchmark_2025-06-01.json"));
    assert!(dir.path().join("latest.json").exists());

    let by_date = store.load(ReportKey::Date(day(1))).await.unwrap();
    assert_eq!(by_date, report);
    let latest = store.load(ReportKey::Latest).await.unwrap();
    assert_eq!(latest, report);

    let index = store.index().await.unwrap();
    let entry = &index.reports[&day(1)];
    assert_eq!(entry.file, "benchmark_2025-06-01.json");
    assert_eq!(entry.status, ReportStatus::Complete);
    assert_eq!(entry.run_id, report.run_id);
}

#[tokio::test]
async fn latest_follows_most_recent_persist() {
    let dir = common::temp_dir();
    let store = JsonReportStore::new(dir.path());
    store.persist(&common::empty_report(day(1))).await.unwrap();
    store.persist(&common::empty_report(day(3))).await.unwrap();
    store.persist(&common::empty_report(day(2))).await.unwrap();

    assert_eq!(store.list_dates().await.unwrap(), vec![day(1), day(2), day(3)]);
    assert_eq!(store.load(ReportKey::Latest).await.unwrap().date, day(2));
}

#[tokio::test]
async fn tampered_report_fails_digest_check() {
    let dir = common::temp_dir();
    let store = JsonReportStore::new(dir.path());
    let path = store.persist(&common::empty_report(day(1))).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("requests", "requestz")).unwrap();

    let err = store.load(ReportKey::Date(day(1))).await.unwrap_err();
    assert!(matches!(err, StoreError::DigestMismatch { .. }));
}

#[tokio::test]
async fn missing_report_is_not_found() {
    let dir = common::temp_dir();
    let store = JsonReportStore::new(dir.path());
    let err = store.load(ReportKey::Date(day(9))).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(matches!(
        store.load(ReportKey::Latest).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[tokio::test]
async fn legacy_report_without_new_fields_loads() {
    let dir = common::temp_dir();
    std::fs::write(
        dir.path().join("benchmark_2025-01-15.json"),
        r#"{
            "timestamp": "2025-01-15T06:00:00Z",
            "date": "2025-01-15",
            "type_checkers": ["pyright"],
            "type_checker_versions": {"pyright": "1.1.400"},
            "package_count": 1,
            "aggregate": {},
            "results": [
                {"package_name": "requests", "error": "clone failed", "metrics": {}}
            ]
        }"#,
    )
    .unwrap();

    let store = JsonReportStore::new(dir.path());
    let report = store.load(ReportKey::Date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()))
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Complete);
    assert!(report.run_id.is_none());
    assert_eq!(report.package("requests").unwrap().error.as_deref(), Some("clone failed"));
}

#[tokio::test]
async fn daily_runner_report_with_null_latencies_loads() {
    let dir = common::temp_dir();
    std::fs::write(
        dir.path().join("benchmark_2025-02-03.json"),
        r#"{
            "timestamp": "2025-02-03T06:12:45.123456+00:00",
            "date": "2025-02-03",
            "type_checkers": ["pyright", "ty"],
            "package_count": 2,
            "runs_per_package": 5,
            "aggregate": {
                "pyright": {
                    "packages_tested": 1, "total_runs": 5, "total_ok": 5, "total_found": 4,
                    "total_valid": 4, "avg_latency_ms": 41.2, "min_latency_ms": 41.2,
                    "max_latency_ms": 41.2, "success_rate": 80.0
                },
                "ty": {
                    "packages_tested": 1, "total_runs": 5, "total_ok": 0, "total_found": 0,
                    "total_valid": 0, "avg_latency_ms": null, "min_latency_ms": null,
                    "max_latency_ms": null, "success_rate": 0.0
                }
            },
            "results": [
                {
                    "package_name": "requests",
                    "github_url": "https://github.com/psf/requests",
                    "ranking": 1,
                    "error": null,
                    "metrics": {
                        "pyright": {
                            "ok": true, "runs": 5, "ok_count": 5, "ok_pct": 100.0,
                            "found_count": 4, "found_pct": 80.0, "valid_count": 4,
                            "valid_pct": 80.0, "errors": 0,
                            "latency_ms": {"p50": 40.0, "p95": 55.5, "min": 31.0, "max": 56.0, "mean": 41.2}
                        },
                        "ty": {
                            "ok": true, "runs": 5, "ok_count": 0, "ok_pct": 0.0,
                            "found_count": 0, "found_pct": 0.0, "valid_count": 0,
                            "valid_pct": 0.0, "errors": 5,
                            "latency_ms": {"p50": null, "p95": null, "min": null, "max": null, "mean": null}
                        }
                    }
                },
                {
                    "package_name": "flask",
                    "github_url": "https://github.com/pallets/flask",
                    "ranking": 2,
                    "error": "Failed to clone repository",
                    "metrics": {}
                }
            ]
        }"#,
    )
    .unwrap();

    let store = JsonReportStore::new(dir.path());
    let report = store
        .load(ReportKey::Date(NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()))
        .await
        .unwrap();

    assert_eq!(report.runs_per_package, Some(5));
    let requests = report.package("requests").unwrap();
    let pyright = requests.metrics["pyright"].latency().unwrap();
    assert!((pyright.mean - 41.2).abs() < 1e-9);
    assert_eq!(pyright.count, 0);
    assert!(requests.metrics["ty"].latency().is_none());
    assert_eq!(requests.metrics["ty"].counts().errors, 5);
    assert_eq!(
        report.package("flask").unwrap().error.as_deref(),
        Some("Failed to clone repository")
    );
    assert!(report.aggregate["ty"].avg_latency_ms.is_none());
}

#[tokio::test]
async fn retrying_persist_writes_once_store_is_healthy() {
    let dir = common::temp_dir();
    let store = JsonReportStore::new(dir.path().join("nested").join("results"));
    let path = persist_with_retry(
        &store,
        &common::empty_report(day(4)),
        Duration::from_millis(10),
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn variance_over_single_day_has_no_entries() {
    let dir = common::temp_dir();
    let store = JsonReportStore::new(dir.path());
    store.persist(&common::empty_report(day(1))).await.unwrap();

    let analysis = variance::analyze_store(&store, None).await.unwrap();
    assert_eq!(analysis.days, 1);
    assert!(analysis.entries.is_empty());
}
