//! Retrying persistence with exponential backoff.

use std::path::PathBuf;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use tracing::warn;

use crate::domain::errors::StoreError;
use crate::domain::models::BenchmarkReport;
use crate::domain::ports::ReportStore;

/// Persist `report`, retrying I/O failures until `max_elapsed` has passed.
///
/// Serialization failures cannot succeed on retry and are returned at once.
pub async fn persist_with_retry(
    store: &dyn ReportStore,
    report: &BenchmarkReport,
    initial_interval: Duration,
    max_elapsed: Duration,
) -> Result<PathBuf, StoreError> {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(initial_interval)
        .with_max_elapsed_time(Some(max_elapsed))
        .build();

    backoff::future::retry_notify(
        policy,
        || async {
            store.persist(report).await.map_err(|e| match e {
                StoreError::Io { .. } => backoff::Error::transient(e),
                other => backoff::Error::permanent(other),
            })
        },
        |e: StoreError, wait: Duration| {
            warn!(error = %e, retry_in_ms = wait.as_millis(), "persisting report failed, retrying");
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::domain::ports::ReportKey;

    struct FlakyStore {
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ReportStore for FlakyStore {
        async fn persist(&self, _report: &BenchmarkReport) -> Result<PathBuf, StoreError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err(StoreError::io("/results", std::io::Error::other("disk busy")))
            } else {
                Ok(PathBuf::from("/results/benchmark_2025-06-01.json"))
            }
        }

        async fn load(&self, key: ReportKey) -> Result<BenchmarkReport, StoreError> {
            Err(StoreError::NotFound(key.to_string()))
        }

        async fn list_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn report() -> BenchmarkReport {
        serde_json::from_value(serde_json::json!({
            "timestamp": "2025-06-01T06:00:00Z",
            "date": "2025-06-01",
            "type_checkers": [],
            "package_count": 0
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = FlakyStore {
            failures: 2,
            attempts: AtomicUsize::new(0),
        };
        let path = persist_with_retry(
            &store,
            &report(),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(path.ends_with("benchmark_2025-06-01.json"));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_the_last_error() {
        let store = FlakyStore {
            failures: usize::MAX,
            attempts: AtomicUsize::new(0),
        };
        let err = persist_with_retry(
            &store,
            &report(),
            Duration::from_millis(1),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(store.attempts.load(Ordering::SeqCst) >= 1);
    }
}
