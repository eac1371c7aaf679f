//! Scripted checker launcher for testing.
//!
//! Sessions answer every request with a configured outcome and a synthetic
//! latency, optionally sleeping for real so timeouts and cancellation can be
//! exercised.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::StartupError;
use crate::domain::models::{
    Availability, Checker, Position, RequestKind, RequestOutcome, RequestResult, ResolvedLocation,
    ResponsePayload, Sample,
};
use crate::domain::ports::{CheckerLauncher, CheckerSession};

/// Behaviour of every session launched for one checker.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Fail startup with this error
    pub startup_error: Option<StartupError>,
    /// Latency reported by session `n` is `latencies[n % len]`
    pub latencies: Vec<Duration>,
    /// Sleep for the reported latency before answering
    pub real_delay: bool,
    /// Outcome of every request
    pub outcome: RequestOutcome,
    /// Never answer; report a timeout after `request_timeout`
    pub hang: bool,
    pub request_timeout: Duration,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            startup_error: None,
            latencies: vec![Duration::from_millis(10)],
            real_delay: false,
            outcome: valid_outcome(),
            hang: false,
            request_timeout: Duration::from_millis(200),
        }
    }
}

impl MockBehavior {
    pub fn answering(latencies: &[u64]) -> Self {
        Self {
            latencies: latencies.iter().copied().map(Duration::from_millis).collect(),
            ..Default::default()
        }
    }

    pub fn failing_startup(error: StartupError) -> Self {
        Self {
            startup_error: Some(error),
            ..Default::default()
        }
    }

    pub fn hanging(request_timeout: Duration) -> Self {
        Self {
            hang: true,
            real_delay: true,
            request_timeout,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: RequestOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    #[must_use]
    pub const fn with_real_delay(mut self) -> Self {
        self.real_delay = true;
        self
    }
}

/// A definition answer pointing into a local file.
pub fn valid_outcome() -> RequestOutcome {
    RequestOutcome::Valid {
        payload: ResponsePayload::Locations {
            locations: vec![ResolvedLocation {
                uri: "file:///mock/definition.py".to_string(),
                start: Position::new(0, 0),
                end: Position::new(0, 4),
                valid: true,
            }],
        },
    }
}

#[derive(Debug, Default)]
struct Counters {
    live: AtomicUsize,
    peak: AtomicUsize,
    stopped: AtomicUsize,
    requests: AtomicUsize,
}

/// Launcher returning scripted sessions.
#[derive(Debug, Default)]
pub struct MockLauncher {
    behaviors: HashMap<String, MockBehavior>,
    default_behavior: MockBehavior,
    starts: Mutex<HashMap<String, usize>>,
    roots: Mutex<Vec<PathBuf>>,
    counters: Arc<Counters>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_behavior(mut self, checker: impl Into<String>, behavior: MockBehavior) -> Self {
        self.behaviors.insert(checker.into(), behavior);
        self
    }

    #[must_use]
    pub fn with_default_behavior(mut self, behavior: MockBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    /// Sessions started per checker.
    pub async fn starts(&self, checker: &str) -> usize {
        self.starts.lock().await.get(checker).copied().unwrap_or(0)
    }

    /// Workspace roots sessions were started in.
    pub async fn roots(&self) -> Vec<PathBuf> {
        self.roots.lock().await.clone()
    }

    /// Sessions not yet stopped or dropped.
    pub fn live_sessions(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live sessions.
    pub fn peak_sessions(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Sessions that received `stop()`.
    pub fn stopped_sessions(&self) -> usize {
        self.counters.stopped.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.counters.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckerLauncher for MockLauncher {
    async fn start(
        &self,
        checker: &Checker,
        workspace_root: &Path,
    ) -> Result<Box<dyn CheckerSession>, StartupError> {
        if let Availability::NotInstalled(reason) = &checker.availability {
            return Err(StartupError::NotInstalled(reason.clone()));
        }

        let behavior = self
            .behaviors
            .get(checker.key())
            .unwrap_or(&self.default_behavior)
            .clone();
        if let Some(err) = behavior.startup_error.clone() {
            return Err(err);
        }

        let index = {
            let mut starts = self.starts.lock().await;
            let count = starts.entry(checker.key().to_string()).or_insert(0);
            let index = *count;
            *count += 1;
            index
        };
        self.roots.lock().await.push(workspace_root.to_path_buf());

        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(live, Ordering::SeqCst);

        let latency = if behavior.latencies.is_empty() {
            Duration::ZERO
        } else {
            behavior.latencies[index % behavior.latencies.len()]
        };

        Ok(Box::new(MockSession {
            behavior,
            latency,
            counters: Arc::clone(&self.counters),
            stopped: false,
        }))
    }
}

struct MockSession {
    behavior: MockBehavior,
    latency: Duration,
    counters: Arc<Counters>,
    stopped: bool,
}

impl MockSession {
    fn release(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CheckerSession for MockSession {
    async fn request(&mut self, _sample: &Sample, _kind: RequestKind) -> RequestResult {
        self.counters.requests.fetch_add(1, Ordering::SeqCst);

        if self.behavior.hang {
            tokio::time::sleep(self.behavior.request_timeout).await;
            return RequestResult {
                latency: self.behavior.request_timeout,
                outcome: RequestOutcome::Timeout,
            };
        }

        if self.behavior.real_delay {
            tokio::time::sleep(self.latency).await;
        }
        RequestResult {
            latency: self.latency,
            outcome: self.behavior.outcome.clone(),
        }
    }

    async fn stop(&mut self) {
        if !self.stopped {
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
        self.release();
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CheckerConfig, SymbolKind};

    fn sample() -> Sample {
        Sample {
            file: "a.py".into(),
            position: Position::new(0, 0),
            token: "os".to_string(),
            kind: SymbolKind::ImportedName,
        }
    }

    #[tokio::test]
    async fn sessions_cycle_through_latencies() {
        let launcher = MockLauncher::new().with_behavior("a", MockBehavior::answering(&[10, 20]));
        let checker = Checker::installed(CheckerConfig::new("a", "a", &[]), "1");

        let mut first = launcher.start(&checker, Path::new("/tmp")).await.unwrap();
        let mut second = launcher.start(&checker, Path::new("/tmp")).await.unwrap();
        assert_eq!(launcher.peak_sessions(), 2);

        let r1 = first.request(&sample(), RequestKind::Definition).await;
        let r2 = second.request(&sample(), RequestKind::Definition).await;
        assert_eq!(r1.latency, Duration::from_millis(10));
        assert_eq!(r2.latency, Duration::from_millis(20));

        first.stop().await;
        first.stop().await;
        drop(second);
        assert_eq!(launcher.stopped_sessions(), 1);
        assert_eq!(launcher.live_sessions(), 0);
    }

    #[tokio::test]
    async fn startup_failure_is_scripted() {
        let launcher = MockLauncher::new().with_behavior(
            "b",
            MockBehavior::failing_startup(StartupError::BinaryMissing("b".to_string())),
        );
        let checker = Checker::installed(CheckerConfig::new("b", "b", &[]), "1");
        assert!(launcher.start(&checker, Path::new("/tmp")).await.is_err());
        assert_eq!(launcher.live_sessions(), 0);
    }
}
