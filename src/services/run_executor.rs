//! Run executor: drives one (package, checker, run-index) cell.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::domain::models::{
    CellId, CellOutcome, CellRecord, Checker, Observation, Package, RequestKind, Sample,
};
use crate::domain::ports::CheckerLauncher;

/// Executes cells against checker sessions.
#[derive(Clone)]
pub struct RunExecutor {
    launcher: Arc<dyn CheckerLauncher>,
    request_kind: RequestKind,
}

impl RunExecutor {
    pub fn new(launcher: Arc<dyn CheckerLauncher>, request_kind: RequestKind) -> Self {
        Self {
            launcher,
            request_kind,
        }
    }

    pub const fn request_kind(&self) -> RequestKind {
        self.request_kind
    }

    /// Run one cell.
    ///
    /// Starts exactly one session, issues one request per sample in order and
    /// always stops the session before returning. Sample failures are recorded
    /// as observations and never abort the remaining samples. A startup
    /// failure yields a failed cell; cancellation yields an interrupted cell
    /// holding the observations gathered so far.
    pub async fn run(
        &self,
        package: &Package,
        checker: &Checker,
        run_index: u32,
        samples: &[Sample],
        cancel: &CancellationToken,
    ) -> CellOutcome {
        let span = info_span!(
            "cell",
            package = %package.name(),
            checker = %checker.key(),
            run_index
        );
        self.run_cell(package, checker, run_index, samples, cancel)
            .instrument(span)
            .await
    }

    async fn run_cell(
        &self,
        package: &Package,
        checker: &Checker,
        run_index: u32,
        samples: &[Sample],
        cancel: &CancellationToken,
    ) -> CellOutcome {
        let cell = CellId::new(package.name(), checker.key(), run_index);

        let started = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.launcher.start(checker, package.root()) => Some(result),
        };
        let mut session = match started {
            None => {
                debug!("cancelled before startup");
                return CellOutcome {
                    record: CellRecord::interrupted(cell, 0),
                    observations: Vec::new(),
                };
            }
            Some(Err(e)) => {
                warn!(error = %e, "checker failed to start");
                return CellOutcome {
                    record: CellRecord::failed(cell, e.to_string()),
                    observations: Vec::new(),
                };
            }
            Some(Ok(session)) => session,
        };

        let mut observations = Vec::with_capacity(samples.len());
        let mut interrupted = false;

        for (index, sample) in samples.iter().enumerate() {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = session.request(sample, self.request_kind) => Some(result),
            };
            let Some(result) = result else {
                interrupted = true;
                break;
            };

            debug!(
                sample = %sample,
                latency_ms = result.latency.as_secs_f64() * 1000.0,
                outcome = result.outcome.class(),
                "request finished"
            );
            let sample_index = u32::try_from(index).unwrap_or(u32::MAX);
            observations.push(Observation::new(
                cell.clone(),
                sample_index,
                sample.clone(),
                result,
            ));
        }

        session.stop().await;

        let count = u32::try_from(observations.len()).unwrap_or(u32::MAX);
        let record = if interrupted {
            debug!(observations = count, "cell interrupted");
            CellRecord::interrupted(cell, count)
        } else {
            CellRecord::completed(cell, count)
        };
        CellOutcome {
            record,
            observations,
        }
    }
}
