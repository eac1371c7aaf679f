//! Scheduler: fans cells out across the package x checker x run matrix.
//!
//! Packages are prepared one at a time. Once a package is ready, each of its
//! cells is spawned onto a `JoinSet` behind a shared semaphore, so
//! preparation of the next package overlaps the cells still in flight. Cell
//! outcomes travel over an mpsc channel to a single collector task that owns
//! the [`Aggregator`].

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::aggregator::{Aggregator, PackageMeta, ReportMeta};
use super::run_executor::RunExecutor;
use super::sample_selector::{scan_sources, select_samples};
use crate::domain::errors::{BenchError, BenchResult, PreparationError, SamplingError};
use crate::domain::models::{
    BenchmarkReport, CellId, CellOutcome, CellRecord, CellStatus, Checker, CheckerTable, Package,
    PackageSpec, ReportStatus, Sample,
};
use crate::domain::ports::PackagePreparer;

/// Limits that end submission early.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    pub max_wall_clock: Option<Duration>,
    pub max_cells: Option<usize>,
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of packages to benchmark, taken in ranking order
    pub package_count: usize,
    pub runs_per_package: u32,
    pub samples_per_run: u32,
    /// Cells in flight at once
    pub max_concurrency: usize,
    pub max_file_tries: usize,
    /// Date the sample seed derives from; also the report date
    pub seed_date: NaiveDate,
    pub budget: Budget,
    /// Keep raw observations and cell records in the report
    pub include_raw: bool,
}

impl SchedulerConfig {
    pub fn new(seed_date: NaiveDate) -> Self {
        Self {
            package_count: 10,
            runs_per_package: 5,
            samples_per_run: 1,
            max_concurrency: 2,
            max_file_tries: 50,
            seed_date,
            budget: Budget::default(),
            include_raw: true,
        }
    }

    fn samples_per_package(&self) -> usize {
        self.runs_per_package as usize * self.samples_per_run as usize
    }
}

/// Why submission stopped before the matrix was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    WallClockBudget,
    CellBudget,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted"),
            Self::WallClockBudget => write!(f, "max_wall_clock"),
            Self::CellBudget => write!(f, "max_cells"),
        }
    }
}

/// Progress published while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Started {
        packages: usize,
        checkers: usize,
        total_cells: usize,
    },
    PackageReady {
        package: String,
        candidate_files: usize,
        samples: usize,
    },
    PackageFailed {
        package: String,
        error: String,
    },
    CellStarted {
        cell: CellId,
    },
    CellFinished {
        cell: CellId,
        status: CellStatus,
        observations: u32,
    },
    Stopped {
        reason: StopReason,
    },
    Finished {
        status: ReportStatus,
        cells: usize,
    },
}

enum CollectorMessage {
    Cell(CellOutcome),
    PackageError { package: String, error: String },
}

/// Drives a whole benchmark run.
pub struct Scheduler {
    checkers: CheckerTable,
    executor: RunExecutor,
    preparer: Arc<dyn PackagePreparer>,
    config: SchedulerConfig,
    events: Option<mpsc::Sender<SchedulerEvent>>,
}

impl Scheduler {
    pub fn new(
        checkers: CheckerTable,
        executor: RunExecutor,
        preparer: Arc<dyn PackagePreparer>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            checkers,
            executor,
            preparer,
            config,
            events: None,
        }
    }

    /// Publish progress on `events`.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::Sender<SchedulerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    async fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// The packages a run would cover, in ranking order.
    pub fn plan(&self, specs: &[PackageSpec]) -> Vec<PackageSpec> {
        let mut specs = specs.to_vec();
        specs.sort_by_key(|s| s.ranking.unwrap_or(u32::MAX));
        specs.truncate(self.config.package_count);
        specs
    }

    /// Run the benchmark over `specs` and return the finalized report.
    ///
    /// Cancelling `cancel` stops submission and interrupts in-flight cells;
    /// exhausting the budget stops submission and lets in-flight cells finish.
    /// Either way the returned report is marked partial.
    pub async fn run(
        &self,
        specs: &[PackageSpec],
        cancel: &CancellationToken,
    ) -> BenchResult<BenchmarkReport> {
        if self.checkers.is_empty() {
            return Err(BenchError::NoCheckers);
        }
        let planned = self.plan(specs);
        if planned.is_empty() {
            return Err(BenchError::NoPackages);
        }

        let started_at = Instant::now();
        let runs = self.config.runs_per_package;
        let checkers: Vec<Arc<Checker>> = self.checkers.iter().cloned().map(Arc::new).collect();
        let total_cells = planned.len() * checkers.len() * runs as usize;

        info!(
            packages = planned.len(),
            checkers = checkers.len(),
            runs,
            samples_per_run = self.config.samples_per_run,
            concurrency = self.config.max_concurrency,
            seed_date = %self.config.seed_date,
            "starting benchmark run"
        );
        self.emit(SchedulerEvent::Started {
            packages: planned.len(),
            checkers: checkers.len(),
            total_cells,
        })
        .await;

        let (tx, rx) = mpsc::channel(256);
        let collector = tokio::spawn(collect(rx));

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut cells: JoinSet<()> = JoinSet::new();
        let mut cell_ids = HashMap::new();
        let mut metas = Vec::with_capacity(planned.len());
        let mut submitted = 0_usize;
        let mut stop_reason = None;

        'packages: for spec in &planned {
            if let Some(reason) = self.should_stop(cancel, started_at, submitted) {
                stop_reason = Some(reason);
                break;
            }

            let mut meta = PackageMeta {
                name: spec.name.clone(),
                github_url: spec.github_url.clone(),
                ranking: spec.ranking,
                has_inline_annotations: None,
            };

            let prepared = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                prepared = self.materialize(spec) => Some(prepared),
            };
            let (package, samples) = match prepared {
                None => {
                    stop_reason = Some(StopReason::Interrupted);
                    break;
                }
                Some(Ok(ready)) => ready,
                Some(Err(e)) => {
                    warn!(package = %spec.name, error = %e, "package preparation failed");
                    metas.push(meta);
                    self.emit(SchedulerEvent::PackageFailed {
                        package: spec.name.clone(),
                        error: e.to_string(),
                    })
                    .await;
                    let _ = tx
                        .send(CollectorMessage::PackageError {
                            package: spec.name.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    continue;
                }
            };

            meta.has_inline_annotations = Some(package.has_inline_annotations);
            metas.push(meta);
            self.emit(SchedulerEvent::PackageReady {
                package: package.name().to_string(),
                candidate_files: package.candidate_files.len(),
                samples: samples.len(),
            })
            .await;

            let package = Arc::new(package);
            for run_index in 0..runs {
                let slice = self.slice_for(&samples, run_index);
                for checker in &checkers {
                    if let Some(reason) = self.should_stop(cancel, started_at, submitted) {
                        stop_reason = Some(reason);
                        break 'packages;
                    }
                    let Some(permit) = self.acquire(&semaphore, cancel, started_at).await else {
                        stop_reason = Some(
                            self.should_stop(cancel, started_at, submitted)
                                .unwrap_or(StopReason::Interrupted),
                        );
                        break 'packages;
                    };

                    let cell = CellId::new(package.name(), checker.key(), run_index);
                    self.emit(SchedulerEvent::CellStarted { cell: cell.clone() })
                        .await;

                    let task = CellTask {
                        executor: self.executor.clone(),
                        package: Arc::clone(&package),
                        checker: Arc::clone(checker),
                        run_index,
                        samples: slice.clone(),
                        cancel: cancel.clone(),
                        tx: tx.clone(),
                        events: self.events.clone(),
                    };
                    let handle = cells.spawn(task.run(permit));
                    cell_ids.insert(handle.id(), cell);
                    submitted += 1;
                }
            }
        }

        if let Some(reason) = stop_reason {
            warn!(%reason, submitted, total_cells, "stopping submission early");
            self.emit(SchedulerEvent::Stopped { reason }).await;
        }

        while let Some(joined) = cells.join_next().await {
            if let Err(e) = joined {
                let cell = cell_ids.remove(&e.id());
                error!(cell = ?cell, error = %e, "cell task failed");
                if let Some(cell) = cell {
                    let _ = tx
                        .send(CollectorMessage::Cell(CellOutcome {
                            record: CellRecord::failed(cell, format!("cell task failed: {e}")),
                            observations: Vec::new(),
                        }))
                        .await;
                }
            }
        }
        drop(tx);

        // Cancelled after the last submission: in-flight cells were cut short.
        if stop_reason.is_none() && cancel.is_cancelled() {
            warn!("run interrupted after submission completed");
            stop_reason = Some(StopReason::Interrupted);
            self.emit(SchedulerEvent::Stopped {
                reason: StopReason::Interrupted,
            })
            .await;
        }

        let aggregator = collector
            .await
            .map_err(|e| BenchError::CollectorFailed(e.to_string()))?;

        let status = if stop_reason.is_some() {
            ReportStatus::Partial
        } else {
            ReportStatus::Complete
        };
        let meta = ReportMeta {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            date: self.config.seed_date,
            seed_date: self.config.seed_date,
            status,
            stop_reason: stop_reason.map(|r| r.to_string()),
            checkers: self.checkers.keys(),
            versions: self.checkers.versions(),
            packages: metas,
            configured_package_count: self.config.package_count,
            runs_per_package: runs,
            samples_per_run: self.config.samples_per_run,
            request_kind: self.executor.request_kind(),
            include_raw: self.config.include_raw,
        };

        info!(
            cells = aggregator.cell_count(),
            observations = aggregator.observation_count(),
            elapsed_s = started_at.elapsed().as_secs_f64(),
            ?status,
            "benchmark run finished"
        );
        self.emit(SchedulerEvent::Finished {
            status,
            cells: aggregator.cell_count(),
        })
        .await;

        Ok(aggregator.finalize(&meta))
    }

    fn should_stop(
        &self,
        cancel: &CancellationToken,
        started_at: Instant,
        submitted: usize,
    ) -> Option<StopReason> {
        if cancel.is_cancelled() {
            return Some(StopReason::Interrupted);
        }
        let budget = &self.config.budget;
        if budget.max_cells.is_some_and(|max| submitted >= max) {
            return Some(StopReason::CellBudget);
        }
        if budget
            .max_wall_clock
            .is_some_and(|max| started_at.elapsed() >= max)
        {
            return Some(StopReason::WallClockBudget);
        }
        None
    }

    /// Wait for a free slot, giving up on cancellation or budget expiry.
    async fn acquire(
        &self,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
        started_at: Instant,
    ) -> Option<OwnedSemaphorePermit> {
        let deadline = self.config.budget.max_wall_clock.map(|max| started_at + max);
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            () = expired => None,
            permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
        }
    }

    /// Samples for run `run_index`: the run's own slice of the day's set.
    fn slice_for(&self, samples: &Arc<[Sample]>, run_index: u32) -> Arc<[Sample]> {
        let per_run = self.config.samples_per_run as usize;
        let start = (run_index as usize * per_run).min(samples.len());
        let end = (start + per_run).min(samples.len());
        samples[start..end].into()
    }

    /// Prepare a package and draw the day's samples for it.
    async fn materialize(
        &self,
        spec: &PackageSpec,
    ) -> Result<(Package, Arc<[Sample]>), PreparationError> {
        let root = self.preparer.prepare(spec).await?;
        let spec = spec.clone();
        let seed_date = self.config.seed_date;
        let count = self.config.samples_per_package();
        let tries = self.config.max_file_tries;

        let name = spec.name.clone();
        let drawn = tokio::task::spawn_blocking(move || draw(spec, root, seed_date, count, tries))
            .await
            .map_err(|e| PreparationError::FetchFailed {
                url: name,
                message: format!("sampling task failed: {e}"),
            })??;
        Ok(drawn)
    }
}

fn draw(
    spec: PackageSpec,
    root: PathBuf,
    seed_date: NaiveDate,
    count: usize,
    tries: usize,
) -> Result<(Package, Arc<[Sample]>), PreparationError> {
    let scan = scan_sources(&root)?;
    let package = Package {
        spec,
        root,
        candidate_files: scan.candidate_files,
        has_inline_annotations: scan.has_inline_annotations,
    };
    let set = select_samples(&package, seed_date, count, tries)?;
    let samples: Arc<[Sample]> = set.iter().collect();
    if samples.is_empty() {
        return Err(SamplingError::NoEligibleFiles(package.name().to_string()).into());
    }
    debug!(
        package = %package.name(),
        files = package.candidate_files.len(),
        samples = samples.len(),
        "samples drawn"
    );
    Ok((package, samples))
}

/// Everything one spawned cell needs.
struct CellTask {
    executor: RunExecutor,
    package: Arc<Package>,
    checker: Arc<Checker>,
    run_index: u32,
    samples: Arc<[Sample]>,
    cancel: CancellationToken,
    tx: mpsc::Sender<CollectorMessage>,
    events: Option<mpsc::Sender<SchedulerEvent>>,
}

impl CellTask {
    async fn run(self, permit: OwnedSemaphorePermit) {
        let _permit = permit;
        let cell = CellId::new(self.package.name(), self.checker.key(), self.run_index);

        let outcome = if self.checker.is_available() && !self.samples.is_empty() {
            self.executor
                .run(
                    &self.package,
                    &self.checker,
                    self.run_index,
                    &self.samples,
                    &self.cancel,
                )
                .await
        } else {
            let reason = if self.checker.is_available() {
                "no sample available for this run".to_string()
            } else {
                format!("Checker not installed: {}", self.checker.key())
            };
            CellOutcome {
                record: CellRecord::failed(cell.clone(), reason),
                observations: Vec::new(),
            }
        };

        if let Some(events) = &self.events {
            let _ = events
                .send(SchedulerEvent::CellFinished {
                    cell,
                    status: outcome.record.status,
                    observations: outcome.record.observations,
                })
                .await;
        }
        let _ = self.tx.send(CollectorMessage::Cell(outcome)).await;
    }
}

/// Single writer: the only place the aggregator is mutated.
async fn collect(mut rx: mpsc::Receiver<CollectorMessage>) -> Aggregator {
    let mut aggregator = Aggregator::new();
    while let Some(message) = rx.recv().await {
        match message {
            CollectorMessage::Cell(outcome) => aggregator.record_outcome(outcome),
            CollectorMessage::PackageError { package, error } => {
                aggregator.record_package_error(package, error);
            }
        }
    }
    aggregator
}
