//! Progress bar for benchmark runs using indicatif
//!
//! The bar is driven by [`SchedulerEvent`]s and draws to stderr. It is hidden
//! in JSON mode and when stderr is not a terminal.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::models::CellStatus;
use crate::services::SchedulerEvent;

const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} cells {msg} (ETA: {eta})";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Tally of finished cells shown next to the bar.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CellTally {
    pub completed: u64,
    pub failed: u64,
    pub interrupted: u64,
}

impl CellTally {
    fn record(&mut self, status: CellStatus) {
        match status {
            CellStatus::Completed => self.completed += 1,
            CellStatus::Failed => self.failed += 1,
            CellStatus::Interrupted => self.interrupted += 1,
        }
    }

    fn message(&self) -> String {
        format!(
            "ok {} / failed {} / interrupted {}",
            self.completed, self.failed, self.interrupted
        )
    }
}

/// Renders scheduler progress until the event channel closes.
pub struct RunProgress {
    bar: ProgressBar,
}

impl RunProgress {
    pub fn new(visible: bool) -> Self {
        let bar = ProgressBar::with_draw_target(
            Some(0),
            if visible {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            },
        );
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            bar.set_style(style.progress_chars(PROGRESS_CHARS));
        }
        Self { bar }
    }

    /// Consume events on a background task. The task returns the final tally.
    pub fn spawn(self, mut events: mpsc::Receiver<SchedulerEvent>) -> JoinHandle<CellTally> {
        tokio::spawn(async move {
            let mut tally = CellTally::default();
            self.bar.enable_steady_tick(Duration::from_millis(200));
            while let Some(event) = events.recv().await {
                self.handle(&event, &mut tally);
            }
            self.bar.finish_and_clear();
            tally
        })
    }

    fn handle(&self, event: &SchedulerEvent, tally: &mut CellTally) {
        match event {
            SchedulerEvent::Started { total_cells, .. } => {
                self.bar.set_length(*total_cells as u64);
            }
            SchedulerEvent::PackageReady { package, .. } => {
                self.bar.println(format!("prepared {package}"));
            }
            SchedulerEvent::PackageFailed { package, error } => {
                self.bar.println(format!("package {package} failed: {error}"));
            }
            SchedulerEvent::CellStarted { .. } => {}
            SchedulerEvent::CellFinished { status, .. } => {
                tally.record(*status);
                self.bar.inc(1);
                self.bar.set_message(tally.message());
            }
            SchedulerEvent::Stopped { reason } => {
                self.bar.println(format!("stopping early: {reason}"));
            }
            SchedulerEvent::Finished { .. } => self.bar.set_message(tally.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CellId;

    #[tokio::test]
    async fn tallies_finished_cells() {
        let (tx, rx) = mpsc::channel(16);
        let handle = RunProgress::new(false).spawn(rx);

        tx.send(SchedulerEvent::Started {
            packages: 1,
            checkers: 2,
            total_cells: 3,
        })
        .await
        .unwrap();
        for (run, status) in [
            (0, CellStatus::Completed),
            (1, CellStatus::Failed),
            (2, CellStatus::Completed),
        ] {
            tx.send(SchedulerEvent::CellFinished {
                cell: CellId::new("p", "a", run),
                status,
                observations: 1,
            })
            .await
            .unwrap();
        }
        drop(tx);

        let tally = handle.await.unwrap();
        assert_eq!(
            tally,
            CellTally {
                completed: 2,
                failed: 1,
                interrupted: 0
            }
        );
    }
}
