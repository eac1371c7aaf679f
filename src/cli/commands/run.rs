//! `typebench run`: execute the benchmark and store the dated report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use console::style;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::lsp::{LspLauncher, LspSessionOptions};
use crate::adapters::packages::GitClonePreparer;
use crate::adapters::store::{persist_with_retry, JsonReportStore};
use crate::cli::commands::checkers::select_configs;
use crate::cli::output::{output, CommandOutput, RunProgress, TableFormatter};
use crate::cli::types::RunArgs;
use crate::cli::{EXIT_OK, EXIT_PARTIAL};
use crate::domain::errors::BenchError;
use crate::domain::models::{
    BenchmarkReport, Checker, CheckerTable, Config, PackageSpec, RequestKind, ReportStatus,
};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{version_probe, Budget, RunExecutor, Scheduler, SchedulerConfig};

const PERSIST_INITIAL_INTERVAL: Duration = Duration::from_millis(200);

/// Fold command-line overrides into the loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(n) = args.packages {
        config.package_count = n;
    }
    if let Some(runs) = args.runs {
        config.runs_per_package = runs;
    }
    if let Some(samples) = args.samples {
        config.samples_per_run = samples;
    }
    if !args.checkers.is_empty() {
        config.enabled_checkers.clone_from(&args.checkers);
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = concurrency;
    }
    if let Some(secs) = args.timeout {
        config.timeouts.request_secs = secs;
    }
    if let Some(kind) = args.kind {
        config.request_kind = kind.into();
    }
    if let Some(secs) = args.max_wall_clock {
        config.budget.max_wall_clock_secs = Some(secs);
    }
    if let Some(cells) = args.max_cells {
        config.budget.max_cells = Some(cells);
    }
    if let Some(dir) = &args.output_dir {
        config.store.results_dir.clone_from(dir);
    }
    if let Some(dir) = &args.workspace {
        config.workspace_dir = Some(dir.clone());
    }
    if let Some(path) = &args.packages_file {
        config.packages_file = Some(path.clone());
    }
    if args.no_raw {
        config.store.include_raw = false;
    }
}

/// Scheduler settings derived from configuration.
pub fn scheduler_config(config: &Config, seed_date: NaiveDate) -> SchedulerConfig {
    SchedulerConfig {
        package_count: config.package_count,
        runs_per_package: config.runs_per_package,
        samples_per_run: config.samples_per_run,
        max_concurrency: config.max_concurrency,
        max_file_tries: config.sampling.max_file_tries,
        seed_date,
        budget: Budget {
            max_wall_clock: config.budget.max_wall_clock(),
            max_cells: config.budget.max_cells,
        },
        include_raw: config.store.include_raw,
    }
}

/// Session timing derived from configuration.
pub const fn session_options(config: &Config) -> LspSessionOptions {
    LspSessionOptions {
        startup_timeout: config.timeouts.startup(),
        request_timeout: config.timeouts.request(),
        shutdown_grace: config.timeouts.shutdown_grace(),
        didopen_warmup: config.sampling.didopen_warmup(),
    }
}

/// Refuse to run when no selected checker could be resolved.
pub fn require_available(checkers: &CheckerTable) -> Result<(), BenchError> {
    if checkers.is_empty() {
        return Err(BenchError::NoCheckers);
    }
    if checkers.iter().any(Checker::is_available) {
        return Ok(());
    }
    Err(BenchError::NoCheckersAvailable(checkers.keys().join(", ")))
}

#[derive(Debug, Serialize)]
pub struct DryRunOutput {
    pub seed_date: NaiveDate,
    pub request_kind: RequestKind,
    pub runs_per_package: u32,
    pub samples_per_run: u32,
    pub total_cells: usize,
    pub checkers: Vec<Checker>,
    pub packages: Vec<PackageSpec>,
}

impl CommandOutput for DryRunOutput {
    fn to_human(&self) -> String {
        let packages = self
            .packages
            .iter()
            .map(|p| {
                let source = p
                    .local_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .or_else(|| p.github_url.clone())
                    .unwrap_or_default();
                format!(
                    "  {:>3}. {} ({source})",
                    p.ranking.map_or_else(|| "-".to_string(), |r| r.to_string()),
                    p.name
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{}\n{}\nPackages:\n{packages}\n\n{} cells: {} packages x {} checkers x {} runs, {} {} request(s) per run, seed date {}",
            style("Dry run, nothing executed").bold(),
            TableFormatter::new().format_checkers(&self.checkers),
            self.total_cells,
            self.packages.len(),
            self.checkers.len(),
            self.runs_per_package,
            self.samples_per_run,
            self.request_kind,
            self.seed_date,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub path: PathBuf,
    pub status: ReportStatus,
    pub stop_reason: Option<String>,
    #[serde(skip)]
    pub report: BenchmarkReport,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let status = match (self.status, &self.stop_reason) {
            (ReportStatus::Complete, _) => style("complete".to_string()).green(),
            (ReportStatus::Partial, Some(reason)) => style(format!("partial ({reason})")).yellow(),
            (ReportStatus::Partial, None) => style("partial".to_string()).yellow(),
        };
        format!(
            "{}\nRun {} on {}: {} packages, {status}\nSaved to {}",
            TableFormatter::new().format_aggregate(&self.report),
            self.report
                .run_id
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
            self.report.date,
            self.report.package_count,
            self.path.display(),
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "path": self.path,
            "status": self.status,
            "stop_reason": self.stop_reason,
            "date": self.report.date,
            "run_id": self.report.run_id,
            "package_count": self.report.package_count,
            "aggregate": self.report.aggregate,
        })
    }
}

pub async fn execute(args: RunArgs, mut config: Config, json_mode: bool) -> Result<i32> {
    apply_overrides(&mut config, &args);
    ConfigLoader::validate(&config).context("Invalid run configuration")?;

    let seed_date = args.seed_date.unwrap_or_else(|| Utc::now().date_naive());
    let specs = ConfigLoader::resolve_packages(&config)?;

    let configured = select_configs(&config, &config.enabled_checkers)?;
    let checkers: CheckerTable =
        version_probe::resolve(configured, config.timeouts.version()).await;
    require_available(&checkers)?;
    for checker in checkers.iter().filter(|c| !c.is_available()) {
        warn!(checker = %checker.key(), version = %checker.version, "checker not installed, its cells will fail");
    }

    let sched_config = scheduler_config(&config, seed_date);

    if args.dry_run {
        let mut planned = specs;
        planned.sort_by_key(|s| s.ranking.unwrap_or(u32::MAX));
        planned.truncate(config.package_count);
        let total_cells = planned.len() * checkers.len() * config.runs_per_package as usize;
        output(
            &DryRunOutput {
                seed_date,
                request_kind: config.request_kind,
                runs_per_package: config.runs_per_package,
                samples_per_run: config.samples_per_run,
                total_cells,
                checkers: checkers.iter().cloned().collect(),
                packages: planned,
            },
            json_mode,
        );
        return Ok(EXIT_OK);
    }

    // Held until the run ends so a temporary workspace outlives every cell.
    let temp_workspace;
    let workspace = if let Some(dir) = &config.workspace_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create workspace {}", dir.display()))?;
        dir.clone()
    } else {
        temp_workspace = tempfile::Builder::new()
            .prefix("typebench-")
            .tempdir()
            .context("Failed to create temporary workspace")?;
        temp_workspace.path().to_path_buf()
    };
    info!(workspace = %workspace.display(), "using package workspace");

    let preparer = Arc::new(GitClonePreparer::new(workspace, config.timeouts.prepare()));
    let launcher = Arc::new(LspLauncher::new(session_options(&config)));
    let executor = RunExecutor::new(launcher, config.request_kind);

    let (events_tx, events_rx) = mpsc::channel(256);
    let progress = RunProgress::new(!json_mode && console::Term::stderr().is_term()).spawn(events_rx);
    let scheduler = Scheduler::new(checkers, executor, preparer, sched_config).with_events(events_tx);

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping run");
                cancel.cancel();
            }
        })
    };

    let result = scheduler.run(&specs, &cancel).await;
    interrupt.abort();
    drop(scheduler);
    let _ = progress.await;
    let report = result?;

    let store = JsonReportStore::new(&config.store.results_dir);
    let path = persist_with_retry(
        &store,
        &report,
        PERSIST_INITIAL_INTERVAL,
        Duration::from_secs(config.store.persist_max_elapsed_secs),
    )
    .await
    .context("Failed to store report")?;
    info!(path = %path.display(), status = ?report.status, "report stored");

    let code = if report.is_complete() {
        EXIT_OK
    } else {
        EXIT_PARTIAL
    };
    output(
        &RunOutput {
            path,
            status: report.status,
            stop_reason: report.stop_reason.clone(),
            report,
        },
        json_mode,
    );
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::types::KindArg;
    use crate::domain::models::CheckerConfig;

    #[test]
    fn overrides_replace_configured_values() {
        let mut config = Config::default();
        let args = RunArgs {
            packages: Some(3),
            runs: Some(2),
            samples: Some(4),
            checkers: vec!["ty".to_string()],
            concurrency: Some(8),
            timeout: Some(1),
            kind: Some(KindArg::Diagnostics),
            max_cells: Some(5),
            no_raw: true,
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);

        assert_eq!(config.package_count, 3);
        assert_eq!(config.runs_per_package, 2);
        assert_eq!(config.samples_per_run, 4);
        assert_eq!(config.enabled_checkers, vec!["ty"]);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.timeouts.request_secs, 1);
        assert_eq!(config.request_kind, RequestKind::Diagnostics);
        assert_eq!(config.budget.max_cells, Some(5));
        assert!(!config.store.include_raw);
    }

    #[test]
    fn absent_overrides_keep_configuration() {
        let mut config = Config::default();
        apply_overrides(&mut config, &RunArgs::default());
        assert_eq!(config.runs_per_package, 5);
        assert!(config.enabled_checkers.is_empty());
        assert!(config.store.include_raw);
    }

    #[test]
    fn run_refuses_when_no_checker_is_installed() {
        let table = CheckerTable::new(vec![
            Checker::unavailable(CheckerConfig::new("ty", "ty", &["server"]), "not found"),
            Checker::unavailable(CheckerConfig::new("zuban", "zuban", &["server"]), "not found"),
        ]);
        let err = require_available(&table).unwrap_err();
        assert!(matches!(err, BenchError::NoCheckersAvailable(ref keys) if keys == "ty, zuban"));
        assert!(matches!(
            require_available(&CheckerTable::default()),
            Err(BenchError::NoCheckers)
        ));
    }

    #[test]
    fn one_installed_checker_is_enough() {
        let table = CheckerTable::new(vec![
            Checker::unavailable(CheckerConfig::new("ty", "ty", &["server"]), "not found"),
            Checker::installed(
                CheckerConfig::new("pyright", "pyright-langserver", &["--stdio"]),
                "1.1.400",
            ),
        ]);
        assert!(require_available(&table).is_ok());
    }

    #[test]
    fn scheduler_config_carries_budget() {
        let mut config = Config::default();
        config.budget.max_wall_clock_secs = Some(60);
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let sched = scheduler_config(&config, date);
        assert_eq!(sched.budget.max_wall_clock, Some(Duration::from_secs(60)));
        assert_eq!(sched.seed_date, date);
        assert_eq!(sched.max_file_tries, 50);
    }
}
