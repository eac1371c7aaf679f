//! `typebench show`: print a stored report.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use console::style;
use serde::Serialize;

use crate::adapters::store::JsonReportStore;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::cli::types::ShowArgs;
use crate::cli::EXIT_OK;
use crate::domain::models::{BenchmarkReport, Config, ReportStatus};
use crate::domain::ports::{ReportKey, ReportStore};

#[derive(Debug, Serialize)]
pub struct ShowOutput {
    #[serde(flatten)]
    pub report: BenchmarkReport,
    #[serde(skip)]
    pub package: Option<String>,
}

impl CommandOutput for ShowOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let status = match (report.status, &report.stop_reason) {
            (ReportStatus::Complete, _) => "complete".to_string(),
            (ReportStatus::Partial, Some(reason)) => format!("partial ({reason})"),
            (ReportStatus::Partial, None) => "partial".to_string(),
        };
        let formatter = TableFormatter::new();
        let mut out = format!(
            "{} {}  {} packages, {status}\n",
            style("Benchmark").bold(),
            report.date,
            report.package_count,
        );
        if self.package.is_none() {
            out.push_str(&formatter.format_aggregate(report));
            out.push('\n');
        }
        out.push_str(&formatter.format_packages(report, self.package.as_deref()));
        out
    }

    fn to_json(&self) -> serde_json::Value {
        match &self.package {
            Some(name) => serde_json::to_value(self.report.package(name)).unwrap_or_default(),
            None => serde_json::to_value(&self.report).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DateListOutput {
    pub dates: Vec<NaiveDate>,
}

impl CommandOutput for DateListOutput {
    fn to_human(&self) -> String {
        if self.dates.is_empty() {
            return "No stored reports".to_string();
        }
        self.dates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub async fn execute(args: ShowArgs, config: &Config, json_mode: bool) -> Result<i32> {
    let dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.store.results_dir.clone());
    let store = JsonReportStore::new(dir);

    if args.list {
        let dates = store.list_dates().await?;
        output(&DateListOutput { dates }, json_mode);
        return Ok(EXIT_OK);
    }

    let key = args.date.map_or(ReportKey::Latest, ReportKey::Date);
    let report = store
        .load(key)
        .await
        .with_context(|| format!("Failed to load report {key}"))?;

    if let Some(name) = &args.package {
        if report.package(name).is_none() {
            anyhow::bail!("Package {name} is not in report {key}");
        }
    }

    output(
        &ShowOutput {
            report,
            package: args.package,
        },
        json_mode,
    );
    Ok(EXIT_OK)
}
