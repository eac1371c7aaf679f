//! `typebench variance`: day-to-day stability of stored results.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::store::JsonReportStore;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::cli::types::VarianceArgs;
use crate::cli::EXIT_OK;
use crate::domain::models::Config;
use crate::services::{variance, VarianceEntry, VarianceReport};

#[derive(Debug, Serialize)]
pub struct VarianceOutput {
    pub threshold_pct: f64,
    #[serde(flatten)]
    pub report: VarianceReport,
    pub high_variance: Vec<VarianceEntry>,
}

impl CommandOutput for VarianceOutput {
    fn to_human(&self) -> String {
        if self.report.days < 2 {
            return format!(
                "Variance needs at least two stored reports, found {}",
                self.report.days
            );
        }
        format!(
            "Variance across {} days\n{}",
            self.report.days,
            TableFormatter::new().format_variance(&self.report, self.threshold_pct)
        )
    }
}

pub async fn execute(args: VarianceArgs, config: &Config, json_mode: bool) -> Result<i32> {
    let dir = args
        .output_dir
        .unwrap_or_else(|| config.store.results_dir.clone());
    let store = JsonReportStore::new(dir);

    let report = variance::analyze_store(&store, args.last)
        .await
        .context("Failed to read stored reports")?;
    let high_variance = report
        .high_variance(args.threshold)
        .into_iter()
        .cloned()
        .collect();

    output(
        &VarianceOutput {
            threshold_pct: args.threshold,
            report,
            high_variance,
        },
        json_mode,
    );
    Ok(EXIT_OK)
}
