//! Table output formatting for CLI commands
//!
//! Renders aggregates, per-package results, checkers and variance analyses
//! using comfy-table. Colors are dropped when `NO_COLOR` is set or the
//! terminal is dumb.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use super::{fmt_ms, truncate};
use crate::domain::models::{BenchmarkReport, Checker, CheckerResult, RunAggregate};
use crate::services::{VarianceEntry, VarianceReport};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// One row per checker with its run-wide aggregate.
    pub fn format_aggregate(&self, report: &BenchmarkReport) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "Checker", "Version", "Packages", "Failed", "Requests", "Valid %", "OK %",
            "Avg ms", "Min ms", "Max ms",
        ]));

        for checker in &report.type_checkers {
            let version = report
                .type_checker_versions
                .get(checker)
                .map_or("-", String::as_str);
            let Some(agg) = report.aggregate.get(checker) else {
                table.add_row(vec![
                    Cell::new(checker),
                    Cell::new(version),
                    Cell::new("-"),
                ]);
                continue;
            };
            table.add_row(vec![
                Cell::new(checker).add_attribute(Attribute::Bold),
                Cell::new(version),
                Cell::new(agg.packages_tested),
                self.failed_cell(agg),
                Cell::new(agg.total_runs),
                self.rate_cell(agg.success_rate),
                Cell::new(format!("{:.1}", agg.ok_rate)),
                Cell::new(fmt_ms(agg.avg_latency_ms)),
                Cell::new(fmt_ms(agg.min_latency_ms)),
                Cell::new(fmt_ms(agg.max_latency_ms)),
            ]);
        }

        table.to_string()
    }

    /// One row per (package, checker) pair.
    pub fn format_packages(&self, report: &BenchmarkReport, only: Option<&str>) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "#", "Package", "Checker", "Runs", "Valid %", "Found %", "p50 ms", "p95 ms",
            "Mean ms", "Error",
        ]));

        for result in report
            .results
            .iter()
            .filter(|r| only.is_none_or(|name| r.package_name == name))
        {
            let rank = result.ranking.map_or_else(|| "-".to_string(), |r| r.to_string());
            if let Some(error) = &result.error {
                table.add_row(vec![
                    Cell::new(&rank),
                    Cell::new(truncate(&result.package_name, 30)),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    self.error_cell(error),
                ]);
                continue;
            }
            for (checker, metrics) in &result.metrics {
                let counts = metrics.counts();
                let latency = metrics.latency();
                let error = match metrics {
                    CheckerResult::Measured(_) => Cell::new(""),
                    CheckerResult::Failed(f) => self.error_cell(&f.error_message),
                };
                table.add_row(vec![
                    Cell::new(&rank),
                    Cell::new(truncate(&result.package_name, 30)),
                    Cell::new(checker),
                    Cell::new(counts.runs),
                    self.rate_cell(counts.valid_pct),
                    Cell::new(format!("{:.1}", counts.found_pct)),
                    Cell::new(fmt_ms(latency.map(|l| l.p50))),
                    Cell::new(fmt_ms(latency.map(|l| l.p95))),
                    Cell::new(fmt_ms(latency.map(|l| l.mean))),
                    error,
                ]);
            }
        }

        table.to_string()
    }

    pub fn format_checkers(&self, checkers: &[Checker]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Key", "Name", "Command", "Version", "Status"]));

        for checker in checkers {
            let command = std::iter::once(checker.config.command.as_str())
                .chain(checker.config.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ");
            let status = if checker.is_available() {
                self.colored("installed", Color::Green)
            } else {
                self.colored("not installed", Color::Red)
            };
            table.add_row(vec![
                Cell::new(checker.key()),
                Cell::new(checker.display_name()),
                Cell::new(truncate(&command, 40)),
                Cell::new(&checker.version),
                status,
            ]);
        }

        table.to_string()
    }

    /// Per-checker stability ranking followed by the high-variance series.
    pub fn format_variance(&self, report: &VarianceReport, threshold_pct: f64) -> String {
        let mut stability = self.create_base_table();
        stability.set_header(header(&[
            "Checker", "Packages", "Avg CV %", "Avg stddev", "Avg range",
        ]));
        for checker in &report.checkers {
            stability.add_row(vec![
                Cell::new(&checker.checker).add_attribute(Attribute::Bold),
                Cell::new(checker.packages),
                self.cv_cell(checker.avg_cv_pct, threshold_pct),
                Cell::new(format!("{:.2}", checker.avg_stddev)),
                Cell::new(format!("{:.2}", checker.avg_range)),
            ]);
        }

        let high = report.high_variance(threshold_pct);
        if high.is_empty() {
            return format!(
                "{stability}\n\nNo series above {threshold_pct:.1}% CV"
            );
        }
        format!(
            "{stability}\n\nSeries above {threshold_pct:.1}% CV:\n{}",
            self.format_entries(&high, threshold_pct)
        )
    }

    fn format_entries(&self, entries: &[&VarianceEntry], threshold_pct: f64) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "Package", "Checker", "Days", "Mean %", "Stddev", "CV %", "Min", "Max",
        ]));
        for entry in entries {
            table.add_row(vec![
                Cell::new(truncate(&entry.package, 30)),
                Cell::new(&entry.checker),
                Cell::new(entry.stats.n),
                Cell::new(format!("{:.1}", entry.stats.mean)),
                Cell::new(format!("{:.2}", entry.stats.stddev)),
                self.cv_cell(entry.stats.cv_pct, threshold_pct),
                Cell::new(format!("{:.1}", entry.stats.min)),
                Cell::new(format!("{:.1}", entry.stats.max)),
            ]);
        }
        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }

    fn colored(&self, text: &str, color: Color) -> Cell {
        if self.use_colors {
            Cell::new(text).fg(color)
        } else {
            Cell::new(text)
        }
    }

    fn rate_cell(&self, pct: f64) -> Cell {
        let color = if pct >= 90.0 {
            Color::Green
        } else if pct >= 50.0 {
            Color::Yellow
        } else {
            Color::Red
        };
        self.colored(&format!("{pct:.1}"), color)
    }

    fn cv_cell(&self, cv_pct: f64, threshold_pct: f64) -> Cell {
        let color = if cv_pct > threshold_pct {
            Color::Red
        } else {
            Color::Green
        };
        self.colored(&format!("{cv_pct:.1}"), color)
    }

    fn failed_cell(&self, agg: &RunAggregate) -> Cell {
        if agg.packages_failed > 0 {
            self.colored(&agg.packages_failed.to_string(), Color::Red)
        } else {
            Cell::new(0)
        }
    }

    fn error_cell(&self, error: &str) -> Cell {
        self.colored(&truncate(error, 50), Color::Red)
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).add_attribute(Attribute::Bold))
        .collect()
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CheckerConfig;

    #[test]
    fn checkers_table_shows_availability() {
        let checkers = vec![
            Checker::installed(CheckerConfig::new("ty", "ty", &["server"]), "0.0.1"),
            Checker::unavailable(CheckerConfig::new("zuban", "zuban", &["server"]), "missing"),
        ];
        let rendered = TableFormatter::with_config(false, Some(120)).format_checkers(&checkers);
        assert!(rendered.contains("ty server"));
        assert!(rendered.contains("0.0.1"));
        assert!(rendered.contains("not installed"));
    }

    #[test]
    fn empty_variance_reports_no_series() {
        let rendered =
            TableFormatter::with_config(false, None).format_variance(&VarianceReport::default(), 10.0);
        assert!(rendered.contains("No series above 10.0% CV"));
    }
}
