//! `typebench checkers`: probe the configured checkers and list them.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::cli::types::CheckersArgs;
use crate::cli::EXIT_OK;
use crate::domain::errors::BenchError;
use crate::domain::models::{Checker, CheckerConfig, Config};
use crate::services::version_probe;

#[derive(Debug, Serialize)]
pub struct CheckersOutput {
    pub checkers: Vec<Checker>,
}

impl CommandOutput for CheckersOutput {
    fn to_human(&self) -> String {
        if self.checkers.is_empty() {
            return "No checkers configured".to_string();
        }
        TableFormatter::new().format_checkers(&self.checkers)
    }
}

/// The configured checkers restricted to `keys`, in configuration order.
pub fn select_configs(config: &Config, keys: &[String]) -> Result<Vec<CheckerConfig>, BenchError> {
    if let Some(unknown) = keys
        .iter()
        .find(|k| !config.checkers.iter().any(|c| &c.key == *k))
    {
        return Err(BenchError::UnknownChecker(unknown.clone()));
    }
    Ok(config
        .checkers
        .iter()
        .filter(|c| keys.is_empty() || keys.contains(&c.key))
        .cloned()
        .collect())
}

pub async fn execute(args: CheckersArgs, config: &Config, json_mode: bool) -> Result<i32> {
    let configs = select_configs(config, &args.checkers)?;
    let table = version_probe::resolve(configs, config.timeouts.version()).await;
    output(
        &CheckersOutput {
            checkers: table.iter().cloned().collect(),
        },
        json_mode,
    );
    Ok(EXIT_OK)
}
