//! Resolves checker versions and availability once per run.

use std::process::Stdio;
use std::time::Duration;

use futures::future::join_all;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::models::{Checker, CheckerConfig, CheckerTable};

/// Version string recorded for a checker whose probe printed nothing.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Pull a version out of `--version` output.
///
/// The first `major.minor.patch` triple wins; otherwise the second
/// whitespace-separated word (the first is usually the program name).
pub fn extract_version(output: &str) -> String {
    let output = output.trim();
    if output.is_empty() {
        return UNKNOWN_VERSION.to_string();
    }
    if let Some(triple) = find_semver_triple(output) {
        return triple.to_string();
    }
    let mut words = output.split_whitespace();
    let first = words.next().unwrap_or(UNKNOWN_VERSION);
    words.next().unwrap_or(first).to_string()
}

fn find_semver_triple(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        if !bytes[start].is_ascii_digit() {
            start += 1;
            continue;
        }
        // Parse `digits(.digits){2}` starting here.
        let mut end = start;
        let mut groups = 0;
        loop {
            let group_start = end;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end == group_start {
                break;
            }
            groups += 1;
            if groups == 3 || end >= bytes.len() || bytes[end] != b'.' {
                break;
            }
            end += 1;
        }
        if groups == 3 {
            return Some(&text[start..end]);
        }
        // Skip the rest of this digit run.
        while start < bytes.len() && bytes[start].is_ascii_digit() {
            start += 1;
        }
    }
    None
}

/// Probe one checker.
pub async fn probe(config: CheckerConfig, timeout: Duration) -> Checker {
    let program = config
        .version_command
        .clone()
        .unwrap_or_else(|| config.command.clone());

    let mut command = Command::new(&program);
    command
        .args(&config.version_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let text = if stdout.trim().is_empty() {
                String::from_utf8_lossy(&output.stderr).into_owned()
            } else {
                stdout.into_owned()
            };
            let version = extract_version(&text);
            debug!(checker = %config.key, %version, "resolved checker version");
            Checker::installed(config, version)
        }
        Ok(Err(e)) => {
            warn!(checker = %config.key, %program, error = %e, "checker not installed");
            Checker::unavailable(config, format!("{program}: {e}"))
        }
        Err(_) => {
            warn!(checker = %config.key, %program, "version probe timed out");
            Checker::unavailable(
                config,
                format!("{program} --version timed out after {}s", timeout.as_secs()),
            )
        }
    }
}

/// Probe every checker concurrently, keeping configuration order.
pub async fn resolve(configs: Vec<CheckerConfig>, timeout: Duration) -> CheckerTable {
    let checkers = join_all(configs.into_iter().map(|c| probe(c, timeout))).await;
    CheckerTable::new(checkers)
}
