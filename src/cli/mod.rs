//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use console::style;

/// Every scheduled cell ran.
pub const EXIT_OK: i32 = 0;
/// Configuration, preparation of the run, or persistence failed.
pub const EXIT_FAILURE: i32 = 1;
/// The report was stored but is partial.
pub const EXIT_PARTIAL: i32 = 2;

/// Print `err` with its cause chain and return the failure exit code.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> i32 {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        println!(
            "{}",
            serde_json::json!({ "error": err.to_string(), "causes": causes })
        );
    } else {
        eprintln!("{} {err}", style("Error:").red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    EXIT_FAILURE
}
