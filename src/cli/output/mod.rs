//! CLI output formatting module
//!
//! Commands produce a serializable output value rendered either for humans
//! or as JSON.

pub mod progress;
pub mod table;

use serde::Serialize;

pub use progress::RunProgress;
pub use table::TableFormatter;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
        );
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to at most `max_len` characters, appending "..." if
/// truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Format an optional millisecond value.
pub fn fmt_ms(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |ms| format!("{ms:.1}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-package-name", 10), "a-very-...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn fmt_ms_handles_missing_values() {
        assert_eq!(fmt_ms(None), "-");
        assert_eq!(fmt_ms(Some(12.345)), "12.3");
    }
}
