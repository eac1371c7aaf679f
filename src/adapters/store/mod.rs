//! Report persistence.

pub mod json_store;
pub mod retry;

pub use json_store::{IndexEntry, JsonReportStore, ReportIndex};
pub use retry::persist_with_retry;
