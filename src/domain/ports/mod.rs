//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces implemented by adapters:
//! - CheckerLauncher / CheckerSession: checker processes
//! - PackagePreparer: package working copies
//! - ReportStore: report persistence

pub mod checker;
pub mod package_preparer;
pub mod report_store;

pub use checker::{CheckerLauncher, CheckerSession};
pub use package_preparer::PackagePreparer;
pub use report_store::{ReportKey, ReportStore};
