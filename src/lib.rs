//! typebench - benchmark orchestrator for Python type checkers
//!
//! typebench drives type-checker language servers over a matrix of packages,
//! checkers and runs, issuing protocol requests at sampled identifier
//! positions and aggregating latency and correctness into a dated report.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): benchmark data model, errors and port traits
//! - **Adapters** (`adapters`): LSP sessions, package preparation, report store
//! - **Service Layer** (`services`): sampling, scheduling and aggregation
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use typebench::adapters::lsp::LspLauncher;
//! use typebench::adapters::packages::LocalPreparer;
//! use typebench::services::{RunExecutor, Scheduler, SchedulerConfig};
//!
//! let executor = RunExecutor::new(Arc::new(LspLauncher::default()), RequestKind::Definition);
//! let scheduler = Scheduler::new(checkers, executor, Arc::new(LocalPreparer::default()), config);
//! let report = scheduler.run(&packages, &CancellationToken::new()).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{BenchError, BenchResult};
pub use domain::models::{
    BenchmarkReport, Checker, CheckerConfig, CheckerTable, Config, Package, PackageSpec,
    RequestKind, Sample,
};
pub use domain::ports::{CheckerLauncher, CheckerSession, PackagePreparer, ReportStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Aggregator, RunExecutor, Scheduler, SchedulerConfig};
