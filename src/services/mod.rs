//! Benchmark services: sampling, execution, scheduling and aggregation.

pub mod aggregator;
pub mod run_executor;
pub mod sample_selector;
pub mod scheduler;
pub mod stats;
pub mod variance;
pub mod version_probe;

pub use aggregator::{Aggregator, PackageMeta, ReportMeta};
pub use run_executor::RunExecutor;
pub use sample_selector::{discover_candidate_files, select_samples, SampleSet};
pub use scheduler::{Budget, Scheduler, SchedulerConfig, SchedulerEvent, StopReason};
pub use variance::{CheckerStability, VarianceEntry, VarianceReport};
