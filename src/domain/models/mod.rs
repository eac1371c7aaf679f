pub mod checker;
pub mod config;
pub mod metrics;
pub mod observation;
pub mod package;
pub mod report;
pub mod sample;

pub use checker::{
    Availability, Checker, CheckerConfig, CheckerTable, ProtocolDialect, RequestKind,
};
pub use config::{
    BudgetConfig, Config, LoggingConfig, SamplingConfig, StoreConfig, TimeoutConfig,
};
pub use metrics::{
    CheckerFailure, CheckerResult, LatencySummary, OutcomeCounts, PackageCheckerMetrics,
    RunAggregate,
};
pub use observation::{
    CellId, CellOutcome, CellRecord, CellStatus, Observation, RequestOutcome, RequestResult,
    ResolvedLocation, ResponsePayload,
};
pub use package::{Package, PackageSpec};
pub use report::{BenchmarkReport, PackageResult, RawResults, ReportStatus, SCHEMA_VERSION};
pub use sample::{Position, Sample, SymbolKind};
