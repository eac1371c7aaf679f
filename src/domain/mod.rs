//! Domain layer for the typebench benchmark engine
//!
//! This module contains the benchmark data model, the error taxonomy and the
//! port traits that adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{
    BenchError, BenchResult, PreparationError, SamplingError, StartupError, StoreError,
};
