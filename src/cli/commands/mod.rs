//! CLI command implementations.

pub mod checkers;
pub mod run;
pub mod show;
pub mod variance;
