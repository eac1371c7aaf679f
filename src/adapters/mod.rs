//! Infrastructure adapters for external systems.

pub mod lsp;
pub mod mock;
pub mod packages;
pub mod store;
