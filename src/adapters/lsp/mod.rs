//! Language Server Protocol adapter.

pub mod client;
pub mod codec;
pub mod definition;
pub mod launcher;

pub use client::{LspClient, LspSessionOptions};
pub use launcher::LspLauncher;
