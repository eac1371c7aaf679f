//! Checker process port.
//!
//! A launcher turns a resolved [`Checker`] into a live session bound to one
//! package working copy. Sessions are owned by exactly one run executor and
//! never shared.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::StartupError;
use crate::domain::models::{Checker, RequestKind, RequestResult, Sample};

/// Starts checker sessions.
#[async_trait]
pub trait CheckerLauncher: Send + Sync {
    /// Launch the checker against `workspace_root` and complete the
    /// initialize handshake.
    async fn start(
        &self,
        checker: &Checker,
        workspace_root: &Path,
    ) -> Result<Box<dyn CheckerSession>, StartupError>;
}

/// A running checker process.
#[async_trait]
pub trait CheckerSession: Send {
    /// Issue one request for `sample`.
    ///
    /// Never fails: timeouts and protocol errors are reported as outcomes, and
    /// the session stays usable afterwards.
    async fn request(&mut self, sample: &Sample, kind: RequestKind) -> RequestResult;

    /// Shut the process down. Idempotent.
    async fn stop(&mut self);

    /// OS process id, when the session is backed by a process.
    fn pid(&self) -> Option<u32> {
        None
    }
}
