//! Package preparation port.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::errors::PreparationError;
use crate::domain::models::PackageSpec;

/// Materializes a package working copy on disk.
#[async_trait]
pub trait PackagePreparer: Send + Sync {
    /// Return the root directory of a working copy of `spec`.
    async fn prepare(&self, spec: &PackageSpec) -> Result<PathBuf, PreparationError>;
}
