//! Package preparers: shallow git clones and local directories.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::errors::PreparationError;
use crate::domain::models::PackageSpec;
use crate::domain::ports::PackagePreparer;

/// Uses directories that already exist on disk.
///
/// A spec resolves to its `local_path`, or to `<base_dir>/<name>` when a base
/// directory is configured.
#[derive(Debug, Clone, Default)]
pub struct LocalPreparer {
    base_dir: Option<PathBuf>,
}

impl LocalPreparer {
    pub const fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    fn resolve(&self, spec: &PackageSpec) -> Option<PathBuf> {
        spec.local_path
            .clone()
            .or_else(|| self.base_dir.as_ref().map(|base| base.join(&spec.name)))
    }
}

#[async_trait]
impl PackagePreparer for LocalPreparer {
    async fn prepare(&self, spec: &PackageSpec) -> Result<PathBuf, PreparationError> {
        let path = self
            .resolve(spec)
            .ok_or_else(|| PreparationError::MissingSource(spec.name.clone()))?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            _ => Err(PreparationError::MissingDirectory(path)),
        }
    }
}

/// Shallow-clones packages from their repository URL into a workspace.
///
/// Specs with a `local_path` are used in place.
#[derive(Debug, Clone)]
pub struct GitClonePreparer {
    workspace: PathBuf,
    timeout: Duration,
}

impl GitClonePreparer {
    pub fn new(workspace: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workspace: workspace.into(),
            timeout,
        }
    }

    async fn clone_into(&self, url: &str, dest: &Path) -> Result<(), PreparationError> {
        let fetch_failed = |message: String| PreparationError::FetchFailed {
            url: url.to_string(),
            message,
        };

        tokio::fs::create_dir_all(&self.workspace)
            .await
            .map_err(|e| fetch_failed(format!("cannot create workspace: {e}")))?;

        let mut command = Command::new("git");
        command
            .args(["clone", "--depth", "1", "--quiet", url])
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(fetch_failed(format!("cannot run git: {e}"))),
            Err(_) => {
                let _ = tokio::fs::remove_dir_all(dest).await;
                return Err(PreparationError::FetchTimeout {
                    url: url.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            let _ = tokio::fs::remove_dir_all(dest).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(fetch_failed(format!(
                "git clone exited with {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl PackagePreparer for GitClonePreparer {
    async fn prepare(&self, spec: &PackageSpec) -> Result<PathBuf, PreparationError> {
        if spec.local_path.is_some() {
            return LocalPreparer::default().prepare(spec).await;
        }
        let url = spec
            .github_url
            .as_deref()
            .ok_or_else(|| PreparationError::MissingSource(spec.name.clone()))?;

        let dest = self.workspace.join(&spec.name);
        if tokio::fs::metadata(dest.join(".git")).await.is_ok() {
            debug!(package = %spec.name, path = %dest.display(), "reusing existing clone");
            return Ok(dest);
        }

        info!(package = %spec.name, %url, "cloning package");
        self.clone_into(url, &dest).await?;
        Ok(dest)
    }
}
