//! Package specifications and materialized packages.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A package to benchmark, before it is materialized on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PackageSpec {
    /// Package name as published
    pub name: String,

    /// Source repository URL
    #[serde(default)]
    pub github_url: Option<String>,

    /// Local directory to use instead of fetching
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Popularity ranking (lower is more popular)
    #[serde(default)]
    pub ranking: Option<u32>,
}

impl PackageSpec {
    pub fn github(name: impl Into<String>, url: impl Into<String>, ranking: u32) -> Self {
        Self {
            name: name.into(),
            github_url: Some(url.into()),
            local_path: None,
            ranking: Some(ranking),
        }
    }

    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>, ranking: u32) -> Self {
        Self {
            name: name.into(),
            github_url: None,
            local_path: Some(path.into()),
            ranking: Some(ranking),
        }
    }

    /// Popular packages used when no package list is configured.
    pub fn fallback_list() -> Vec<Self> {
        [
            ("requests", "https://github.com/psf/requests"),
            ("flask", "https://github.com/pallets/flask"),
            ("django", "https://github.com/django/django"),
            ("fastapi", "https://github.com/fastapi/fastapi"),
            ("pydantic", "https://github.com/pydantic/pydantic"),
            ("numpy", "https://github.com/numpy/numpy"),
            ("pandas", "https://github.com/pandas-dev/pandas"),
            ("click", "https://github.com/pallets/click"),
            ("httpx", "https://github.com/encode/httpx"),
            ("aiohttp", "https://github.com/aio-libs/aiohttp"),
        ]
        .into_iter()
        .zip(1..)
        .map(|((name, url), rank)| Self::github(name, url, rank))
        .collect()
    }
}

/// A package materialized on disk, read-only for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub spec: PackageSpec,
    /// Root of the working copy
    pub root: PathBuf,
    /// Sorted paths, relative to `root`, eligible for sampling
    pub candidate_files: Vec<PathBuf>,
    /// Whether the package ships inline annotations (`py.typed`)
    pub has_inline_annotations: bool,
}

impl Package {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a candidate file.
    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}
