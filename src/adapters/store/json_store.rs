//! Dated JSON artifacts with a `latest.json` alias and a digest index.
//!
//! Layout of the results directory:
//! - `benchmark_<YYYY-MM-DD>.json`: one report per date
//! - `latest.json`: byte-identical copy of the most recent report
//! - `index.json`: date -> file, SHA-256 and timestamp
//!
//! Every file is written to a temporary sibling, fsynced and renamed into
//! place, so readers never observe a partial artifact. A single process is
//! assumed to write a given directory at a time.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::StoreError;
use crate::domain::models::report::dated_file_name;
use crate::domain::models::{BenchmarkReport, ReportStatus};
use crate::domain::ports::{ReportKey, ReportStore};

const LATEST_FILE: &str = "latest.json";
const INDEX_FILE: &str = "index.json";

/// One stored report in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file: String,
    pub sha256: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: ReportStatus,
    #[serde(default)]
    pub run_id: Option<Uuid>,
}

/// Contents of `index.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIndex {
    #[serde(default)]
    pub reports: BTreeMap<NaiveDate, IndexEntry>,
}

/// File-system report store.
#[derive(Debug, Clone)]
pub struct JsonReportStore {
    dir: PathBuf,
}

impl JsonReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load `index.json`, or an empty index when none exists.
    pub async fn index(&self) -> Result<ReportIndex, StoreError> {
        let path = self.dir.join(INDEX_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ReportIndex::default()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn read_report(&self, file: &str, key: ReportKey) -> Result<Vec<u8>, StoreError> {
        let path = self.dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}

/// Hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

async fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
    let target = dir.join(name);
    let tmp = dir.join(format!(".{name}.{}.tmp", Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &target).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(target, e));
    }

    // Make the rename durable.
    if let Ok(handle) = tokio::fs::File::open(dir).await {
        if let Err(e) = handle.sync_all().await {
            debug!(dir = %dir.display(), error = %e, "directory fsync failed");
        }
    }
    Ok(())
}

#[async_trait]
impl ReportStore for JsonReportStore {
    async fn persist(&self, report: &BenchmarkReport) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let bytes = serde_json::to_vec_pretty(report)?;
        let file = report.file_name();

        write_atomic(&self.dir, &file, &bytes).await?;
        write_atomic(&self.dir, LATEST_FILE, &bytes).await?;

        let mut index = self.index().await.unwrap_or_else(|e| {
            warn!(error = %e, "unreadable report index, rebuilding");
            ReportIndex::default()
        });
        index.reports.insert(
            report.date,
            IndexEntry {
                file: file.clone(),
                sha256: digest(&bytes),
                timestamp: report.timestamp,
                status: report.status,
                run_id: report.run_id,
            },
        );
        let index_bytes = serde_json::to_vec_pretty(&index)?;
        write_atomic(&self.dir, INDEX_FILE, &index_bytes).await?;

        let path = self.dir.join(file);
        info!(path = %path.display(), bytes = bytes.len(), "report persisted");
        Ok(path)
    }

    async fn load(&self, key: ReportKey) -> Result<BenchmarkReport, StoreError> {
        let bytes = match key {
            ReportKey::Latest => self.read_report(LATEST_FILE, key).await?,
            ReportKey::Date(date) => {
                let bytes = self.read_report(&dated_file_name(date), key).await?;
                if let Some(entry) = self.index().await?.reports.get(&date) {
                    if entry.sha256 != digest(&bytes) {
                        return Err(StoreError::DigestMismatch {
                            date: key.to_string(),
                        });
                    }
                }
                bytes
            }
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn list_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut dates = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let date = name
                .strip_prefix("benchmark_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
            if let Some(date) = date {
                dates.push(date);
            }
        }
        dates.sort_unstable();
        Ok(dates)
    }
}
