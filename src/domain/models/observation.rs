//! Raw observations and cell records.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::sample::{Position, Sample};

/// One (package, checker, run-index) unit of scheduled work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId {
    pub package: String,
    pub checker: String,
    pub run_index: u32,
}

impl CellId {
    pub fn new(package: impl Into<String>, checker: impl Into<String>, run_index: u32) -> Self {
        Self {
            package: package.into(),
            checker: checker.into(),
            run_index,
        }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.package, self.checker, self.run_index)
    }
}

/// A location returned by a checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub uri: String,
    pub start: Position,
    pub end: Position,
    pub valid: bool,
}

/// Normalized payload of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Locations { locations: Vec<ResolvedLocation> },
    Diagnostics { items: usize },
}

/// Outcome of one request, as seen by the run executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// The checker answered with at least one usable result.
    Valid { payload: ResponsePayload },
    /// The checker answered, but with no result.
    NotFound,
    /// The checker answered with results none of which are usable.
    InvalidResponse { found: usize, detail: String },
    /// No response within the per-request timeout.
    Timeout,
    /// The checker returned an error or the transport failed.
    ProtocolError { message: String },
}

impl RequestOutcome {
    /// The request completed (no timeout, no protocol error).
    pub const fn is_ok(&self) -> bool {
        matches!(
            self,
            Self::Valid { .. } | Self::NotFound | Self::InvalidResponse { .. }
        )
    }

    /// The checker returned at least one result.
    pub const fn is_found(&self) -> bool {
        match self {
            Self::Valid { .. } => true,
            Self::InvalidResponse { found, .. } => *found > 0,
            _ => false,
        }
    }

    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Short classification used in error summaries.
    pub const fn class(&self) -> &'static str {
        match self {
            Self::Valid { .. } => "valid",
            Self::NotFound => "not_found",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::Timeout => "timeout",
            Self::ProtocolError { .. } => "protocol_error",
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::InvalidResponse { detail, .. } => Some(detail.clone()),
            Self::Timeout => Some("request timed out".to_string()),
            Self::ProtocolError { message } => Some(message.clone()),
            _ => None,
        }
    }
}

/// Latency and outcome of one adapter request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestResult {
    pub latency: Duration,
    pub outcome: RequestOutcome,
}

/// The atomic unit of measurement. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub cell: CellId,
    pub sample_index: u32,
    pub sample: Sample,
    #[serde(with = "duration_nanos")]
    pub latency: Duration,
    pub outcome: RequestOutcome,
}

impl Observation {
    pub fn new(cell: CellId, sample_index: u32, sample: Sample, result: RequestResult) -> Self {
        Self {
            cell,
            sample_index,
            sample,
            latency: result.latency,
            outcome: result.outcome,
        }
    }

    pub const fn success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Terminal state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Every sample was issued.
    Completed,
    /// The cell failed before producing observations (e.g. startup failure).
    Failed,
    /// Cancellation stopped the cell early.
    Interrupted,
}

/// Record of one cell, kept so denominators can be rebuilt from the raw set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub cell: CellId,
    pub status: CellStatus,
    pub observations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CellRecord {
    pub const fn completed(cell: CellId, observations: u32) -> Self {
        Self {
            cell,
            status: CellStatus::Completed,
            observations,
            error: None,
        }
    }

    pub fn failed(cell: CellId, error: impl Into<String>) -> Self {
        Self {
            cell,
            status: CellStatus::Failed,
            observations: 0,
            error: Some(error.into()),
        }
    }

    pub const fn interrupted(cell: CellId, observations: u32) -> Self {
        Self {
            cell,
            status: CellStatus::Interrupted,
            observations,
            error: None,
        }
    }
}

/// Everything a finished cell hands to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellOutcome {
    pub record: CellRecord,
    pub observations: Vec<Observation>,
}

pub(crate) mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_flags() {
        let valid = RequestOutcome::Valid {
            payload: ResponsePayload::Diagnostics { items: 2 },
        };
        assert!(valid.is_ok() && valid.is_found() && valid.is_valid());

        assert!(RequestOutcome::NotFound.is_ok());
        assert!(!RequestOutcome::NotFound.is_found());

        let invalid = RequestOutcome::InvalidResponse {
            found: 1,
            detail: "bad uri".to_string(),
        };
        assert!(invalid.is_ok() && invalid.is_found() && !invalid.is_valid());

        assert!(!RequestOutcome::Timeout.is_ok());
        assert!(RequestOutcome::Timeout.is_timeout());
        let protocol = RequestOutcome::ProtocolError {
            message: "boom".to_string(),
        };
        assert!(!protocol.is_ok());
        assert_eq!(protocol.error_message().as_deref(), Some("boom"));
    }

    #[test]
    fn observation_serializes_latency_as_nanos() {
        let obs = Observation {
            cell: CellId::new("requests", "ty", 0),
            sample_index: 0,
            sample: Sample {
                file: "src/requests/api.py".into(),
                position: Position::new(3, 4),
                token: "sessions".to_string(),
                kind: super::super::sample::SymbolKind::ImportedName,
            },
            latency: Duration::from_millis(12),
            outcome: RequestOutcome::NotFound,
        };
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["latency"], 12_000_000);
        assert_eq!(json["outcome"]["outcome"], "not_found");
        let back: Observation = serde_json::from_value(json).unwrap();
        assert_eq!(back, obs);
    }
}
