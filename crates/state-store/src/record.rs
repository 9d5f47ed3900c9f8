//! Persisted saga row and its status.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SagaId, StoreError};

/// The saga-level status stored with every record.
///
/// State transitions:
/// ```text
/// Started ──┬──► Completed
///           └──► Error
/// ```
///
/// A participant reporting "done" is not a saga status; it only moves
/// `current_service` forward while the saga stays `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SagaStatus {
    /// The saga is in flight.
    Started,

    /// A participant failed or the workflow could not be resolved (terminal).
    Error,

    /// The last participant finished (terminal).
    Completed,
}

impl SagaStatus {
    /// Returns the value written to the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "started",
            SagaStatus::Error => "error",
            SagaStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(SagaStatus::Started),
            "error" => Ok(SagaStatus::Error),
            "completed" => Ok(SagaStatus::Completed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// A saga row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaRecord {
    pub id: SagaId,
    /// Participant currently owning the saga.
    pub current_service: String,
    pub status: SagaStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_values_round_trip() {
        for status in [SagaStatus::Started, SagaStatus::Error, SagaStatus::Completed] {
            assert_eq!(status.as_str().parse::<SagaStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_column_value_is_rejected() {
        let err = "done".parse::<SagaStatus>().unwrap_err();
        assert!(matches!(err, StoreError::InvalidStatus(ref s) if s == "done"));
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SagaStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
