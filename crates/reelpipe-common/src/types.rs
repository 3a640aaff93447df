//! Job status vocabulary shared between the coordinator and the HTTP layer.
//!
//! Serialized in lowercase, matching the status strings clients poll for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally visible status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, waiting for a fetch slot.
    Pending,
    /// Raw media is being retrieved from the source.
    Fetching,
    /// The external transcoder is running.
    Transcoding,
    /// The artifact is ready.
    Done,
    /// A stage failed; the error is recorded on the job.
    Failed,
    /// Cancelled before transcoding started.
    Cancelled,
}

impl JobStatus {
    /// Whether the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Position along `pending -> fetching -> transcoding -> done`.
    ///
    /// `failed` and `cancelled` sit past every progress state.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Fetching => 1,
            Self::Transcoding => 2,
            Self::Done | Self::Failed | Self::Cancelled => 3,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fetching => write!(f, "fetching"),
            Self::Transcoding => write!(f, "transcoding"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Fetching.is_terminal());
        assert!(!JobStatus::Transcoding.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_rank_is_monotonic() {
        assert!(JobStatus::Pending.rank() < JobStatus::Fetching.rank());
        assert!(JobStatus::Fetching.rank() < JobStatus::Transcoding.rank());
        assert!(JobStatus::Transcoding.rank() < JobStatus::Done.rank());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Transcoding).unwrap();
        assert_eq!(json, "\"transcoding\"");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
