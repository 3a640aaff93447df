use reelpipe_common::JobId;
use serde::{Deserialize, Serialize};

use super::job::{Job, JobFailure};

/// Job lifecycle events broadcast to subscribers (the SSE endpoint among them).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum JobEvent {
    JobQueued { job: Job },
    JobFetching { job_id: JobId },
    JobTranscoding { job_id: JobId },
    JobCompleted { job: Job },
    JobFailed { job_id: JobId, error: JobFailure },
    JobCancelled { job_id: JobId },
}

impl JobEvent {
    /// Event describing `job` after it entered its current status.
    pub fn for_job(job: &Job) -> Self {
        use reelpipe_common::JobStatus::*;

        match job.status {
            Pending => JobEvent::JobQueued { job: job.clone() },
            Fetching => JobEvent::JobFetching { job_id: job.job_id },
            Transcoding => JobEvent::JobTranscoding { job_id: job.job_id },
            Done => JobEvent::JobCompleted { job: job.clone() },
            Failed => JobEvent::JobFailed {
                job_id: job.job_id,
                error: job.error.clone().unwrap_or_else(|| JobFailure {
                    kind: reelpipe_common::ErrorKind::Internal,
                    detail: "unknown failure".to_string(),
                }),
            },
            Cancelled => JobEvent::JobCancelled { job_id: job.job_id },
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobQueued { job } | JobEvent::JobCompleted { job } => job.job_id,
            JobEvent::JobFetching { job_id }
            | JobEvent::JobTranscoding { job_id }
            | JobEvent::JobFailed { job_id, .. }
            | JobEvent::JobCancelled { job_id } => *job_id,
        }
    }

    /// The `event_type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::JobQueued { .. } => "job_queued",
            JobEvent::JobFetching { .. } => "job_fetching",
            JobEvent::JobTranscoding { .. } => "job_transcoding",
            JobEvent::JobCompleted { .. } => "job_completed",
            JobEvent::JobFailed { .. } => "job_failed",
            JobEvent::JobCancelled { .. } => "job_cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let id = JobId::new();
        let event = JobEvent::JobFetching { job_id: id };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "job_fetching");
        assert_eq!(json["job_id"], id.to_string());
        assert_eq!(event.name(), "job_fetching");
        assert_eq!(event.job_id(), id);
    }
}
