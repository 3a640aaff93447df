//! Job records and the per-job state machine.

use chrono::{DateTime, Utc};
use reelpipe_av::{TargetFormat, TranscodedArtifact};
use reelpipe_common::{Error, ErrorKind, JobId, JobStatus, Result};
use reelpipe_ingest::SourceReference;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Why a job stopped without producing an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobFailure {
    /// Stable error kind, e.g. `upstream_rejected`.
    #[schema(value_type = String, example = "transcode_timeout")]
    pub kind: ErrorKind,
    /// Human-readable detail; never raw tool output.
    pub detail: String,
}

impl From<&Error> for JobFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            detail: err.public_detail(),
        }
    }
}

impl JobFailure {
    fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            detail: "job was cancelled".to_string(),
        }
    }
}

/// Description of a finished artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobResult {
    #[schema(value_type = String, example = "mp4-720p")]
    pub format: TargetFormat,
    pub content_type: String,
    pub size: u64,
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl From<&TranscodedArtifact> for JobResult {
    fn from(artifact: &TranscodedArtifact) -> Self {
        Self {
            format: artifact.format,
            content_type: artifact.content_type().to_string(),
            size: artifact.size(),
            duration_secs: artifact.metadata.duration_secs,
            width: artifact.metadata.width,
            height: artifact.metadata.height,
        }
    }
}

/// Snapshot of a job as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Job {
    #[schema(value_type = String)]
    pub job_id: JobId,
    /// Canonical form of the submitted reference.
    pub reference: String,
    /// `direct`, `instagram` or `google_drive`.
    pub reference_kind: String,
    #[schema(value_type = String, example = "mp4-720p")]
    pub target_format: TargetFormat,
    #[schema(value_type = String, example = "pending")]
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl Job {
    pub fn new(job_id: JobId, reference: &SourceReference, target_format: TargetFormat) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            reference: reference.canonical(),
            reference_kind: reference.kind().to_string(),
            target_format,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Internal job state. Only `Failed` carries data.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Fetching,
    Transcoding,
    Done,
    Failed(JobFailure),
    Cancelled,
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum Transition {
    StartFetch,
    FetchSucceeded,
    TranscodeSucceeded(TranscodedArtifact),
    Fail(JobFailure),
    Cancel,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::StartFetch => "start_fetch",
            Transition::FetchSucceeded => "fetch_succeeded",
            Transition::TranscodeSucceeded(_) => "transcode_succeeded",
            Transition::Fail(_) => "fail",
            Transition::Cancel => "cancel",
        }
    }
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Fetching => JobStatus::Fetching,
            JobState::Transcoding => JobStatus::Transcoding,
            JobState::Done => JobStatus::Done,
            JobState::Failed(_) => JobStatus::Failed,
            JobState::Cancelled => JobStatus::Cancelled,
        }
    }

    /// Compute the state `transition` leads to.
    ///
    /// Progress only moves forward; `Fail` is accepted from any non-terminal
    /// state and `Cancel` only before transcoding starts.
    pub fn next(&self, transition: &Transition) -> Result<JobState> {
        let next = match (self, transition) {
            (JobState::Pending, Transition::StartFetch) => JobState::Fetching,
            (JobState::Fetching, Transition::FetchSucceeded) => JobState::Transcoding,
            (JobState::Transcoding, Transition::TranscodeSucceeded(_)) => JobState::Done,
            (JobState::Pending | JobState::Fetching, Transition::Cancel) => JobState::Cancelled,
            (state, Transition::Fail(failure)) if !state.status().is_terminal() => {
                JobState::Failed(failure.clone())
            }
            (state, transition) => {
                return Err(Error::invalid_transition(state.status(), transition.name()))
            }
        };
        Ok(next)
    }
}

/// A job's snapshot, state and artifact, kept together under one lock.
#[derive(Debug)]
pub struct JobRecord {
    pub job: Job,
    state: JobState,
    artifact: Option<TranscodedArtifact>,
}

impl JobRecord {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            state: JobState::Pending,
            artifact: None,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn artifact(&self) -> Option<&TranscodedArtifact> {
        self.artifact.as_ref()
    }

    /// Validate and apply `transition`, keeping the snapshot in step.
    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        let next = self.state.next(&transition)?;
        let now = Utc::now();

        match transition {
            Transition::TranscodeSucceeded(artifact) => {
                self.job.result = Some(JobResult::from(&artifact));
                self.artifact = Some(artifact);
            }
            Transition::Fail(failure) => self.job.error = Some(failure),
            Transition::Cancel => self.job.error = Some(JobFailure::cancelled()),
            Transition::StartFetch | Transition::FetchSucceeded => {}
        }

        self.job.status = next.status();
        self.job.updated_at = now;
        if self.job.status.is_terminal() {
            self.job.finished_at = Some(now);
        }
        self.state = next;
        Ok(())
    }
}
