//! Job coordination: sequences fetch, transcode and delivery per job.
//!
//! Each submitted job runs as its own tokio task. State lives in a
//! [`DashMap`] of per-job records, each behind a short-lived lock that is
//! never held across I/O, so status queries never wait on a running job.

mod events;
mod job;

pub use events::JobEvent;
pub use job::{Job, JobFailure, JobRecord, JobResult, JobState, Transition};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use reelpipe_av::{TargetFormat, TranscodedArtifact, Transcoder};
use reelpipe_common::{Error, JobId, JobStatus, Result};
use reelpipe_ingest::{Fetcher, SourceReference};
use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::config::Config;

/// Concurrency and retention knobs for the [`Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub max_concurrent_fetches: usize,
    pub max_concurrent_transcodes: usize,
    /// How long terminal jobs stay queryable.
    pub retention: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            max_concurrent_transcodes: 2,
            retention: Duration::from_secs(3600),
        }
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrent_fetches: config.ingest.max_concurrent_fetches,
            max_concurrent_transcodes: config.transcode.max_concurrent,
            retention: Duration::from_secs(config.jobs.retention_secs),
        }
    }
}

/// What `result` found for a job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Ready(TranscodedArtifact),
    /// Still running; carries the current status.
    Pending(JobStatus),
    /// Failed or cancelled; carries the recorded error.
    Failed { status: JobStatus, error: JobFailure },
}

/// Number of known jobs per status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct JobCounts {
    pub total: usize,
    pub pending: usize,
    pub fetching: usize,
    pub transcoding: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct JobEntry {
    record: RwLock<JobRecord>,
    cancel: CancellationToken,
}

pub struct Coordinator {
    jobs: DashMap<JobId, Arc<JobEntry>>,
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<dyn Transcoder>,
    fetch_slots: Semaphore,
    transcode_slots: Semaphore,
    retention: Duration,
    event_tx: broadcast::Sender<JobEvent>,
}

impl Coordinator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<dyn Transcoder>,
        settings: CoordinatorSettings,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);

        Arc::new(Self {
            jobs: DashMap::new(),
            fetcher,
            transcoder,
            fetch_slots: Semaphore::new(settings.max_concurrent_fetches.max(1)),
            transcode_slots: Semaphore::new(settings.max_concurrent_transcodes.max(1)),
            retention: settings.retention,
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    fn broadcast(&self, event: JobEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("No subscribers for job event");
        }
    }

    /// Validate the request, create a job and start working on it.
    ///
    /// Fails with [`Error::InvalidReference`] or [`Error::UnsupportedFormat`]
    /// and creates nothing when the request is malformed. Every later failure
    /// is recorded on the job instead.
    pub fn submit(self: &Arc<Self>, reference: &str, target_format: &str) -> Result<JobId> {
        let reference = SourceReference::parse(reference)?;
        let format: TargetFormat = target_format.parse()?;

        let id = JobId::new();
        let job = Job::new(id, &reference, format);
        let entry = Arc::new(JobEntry {
            record: RwLock::new(JobRecord::new(job.clone())),
            cancel: CancellationToken::new(),
        });
        self.jobs.insert(id, Arc::clone(&entry));

        tracing::info!(
            job_id = %id,
            reference = %reference,
            kind = reference.kind(),
            format = %format,
            "Job queued"
        );
        self.broadcast(JobEvent::JobQueued { job });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(id, entry, reference, format).await;
        });

        Ok(id)
    }

    async fn run(
        &self,
        id: JobId,
        entry: Arc<JobEntry>,
        reference: SourceReference,
        format: TargetFormat,
    ) {
        let media = {
            let _permit = tokio::select! {
                _ = entry.cancel.cancelled() => return,
                permit = self.fetch_slots.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.fail(&entry, &Error::Internal("fetch pool closed".to_string()));
                        return;
                    }
                },
            };

            // A cancel that won the race leaves the job terminal.
            if self.advance(&entry, Transition::StartFetch).is_err() {
                return;
            }

            tokio::select! {
                _ = entry.cancel.cancelled() => {
                    tracing::debug!(job_id = %id, "Abandoned in-flight fetch");
                    return;
                }
                result = self.fetcher.fetch(&reference) => match result {
                    Ok(media) => media,
                    Err(e) => {
                        self.fail(&entry, &e);
                        return;
                    }
                },
            }
        };

        if self.advance(&entry, Transition::FetchSucceeded).is_err() {
            return;
        }

        let _permit = tokio::select! {
            _ = entry.cancel.cancelled() => {
                self.fail(&entry, &Error::Cancelled);
                return;
            }
            permit = self.transcode_slots.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    self.fail(&entry, &Error::Internal("transcode pool closed".to_string()));
                    return;
                }
            },
        };

        tracing::debug!(job_id = %id, bytes = media.size(), "Transcoding");
        match self
            .transcoder
            .transcode(media, format, entry.cancel.clone())
            .await
        {
            Ok(artifact) => {
                let size = artifact.size();
                if self
                    .advance(&entry, Transition::TranscodeSucceeded(artifact))
                    .is_ok()
                {
                    tracing::info!(job_id = %id, format = %format, bytes = size, "Job completed");
                }
            }
            Err(e) => self.fail(&entry, &e),
        }
    }

    /// Apply `transition` under the job's lock, then announce the new status.
    fn advance(&self, entry: &JobEntry, transition: Transition) -> Result<Job> {
        let job = {
            let mut record = entry.record.write();
            if let Err(e) = record.apply(transition) {
                tracing::debug!(job_id = %record.job.job_id, error = %e, "Transition rejected");
                return Err(e);
            }
            record.job.clone()
        };
        self.broadcast(JobEvent::for_job(&job));
        Ok(job)
    }

    fn fail(&self, entry: &JobEntry, err: &Error) {
        if let Ok(job) = self.advance(entry, Transition::Fail(JobFailure::from(err))) {
            tracing::warn!(job_id = %job.job_id, kind = %err.kind(), error = %err, "Job failed");
        }
    }

    fn entry(&self, id: JobId) -> Result<Arc<JobEntry>> {
        self.jobs
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(Error::JobNotFound(id))
    }

    /// Current snapshot of a job.
    pub fn status(&self, id: JobId) -> Result<Job> {
        let entry = self.entry(id)?;
        let job = entry.record.read().job.clone();
        Ok(job)
    }

    /// The artifact for a finished job, or why there is none yet.
    pub fn result(&self, id: JobId) -> Result<JobOutcome> {
        let entry = self.entry(id)?;
        let record = entry.record.read();
        let outcome = match record.state() {
            JobState::Done => match record.artifact() {
                Some(artifact) => JobOutcome::Ready(artifact.clone()),
                None => return Err(Error::Internal(format!("job {id} is done without an artifact"))),
            },
            JobState::Failed(_) | JobState::Cancelled => JobOutcome::Failed {
                status: record.job.status,
                error: record.job.error.clone().unwrap_or_else(|| JobFailure {
                    kind: reelpipe_common::ErrorKind::Internal,
                    detail: "unknown failure".to_string(),
                }),
            },
            state => JobOutcome::Pending(state.status()),
        };
        Ok(outcome)
    }

    /// Cancel a job.
    ///
    /// Pending and fetching jobs become `cancelled` immediately. Once
    /// transcoding has started the request only signals the running ffmpeg
    /// process; the job still resolves to `done` or `failed`. Terminal jobs
    /// fail with [`Error::InvalidTransition`].
    pub fn cancel(&self, id: JobId) -> Result<Job> {
        let entry = self.entry(id)?;

        let job = {
            let mut record = entry.record.write();
            if record.job.status == JobStatus::Transcoding {
                entry.cancel.cancel();
                tracing::info!(job_id = %id, "Cancellation requested during transcode");
                return Ok(record.job.clone());
            }
            record.apply(Transition::Cancel)?;
            record.job.clone()
        };

        entry.cancel.cancel();
        tracing::info!(job_id = %id, "Job cancelled");
        self.broadcast(JobEvent::for_job(&job));
        Ok(job)
    }

    /// Snapshots of all known jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .map(|e| e.value().record.read().job.clone())
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for entry in self.jobs.iter() {
            counts.total += 1;
            match entry.value().record.read().job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Fetching => counts.fetching += 1,
                JobStatus::Transcoding => counts.transcoding += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Drop terminal jobs that finished more than the retention window
    /// before `now`. Returns how many were removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.jobs.retain(|_, entry| {
            let finished_at = entry.record.read().job.finished_at;
            let expired = finished_at
                .and_then(|at| (now - at).to_std().ok())
                .is_some_and(|age| age >= self.retention);
            if expired {
                removed += 1;
            }
            !expired
        });
        if removed > 0 {
            tracing::debug!(removed, "Evicted expired jobs");
        }
        removed
    }

    /// Periodically evict expired jobs until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        this.evict_expired(Utc::now());
                    }
                }
            }
            tracing::debug!("Job sweeper stopped");
        })
    }
}
