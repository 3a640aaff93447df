//! Shared test harness for integration tests.
//!
//! Provides scripted [`Fetcher`] and [`Transcoder`] fakes and a
//! [`TestHarness`] wiring them into a [`Coordinator`] and [`AppContext`].

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use reelpipe::config::Config;
use reelpipe::coordinator::{Coordinator, CoordinatorSettings, Job, JobEvent};
use reelpipe::server::{create_router, AppContext};
use reelpipe_av::{MediaMetadata, TargetFormat, ToolRegistry, TranscodedArtifact, Transcoder};
use reelpipe_common::{Error, JobId, RawMedia, Result};
use reelpipe_ingest::{Fetcher, SourceReference};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// What a [`FakeFetcher`] answers with.
#[derive(Debug, Clone)]
pub enum FetchScript {
    Bytes(&'static [u8]),
    Unavailable,
    Rejected(u16),
}

pub struct FakeFetcher {
    script: FetchScript,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(script: FetchScript) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::new(FetchScript::Bytes(b"raw-media"))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, reference: &SourceReference) -> Result<RawMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.script {
            FetchScript::Bytes(bytes) => Ok(RawMedia::new(
                Bytes::from_static(bytes),
                Some("video/mp4".to_string()),
                reference.canonical(),
            )),
            FetchScript::Unavailable => {
                Err(Error::UpstreamUnavailable("connection refused".to_string()))
            }
            FetchScript::Rejected(status) => Err(Error::rejected(
                Some(*status),
                format!("upstream returned HTTP {status}"),
            )),
        }
    }
}

/// What a [`FakeTranscoder`] answers with.
#[derive(Debug, Clone)]
pub enum TranscodeScript {
    Succeed,
    Fail,
    TimeOut,
}

pub struct FakeTranscoder {
    script: TranscodeScript,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeTranscoder {
    pub fn new(script: TranscodeScript) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::new(TranscodeScript::Succeed)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        media: RawMedia,
        target: TargetFormat,
        cancel: CancellationToken,
    ) -> Result<TranscodedArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }
        match self.script {
            TranscodeScript::Succeed => {
                let mut out = b"transcoded:".to_vec();
                out.extend_from_slice(&media.bytes);
                Ok(TranscodedArtifact {
                    bytes: Bytes::from(out),
                    format: target,
                    metadata: MediaMetadata {
                        duration_secs: Some(2.0),
                        width: Some(1280),
                        height: Some(720),
                    },
                })
            }
            TranscodeScript::Fail => Err(Error::TranscodeFailed(
                "ffmpeg exited with code 1".to_string(),
            )),
            TranscodeScript::TimeOut => Err(Error::TranscodeTimeout(Duration::from_secs(300))),
        }
    }
}

pub struct TestHarness {
    pub coordinator: Arc<Coordinator>,
    pub ctx: AppContext,
}

impl TestHarness {
    pub fn new(fetcher: Arc<dyn Fetcher>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self::with_settings(fetcher, transcoder, CoordinatorSettings::default())
    }

    pub fn with_settings(
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<dyn Transcoder>,
        settings: CoordinatorSettings,
    ) -> Self {
        let coordinator = Coordinator::new(fetcher, transcoder, settings);
        let ctx = AppContext {
            coordinator: coordinator.clone(),
            config: Arc::new(Config::default()),
            tools: Arc::new(ToolRegistry::empty()),
        };
        Self { coordinator, ctx }
    }

    /// Harness whose jobs always succeed.
    pub fn succeeding() -> Self {
        Self::new(Arc::new(FakeFetcher::ok()), Arc::new(FakeTranscoder::ok()))
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait_terminal(&self, id: JobId) -> Job {
        wait_terminal(&self.coordinator, id).await
    }
}

pub async fn wait_terminal(coordinator: &Coordinator, id: JobId) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = coordinator.status(id).expect("job should exist");
        if job.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} stuck in {}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Collect event names for `id` until a terminal event arrives.
pub async fn collect_events(rx: &mut broadcast::Receiver<JobEvent>, id: JobId) -> Vec<String> {
    let mut names = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        if event.job_id() != id {
            continue;
        }
        let name = event.name().to_string();
        let terminal = matches!(
            event,
            JobEvent::JobCompleted { .. } | JobEvent::JobFailed { .. } | JobEvent::JobCancelled { .. }
        );
        names.push(name);
        if terminal {
            return names;
        }
    }
}
