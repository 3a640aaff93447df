//! The fetch seam and its HTTP implementation.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reelpipe_av::ToolRegistry;
use reelpipe_common::{Error, RawMedia, Result};
use reqwest::header::{CONTENT_TYPE, SET_COOKIE};

use crate::extractor::{ExtractorSettings, YtDlpExtractor};
use crate::reference::SourceReference;
use crate::retry::RetryPolicy;

/// Browser-like user agent sent by default; some hosts refuse obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

const RAW_TARGET: &str = "reelpipe::raw_ingest";

type SharedLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Retrieves raw media for a validated reference.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the bytes behind `reference`.
    ///
    /// Fails with [`Error::UpstreamUnavailable`] when the source cannot be
    /// reached and [`Error::UpstreamRejected`] when it refuses the request or
    /// serves an unusable payload.
    async fn fetch(&self, reference: &SourceReference) -> Result<RawMedia>;
}

/// Tunables for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Per-request timeout, covering connect and body.
    pub request_timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
    /// Process-wide request budget; callers wait for capacity.
    pub requests_per_minute: u32,
    /// Payloads larger than this are rejected.
    pub max_media_bytes: u64,
    /// Emit response metadata verbatim at debug level.
    pub log_raw: bool,
    /// Base URL for Google Drive downloads.
    pub drive_base_url: String,
    pub extractor: ExtractorSettings,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
            requests_per_minute: 60,
            max_media_bytes: 512 * 1024 * 1024,
            log_raw: false,
            drive_base_url: "https://drive.google.com".to_string(),
            extractor: ExtractorSettings::default(),
        }
    }
}

/// A successful HTTP response body plus what the Drive flow needs from it.
struct Fetched {
    media: RawMedia,
    drive_confirm: Option<String>,
}

/// [`Fetcher`] backed by `reqwest`, with retry, rate limiting and a size cap.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: SharedLimiter,
    settings: FetchSettings,
    extractor: YtDlpExtractor,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings, tools: Arc<ToolRegistry>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.request_timeout)
            .connect_timeout(settings.request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        let per_minute = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        let extractor = YtDlpExtractor::new(
            tools,
            settings.extractor.clone(),
            settings.user_agent.clone(),
            settings.max_media_bytes,
            settings.log_raw,
        );

        Ok(Self {
            client,
            limiter,
            settings,
            extractor,
        })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    fn drive_url(&self, file_id: &str, confirm: Option<&str>) -> String {
        let base = self.settings.drive_base_url.trim_end_matches('/');
        match confirm {
            Some(token) => format!("{base}/uc?export=download&id={file_id}&confirm={token}"),
            None => format!("{base}/uc?export=download&id={file_id}"),
        }
    }

    async fn get_with_retry(&self, url: &str) -> Result<Fetched> {
        self.settings
            .retry
            .run(url, |attempt| self.get_once(url, attempt))
            .await
    }

    async fn get_once(&self, url: &str, attempt: u32) -> Result<Fetched> {
        self.limiter.until_ready().await;
        tracing::debug!(url, attempt, "GET");

        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(url, &e))?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if self.settings.log_raw {
            tracing::debug!(
                target: RAW_TARGET,
                url = %final_url,
                status = status.as_u16(),
                content_type = ?content_type,
                content_length = ?resp.content_length(),
                headers = ?resp.headers(),
                "Raw upstream response"
            );
        }

        if !status.is_success() {
            return Err(Error::rejected(
                Some(status.as_u16()),
                format!("{final_url} returned HTTP {status}"),
            ));
        }

        let max = self.settings.max_media_bytes;
        if let Some(len) = resp.content_length() {
            if len > max {
                return Err(too_large(len, max));
            }
        }

        let drive_confirm = download_warning_token(resp.headers());

        let mut body = BytesMut::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| unavailable(url, &e))? {
            let len = (body.len() + chunk.len()) as u64;
            if len > max {
                return Err(too_large(len, max));
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(Error::rejected(
                Some(status.as_u16()),
                format!("{final_url} returned an empty body"),
            ));
        }

        Ok(Fetched {
            media: RawMedia::new(body.freeze(), content_type, final_url),
            drive_confirm,
        })
    }

    async fn fetch_drive(&self, file_id: &str) -> Result<RawMedia> {
        let first = self.get_with_retry(&self.drive_url(file_id, None)).await?;

        // Large files get an interstitial page plus a confirmation cookie.
        let fetched = match first.drive_confirm.clone() {
            Some(token) if is_html(&first.media) => {
                tracing::debug!(file_id, "Following Google Drive download confirmation");
                self.get_with_retry(&self.drive_url(file_id, Some(&token))).await?
            }
            _ => first,
        };

        if is_html(&fetched.media) {
            return Err(Error::rejected(
                None,
                format!("Google Drive served a web page instead of file {file_id}; is it shared publicly?"),
            ));
        }
        Ok(fetched.media)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, reference: &SourceReference) -> Result<RawMedia> {
        let result = match reference {
            SourceReference::Direct(url) => self
                .get_with_retry(url.as_str())
                .await
                .map(|fetched| fetched.media),
            SourceReference::GoogleDrive { file_id } => self.fetch_drive(file_id).await,
            SourceReference::Instagram { canonical_url, .. } => {
                // One extractor run draws from the same budget as one request.
                self.limiter.until_ready().await;
                self.extractor.fetch(canonical_url).await
            }
        };

        match &result {
            Ok(media) => tracing::info!(
                kind = reference.kind(),
                reference = %reference,
                bytes = media.size(),
                "Fetched media"
            ),
            Err(e) => tracing::warn!(
                kind = reference.kind(),
                reference = %reference,
                error = %e,
                "Fetch failed"
            ),
        }
        result
    }
}

fn unavailable(url: &str, e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::UpstreamUnavailable(format!("{url}: request timed out"))
    } else {
        Error::UpstreamUnavailable(format!("{url}: {e}"))
    }
}

fn too_large(len: u64, max: u64) -> Error {
    Error::rejected(None, format!("payload of {len} bytes exceeds limit of {max} bytes"))
}

fn is_html(media: &RawMedia) -> bool {
    media.mime_essence().as_deref() == Some("text/html")
}

fn download_warning_token(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim().starts_with("download_warning"))
        .map(|(_, value)| value.trim().to_string())
}
