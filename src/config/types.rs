use reelpipe_av::{TranscodeLimits, TranscodeSettings};
use reelpipe_ingest::{ExtractorSettings, FetchSettings, RetryPolicy, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use reelpipe_av::ToolPaths as ToolsConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset (e.g. "info", "debug")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log upstream responses and extractor metadata verbatim at debug level
    #[serde(default)]
    pub raw_ingest: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            raw_ingest: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Total attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_max_media_bytes")]
    pub max_media_bytes: u64,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// yt-dlp format selector for platform pages
    #[serde(default = "default_ytdlp_format")]
    pub ytdlp_format: String,

    #[serde(default = "default_ytdlp_retries")]
    pub ytdlp_retries: u32,

    /// Netscape-format cookies file handed to yt-dlp
    #[serde(default)]
    pub cookies_path: Option<PathBuf>,
}

fn default_request_timeout() -> u64 {
    20
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    500
}
fn default_backoff_max() -> u64 {
    8_000
}
fn default_requests_per_minute() -> u32 {
    60
}
fn default_max_media_bytes() -> u64 {
    512 * 1024 * 1024
}
fn default_max_concurrent_fetches() -> usize {
    4
}
fn default_ytdlp_format() -> String {
    reelpipe_ingest::extractor::DEFAULT_YTDLP_FORMAT.to_string()
}
fn default_ytdlp_retries() -> u32 {
    3
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            requests_per_minute: default_requests_per_minute(),
            max_media_bytes: default_max_media_bytes(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            ytdlp_format: default_ytdlp_format(),
            ytdlp_retries: default_ytdlp_retries(),
            cookies_path: None,
        }
    }
}

impl IngestConfig {
    /// Build fetcher settings; `work_dir` is shared with the transcoder.
    pub fn fetch_settings(&self, log_raw: bool, work_dir: Option<PathBuf>) -> FetchSettings {
        FetchSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            user_agent: self.user_agent.clone(),
            retry: RetryPolicy::exponential(
                self.max_attempts,
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_max_ms),
            ),
            requests_per_minute: self.requests_per_minute,
            max_media_bytes: self.max_media_bytes,
            log_raw,
            extractor: ExtractorSettings {
                format: self.ytdlp_format.clone(),
                retries: self.ytdlp_retries,
                cookies_path: self.cookies_path.clone(),
                work_dir,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Wall-clock budget per ffmpeg run
    #[serde(default = "default_transcode_timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent ffmpeg processes
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_max_height")]
    pub max_height: u32,

    #[serde(default = "default_max_video_bitrate")]
    pub max_video_bitrate_kbps: u32,

    #[serde(default = "default_max_audio_bitrate")]
    pub max_audio_bitrate_kbps: u32,

    /// Truncate outputs to this many seconds
    #[serde(default)]
    pub max_duration_secs: Option<u64>,

    /// Scratch directory for fetch and transcode workspaces (default: system temp)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

fn default_transcode_timeout() -> u64 {
    300
}
fn default_max_concurrent() -> usize {
    2
}
fn default_max_height() -> u32 {
    1080
}
fn default_max_video_bitrate() -> u32 {
    6000
}
fn default_max_audio_bitrate() -> u32 {
    192
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_transcode_timeout(),
            max_concurrent: default_max_concurrent(),
            max_height: default_max_height(),
            max_video_bitrate_kbps: default_max_video_bitrate(),
            max_audio_bitrate_kbps: default_max_audio_bitrate(),
            max_duration_secs: None,
            work_dir: None,
        }
    }
}

impl TranscodeConfig {
    pub fn settings(&self) -> TranscodeSettings {
        TranscodeSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            limits: TranscodeLimits {
                max_height: self.max_height,
                max_video_bitrate_kbps: self.max_video_bitrate_kbps,
                max_audio_bitrate_kbps: self.max_audio_bitrate_kbps,
                max_duration: self.max_duration_secs.map(Duration::from_secs),
            },
            work_dir: self.work_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// How long finished jobs stay queryable
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_retention() -> u64 {
    3600
}
fn default_sweep_interval() -> u64 {
    60
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}
