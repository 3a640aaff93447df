mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default config locations, searched in order when no path is given.
const DEFAULT_PATHS: &[&str] = &[
    "./reelpipe.toml",
    "./config.toml",
    "~/.config/reelpipe/config.toml",
    "/etc/reelpipe/config.toml",
];

/// Load configuration from a TOML file, then apply environment overrides
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    if let Some(path) = find_config_file() {
        return load_config(&path);
    }

    let mut config = Config::default();
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// First existing file among the default locations
pub fn find_config_file() -> Option<PathBuf> {
    DEFAULT_PATHS
        .iter()
        .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
        .find(|p| p.exists())
}

/// Apply overrides from the process environment
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides from `lookup`. Unparseable values are logged and ignored.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    // The first name is the historical one; the second is the reelpipe-specific one.
    for key in ["INSTAGRAM_LOG_RAW", "REELPIPE_LOG_RAW"] {
        if let Some(v) = var(key) {
            config.logging.raw_ingest = parse_bool(&v);
        }
    }
    if let Some(v) = var("LOG_LEVEL") {
        config.logging.level = v.to_ascii_lowercase();
    }

    if let Some(v) = var("REELPIPE_HOST") {
        config.server.host = v;
    }
    for key in ["PORT", "REELPIPE_PORT"] {
        if let Some(port) = parse_var(key, var(key)) {
            config.server.port = port;
        }
    }

    if let Some(v) = var("MEDIA_DIR") {
        config.transcode.work_dir = Some(expand_path(&v));
    }

    if let Some(v) = var("INSTAGRAM_USER_AGENT") {
        config.ingest.user_agent = v;
    }
    if let Some(secs) = parse_var::<f64>("INSTAGRAM_REQUEST_TIMEOUT", var("INSTAGRAM_REQUEST_TIMEOUT")) {
        if secs.is_finite() && secs > 0.0 {
            config.ingest.request_timeout_secs = secs.ceil() as u64;
        } else {
            tracing::warn!("Ignoring non-positive INSTAGRAM_REQUEST_TIMEOUT: {}", secs);
        }
    }
    if let Some(v) = var("INSTAGRAM_YTDLP_FORMAT") {
        config.ingest.ytdlp_format = v;
    }
    if let Some(retries) = parse_var("INSTAGRAM_YTDLP_RETRIES", var("INSTAGRAM_YTDLP_RETRIES")) {
        config.ingest.ytdlp_retries = retries;
    }
    if let Some(v) = var("INSTAGRAM_COOKIES_PATH") {
        config.ingest.cookies_path = Some(expand_path(&v));
    }

    if let Some(v) = var("FFMPEG_PATH") {
        config.tools.ffmpeg_path = Some(expand_path(&v));
    }
    if let Some(v) = var("FFPROBE_PATH") {
        config.tools.ffprobe_path = Some(expand_path(&v));
    }
    if let Some(v) = var("YTDLP_PATH") {
        config.tools.ytdlp_path = Some(expand_path(&v));
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_var<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, value);
            None
        }
    }
}

fn expand_path(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value).as_ref())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let ingest = &config.ingest;
    if ingest.max_attempts == 0 {
        anyhow::bail!("ingest.max_attempts must be at least 1");
    }
    if ingest.request_timeout_secs == 0 {
        anyhow::bail!("ingest.request_timeout_secs cannot be 0");
    }
    if ingest.max_concurrent_fetches == 0 {
        anyhow::bail!("ingest.max_concurrent_fetches cannot be 0");
    }
    if ingest.requests_per_minute == 0 {
        anyhow::bail!("ingest.requests_per_minute cannot be 0");
    }
    if ingest.max_media_bytes == 0 {
        anyhow::bail!("ingest.max_media_bytes cannot be 0");
    }
    if ingest.backoff_base_ms > ingest.backoff_max_ms {
        anyhow::bail!("ingest.backoff_base_ms cannot exceed ingest.backoff_max_ms");
    }
    if let Some(cookies) = &ingest.cookies_path {
        if !cookies.exists() {
            anyhow::bail!("Cookies file does not exist: {:?}", cookies);
        }
    }

    let transcode = &config.transcode;
    if transcode.timeout_secs == 0 {
        anyhow::bail!("transcode.timeout_secs cannot be 0");
    }
    if transcode.max_concurrent == 0 {
        anyhow::bail!("transcode.max_concurrent cannot be 0");
    }
    if transcode.max_height < 2 {
        anyhow::bail!("transcode.max_height must be at least 2");
    }
    if transcode.max_video_bitrate_kbps == 0 || transcode.max_audio_bitrate_kbps == 0 {
        anyhow::bail!("transcode bitrate ceilings cannot be 0");
    }
    if transcode.max_duration_secs == Some(0) {
        anyhow::bail!("transcode.max_duration_secs cannot be 0");
    }

    if config.jobs.sweep_interval_secs == 0 {
        anyhow::bail!("jobs.sweep_interval_secs cannot be 0");
    }

    for (name, path) in [
        ("ffmpeg", &config.tools.ffmpeg_path),
        ("ffprobe", &config.tools.ffprobe_path),
        ("yt-dlp", &config.tools.ytdlp_path),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, path);
            }
        }
    }

    Ok(())
}
