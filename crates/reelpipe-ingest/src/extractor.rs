//! Platform page downloads through `yt-dlp`.
//!
//! Instagram pages do not expose a direct media URL, so the download is
//! delegated to the external extractor with a fixed argument set. The tool
//! writes into a scoped [`Workspace`] which is removed once the bytes are in
//! memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reelpipe_av::{ToolCommand, ToolRegistry, Workspace};
use reelpipe_common::{Error, RawMedia, Result};

/// Default yt-dlp format selector: best single file carrying both audio and video.
pub const DEFAULT_YTDLP_FORMAT: &str = "best[acodec!=none][vcodec!=none]/best";

const OUTPUT_STEM: &str = "media";

/// Tunables for [`YtDlpExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    /// Value passed to `-f`.
    pub format: String,
    /// Value passed to `--retries`.
    pub retries: u32,
    /// Netscape cookies file passed to `--cookies`.
    pub cookies_path: Option<PathBuf>,
    /// Wall-clock budget for one extractor run.
    pub timeout: Duration,
    /// Parent directory for download workspaces.
    pub work_dir: Option<PathBuf>,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            format: DEFAULT_YTDLP_FORMAT.to_string(),
            retries: 3,
            cookies_path: None,
            timeout: Duration::from_secs(300),
            work_dir: None,
        }
    }
}

/// Downloads media for page URLs via yt-dlp.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    tools: Arc<ToolRegistry>,
    settings: ExtractorSettings,
    user_agent: String,
    max_media_bytes: u64,
    log_raw: bool,
}

impl YtDlpExtractor {
    pub fn new(
        tools: Arc<ToolRegistry>,
        settings: ExtractorSettings,
        user_agent: impl Into<String>,
        max_media_bytes: u64,
        log_raw: bool,
    ) -> Self {
        Self {
            tools,
            settings,
            user_agent: user_agent.into(),
            max_media_bytes,
            log_raw,
        }
    }

    /// Whether the extractor binary was discovered.
    pub fn is_available(&self) -> bool {
        self.tools.get("yt-dlp").is_some()
    }

    fn args(&self, workspace: &Workspace, page_url: &str) -> Vec<String> {
        let template = workspace.temp_file(&format!("{OUTPUT_STEM}.%(ext)s"));
        let mut args: Vec<String> = [
            "--no-playlist",
            "--no-progress",
            "--quiet",
            "--no-warnings",
            "--force-overwrites",
            "--merge-output-format",
            "mp4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.extend(["-f".to_string(), self.settings.format.clone()]);
        args.extend(["--retries".to_string(), self.settings.retries.to_string()]);
        args.extend(["--user-agent".to_string(), self.user_agent.clone()]);
        args.extend([
            "--add-header".to_string(),
            "Referer:https://www.instagram.com/".to_string(),
        ]);
        if let Some(cookies) = &self.settings.cookies_path {
            args.extend(["--cookies".to_string(), cookies.to_string_lossy().to_string()]);
        }
        if self.log_raw {
            args.push("--write-info-json".to_string());
        }
        args.extend(["-o".to_string(), template.to_string_lossy().to_string()]);
        args.extend(["--".to_string(), page_url.to_string()]);
        args
    }

    /// Download the media behind `page_url`.
    ///
    /// # Errors
    ///
    /// - [`Error::UpstreamUnavailable`] if yt-dlp is missing, cannot start or
    ///   times out.
    /// - [`Error::UpstreamRejected`] if yt-dlp fails, produces nothing or the
    ///   payload exceeds the size cap.
    pub async fn fetch(&self, page_url: &str) -> Result<RawMedia> {
        let ytdlp = self
            .tools
            .get("yt-dlp")
            .ok_or_else(|| Error::UpstreamUnavailable("yt-dlp is not installed".to_string()))?;

        let workspace = match &self.settings.work_dir {
            Some(dir) => Workspace::new_in(dir),
            None => Workspace::new(),
        }
        .map_err(scratch_failure)?;

        tracing::info!(url = page_url, "Downloading via yt-dlp");

        let result = ToolCommand::new(ytdlp.path.clone())
            .args(self.args(&workspace, page_url))
            .timeout(self.settings.timeout)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(Error::ToolTimeout { timeout, .. }) => {
                return Err(Error::UpstreamUnavailable(format!(
                    "yt-dlp timed out after {}s",
                    timeout.as_secs()
                )))
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::error!(error = %e, "Failed to run yt-dlp");
                return Err(Error::UpstreamUnavailable("yt-dlp could not be started".to_string()));
            }
        };

        if !out.status.success() {
            tracing::debug!(stderr = %out.stderr.trim(), "yt-dlp stderr");
            let code = out
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(Error::rejected(
                None,
                format!("yt-dlp could not retrieve {page_url} (exit {code})"),
            ));
        }

        if self.log_raw {
            self.log_info_json(workspace.path()).await;
        }

        let file = find_output(workspace.path())
            .await
            .ok_or_else(|| Error::rejected(None, format!("yt-dlp produced no file for {page_url}")))?;

        let size = tokio::fs::metadata(&file)
            .await
            .map_err(|e| scratch_failure(e.into()))?
            .len();
        if size > self.max_media_bytes {
            return Err(Error::rejected(
                None,
                format!(
                    "payload of {size} bytes exceeds limit of {} bytes",
                    self.max_media_bytes
                ),
            ));
        }

        let bytes = tokio::fs::read(&file)
            .await
            .map_err(|e| scratch_failure(e.into()))?;
        let content_type = content_type_for(&file).map(String::from);

        if let Err(e) = workspace.close() {
            tracing::warn!(error = %e, "Failed to remove download workspace");
        }

        tracing::info!(url = page_url, bytes = bytes.len(), "yt-dlp download complete");
        Ok(RawMedia::new(bytes, content_type, page_url))
    }

    async fn log_info_json(&self, dir: &Path) {
        let path = dir.join(format!("{OUTPUT_STEM}.info.json"));
        match tokio::fs::read_to_string(&path).await {
            Ok(info) => tracing::debug!(target: "reelpipe::raw_ingest", info = %info, "yt-dlp info json"),
            Err(e) => tracing::debug!(target: "reelpipe::raw_ingest", error = %e, "yt-dlp info json unavailable"),
        }
    }
}

/// Local scratch problems surface as an unavailable upstream.
fn scratch_failure(e: Error) -> Error {
    tracing::error!(error = %e, "yt-dlp download workspace unusable");
    Error::UpstreamUnavailable("could not prepare download workspace".to_string())
}

async fn find_output(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_media = name.starts_with(&format!("{OUTPUT_STEM}."))
            && !name.ends_with(".json")
            && !name.ends_with(".part")
            && !name.ends_with(".ytdl");
        if is_media {
            return Some(entry.path());
        }
    }
    None
}

fn content_type_for(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mov" => Some("video/quicktime"),
        "mkv" => Some("video/x-matroska"),
        "m4a" => Some("audio/mp4"),
        "mp3" => Some("audio/mpeg"),
        _ => None,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::os::unix::fs::PermissionsExt;

    const PAGE: &str = "https://www.instagram.com/reel/abc123/";

    fn fake_ytdlp(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    // Writes `payload` to the path given after -o, with the extension filled in.
    const WRITES_OUTPUT: &str = r#"prev=""; out=""
for arg; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
[ "$arg" = "https://www.instagram.com/reel/abc123/" ] || exit 7
target=$(printf '%s' "$out" | sed 's/%(ext)s/mp4/')
printf 'reel-bytes' > "$target""#;

    fn extractor(ytdlp: Option<&Path>, work: &Path, max_bytes: u64) -> YtDlpExtractor {
        let mut tools = ToolRegistry::empty();
        if let Some(path) = ytdlp {
            tools = tools.with_tool("yt-dlp", path);
        }
        YtDlpExtractor::new(
            Arc::new(tools),
            ExtractorSettings {
                work_dir: Some(work.to_path_buf()),
                ..Default::default()
            },
            "test-agent",
            max_bytes,
            false,
        )
    }

    #[tokio::test]
    async fn downloads_into_workspace_and_cleans_up() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let ytdlp = fake_ytdlp(bin.path(), WRITES_OUTPUT);

        let media = extractor(Some(&ytdlp), work.path(), 1024)
            .fetch(PAGE)
            .await
            .unwrap();

        assert_eq!(&media.bytes[..], b"reel-bytes");
        assert_eq!(media.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(media.source_url, PAGE);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_tool_is_unavailable() {
        let work = tempfile::tempdir().unwrap();
        let err = extractor(None, work.path(), 1024).fetch(PAGE).await.unwrap_err();
        assert_matches!(err, Error::UpstreamUnavailable(_));
    }

    #[tokio::test]
    async fn failing_tool_is_rejected() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let ytdlp = fake_ytdlp(bin.path(), "echo 'ERROR: login required' >&2\nexit 1");

        let err = extractor(Some(&ytdlp), work.path(), 1024)
            .fetch(PAGE)
            .await
            .unwrap_err();
        assert_matches!(err, Error::UpstreamRejected { status: None, .. });
        assert!(!err.to_string().contains("login required"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn oversized_download_is_rejected() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let ytdlp = fake_ytdlp(bin.path(), WRITES_OUTPUT);

        let err = extractor(Some(&ytdlp), work.path(), 4)
            .fetch(PAGE)
            .await
            .unwrap_err();
        assert_matches!(err, Error::UpstreamRejected { .. });
    }

    #[tokio::test]
    async fn unusable_work_dir_is_unavailable() {
        let bin = tempfile::tempdir().unwrap();
        let ytdlp = fake_ytdlp(bin.path(), WRITES_OUTPUT);
        let not_a_dir = bin.path().join("work");
        std::fs::write(&not_a_dir, b"regular file").unwrap();

        let err = extractor(Some(&ytdlp), &not_a_dir, 1024)
            .fetch(PAGE)
            .await
            .unwrap_err();
        assert_matches!(err, Error::UpstreamUnavailable(ref d) if d == "could not prepare download workspace");
        assert_eq!(err.kind(), reelpipe_common::ErrorKind::UpstreamUnavailable);
    }

    #[test]
    fn args_are_fixed() {
        let ex = YtDlpExtractor::new(
            Arc::new(ToolRegistry::empty()),
            ExtractorSettings {
                cookies_path: Some(PathBuf::from("/etc/cookies.txt")),
                ..Default::default()
            },
            "agent/1.0",
            1024,
            true,
        );
        let ws = Workspace::new().unwrap();
        let args = ex.args(&ws, PAGE);

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-f") + 1], DEFAULT_YTDLP_FORMAT);
        assert_eq!(args[pos("--retries") + 1], "3");
        assert_eq!(args[pos("--user-agent") + 1], "agent/1.0");
        assert_eq!(args[pos("--cookies") + 1], "/etc/cookies.txt");
        assert!(args.contains(&"--write-info-json".to_string()));
        assert!(args[pos("-o") + 1].starts_with(&ws.path().to_string_lossy().to_string()));
        assert_eq!(&args[args.len() - 2..], &["--", PAGE]);
    }
}
