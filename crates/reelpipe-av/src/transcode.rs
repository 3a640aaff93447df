//! The transcode seam and its ffmpeg-backed implementation.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reelpipe_common::{Error, RawMedia, Result};
use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::format::{extension_for_content_type, TargetFormat, TranscodeLimits};
use crate::probe::{probe_metadata, MediaMetadata};
use crate::tools::ToolRegistry;
use crate::workspace::Workspace;

/// Output of a successful transcode.
#[derive(Debug, Clone)]
pub struct TranscodedArtifact {
    pub bytes: Bytes,
    pub format: TargetFormat,
    /// Empty when ffprobe is unavailable or could not read the output.
    pub metadata: MediaMetadata,
}

impl TranscodedArtifact {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Converts raw media into a target format.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `media` into `target`.
    ///
    /// Fails with [`Error::TranscodeTimeout`] when the conversion exceeds its
    /// budget, [`Error::Cancelled`] when `cancel` fires first and
    /// [`Error::TranscodeFailed`] otherwise. Error details never include raw
    /// tool output.
    async fn transcode(
        &self,
        media: RawMedia,
        target: TargetFormat,
        cancel: CancellationToken,
    ) -> Result<TranscodedArtifact>;
}

/// Tunables for [`FfmpegTranscoder`].
#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    /// Wall-clock budget for a single ffmpeg run.
    pub timeout: Duration,
    pub limits: TranscodeLimits,
    /// Parent directory for per-run workspaces; the system temp dir if unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            limits: TranscodeLimits::default(),
            work_dir: None,
        }
    }
}

/// [`Transcoder`] that shells out to ffmpeg inside a scoped [`Workspace`].
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    tools: Arc<ToolRegistry>,
    settings: TranscodeSettings,
}

impl FfmpegTranscoder {
    pub fn new(tools: Arc<ToolRegistry>, settings: TranscodeSettings) -> Self {
        Self { tools, settings }
    }

    pub fn settings(&self) -> &TranscodeSettings {
        &self.settings
    }

    fn workspace(&self) -> Result<Workspace> {
        match &self.settings.work_dir {
            Some(dir) => Workspace::new_in(dir),
            None => Workspace::new(),
        }
    }

    async fn run(
        &self,
        workspace: &Workspace,
        media: RawMedia,
        target: TargetFormat,
        cancel: CancellationToken,
    ) -> Result<TranscodedArtifact> {
        let ffmpeg = self
            .tools
            .require("ffmpeg")
            .map_err(|_| Error::TranscodeFailed("ffmpeg is not available".to_string()))?;

        let input_name = format!(
            "input.{}",
            extension_for_content_type(media.mime_essence().as_deref())
        );
        let input = workspace
            .write_input(&input_name, &media.bytes)
            .await
            .map_err(workspace_failure)?;
        drop(media);

        let output = workspace.temp_file(&format!("output.{}", target.extension()));
        let args = target.ffmpeg_args(&input, &output, &self.settings.limits);

        tracing::info!(format = %target, timeout = ?self.settings.timeout, "Starting ffmpeg");
        tracing::debug!(args = ?args, "ffmpeg arguments");

        let result = ToolCommand::new(ffmpeg.path.clone())
            .args(args)
            .timeout(self.settings.timeout)
            .cancel_token(cancel)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(Error::ToolTimeout { timeout, .. }) => return Err(Error::TranscodeTimeout(timeout)),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::error!(error = %e, "Failed to run ffmpeg");
                return Err(Error::TranscodeFailed("ffmpeg could not be started".to_string()));
            }
        };

        if !out.status.success() {
            tracing::debug!(stderr = %out.stderr.trim(), "ffmpeg stderr");
            return Err(Error::TranscodeFailed(format!(
                "ffmpeg {}",
                describe_exit(out.status)
            )));
        }

        let bytes = match tokio::fs::read(&output).await {
            Ok(bytes) if !bytes.is_empty() => Bytes::from(bytes),
            Ok(_) | Err(_) => {
                return Err(Error::TranscodeFailed("ffmpeg produced no output".to_string()))
            }
        };

        let metadata = match self.tools.get("ffprobe") {
            Some(ffprobe) => probe_metadata(&ffprobe.path, &output)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Could not probe transcoded output");
                    MediaMetadata::default()
                }),
            None => MediaMetadata::default(),
        };

        Ok(TranscodedArtifact {
            bytes,
            format: target,
            metadata,
        })
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        media: RawMedia,
        target: TargetFormat,
        cancel: CancellationToken,
    ) -> Result<TranscodedArtifact> {
        let input_size = media.size();
        let workspace = self.workspace().map_err(workspace_failure)?;

        let result = self.run(&workspace, media, target, cancel).await;

        if let Err(e) = workspace.close() {
            tracing::warn!(error = %e, "Failed to remove transcode workspace");
        }

        match &result {
            Ok(artifact) => tracing::info!(
                format = %target,
                input_bytes = input_size,
                output_bytes = artifact.size(),
                "Transcode complete"
            ),
            Err(e) => tracing::warn!(format = %target, error = %e, "Transcode failed"),
        }
        result
    }
}

/// Scratch space problems belong to the transcode stage, not to the caller.
fn workspace_failure(e: Error) -> Error {
    tracing::error!(error = %e, "Transcode workspace unusable");
    Error::TranscodeFailed("could not prepare transcode workspace".to_string())
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    }
}
