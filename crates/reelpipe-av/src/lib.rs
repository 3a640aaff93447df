//! # reelpipe-av
//!
//! Transcode engine for reelpipe. Converts fetched media into one of a fixed
//! set of target formats by driving the external `ffmpeg` binary.
//!
//! This crate provides:
//! - [`TargetFormat`]: the allow-list of output formats, each mapped to a
//!   fixed ffmpeg flag set
//! - [`ToolCommand`]: subprocess execution with a wall-clock budget and
//!   cancellation, killing the child on either
//! - [`Workspace`]: a scoped temporary directory removed on every exit path
//! - [`FfmpegTranscoder`]: the [`Transcoder`] implementation tying them together
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reelpipe_av::{FfmpegTranscoder, TargetFormat, ToolPaths, ToolRegistry, TranscodeSettings, Transcoder};
//! use reelpipe_common::RawMedia;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> reelpipe_common::Result<()> {
//! let tools = Arc::new(ToolRegistry::discover(&ToolPaths::default()));
//! let transcoder = FfmpegTranscoder::new(tools, TranscodeSettings::default());
//! let media = RawMedia::new(std::fs::read("clip.mov")?, None, "file://clip.mov");
//! let artifact = transcoder
//!     .transcode(media, "mp4-720p".parse()?, CancellationToken::new())
//!     .await?;
//! println!("{} bytes of {}", artifact.size(), artifact.format);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod format;
pub mod probe;
pub mod tools;
pub mod transcode;
pub mod workspace;

pub use command::{ToolCommand, ToolOutput};
pub use format::{TargetFormat, TranscodeLimits};
pub use probe::MediaMetadata;
pub use tools::{ToolConfig, ToolInfo, ToolPaths, ToolRegistry};
pub use transcode::{FfmpegTranscoder, TranscodeSettings, TranscodedArtifact, Transcoder};
pub use workspace::Workspace;
