//! Unified error type for reelpipe.
//!
//! Every crate funnels its failures into [`Error`]. Each variant maps to a
//! stable [`ErrorKind`] that is recorded on failed jobs and returned to API
//! clients, and to an HTTP status via [`Error::http_status`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::ids::JobId;
use crate::types::JobStatus;

/// Errors that can occur while fetching, transcoding or coordinating jobs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source reference is syntactically invalid.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The source could not be reached (connection failure, timeout).
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The source answered with a non-success response.
    #[error("Upstream rejected request: {message}")]
    UpstreamRejected {
        /// HTTP status returned by the source, when there was one.
        status: Option<u16>,
        /// Human-readable description.
        message: String,
    },

    /// The requested target format is not in the supported set.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The transcoder exceeded its wall-clock budget and was killed.
    #[error("Transcode timed out after {}s", .0.as_secs())]
    TranscodeTimeout(Duration),

    /// The transcoder exited unsuccessfully or produced no output.
    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),

    /// No job exists with the given identifier.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The operation was cancelled by the caller.
    #[error("Cancelled")]
    Cancelled,

    /// A job state change was attempted that the state machine forbids.
    #[error("Invalid transition from {from}: {event}")]
    InvalidTransition {
        /// Status the job was in.
        from: JobStatus,
        /// The attempted event.
        event: String,
    },

    /// An external tool could not be spawned or exited unsuccessfully.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool ran past its timeout and was killed.
    #[error("Tool error [{tool}]: timed out after {}s", .timeout.as_secs())]
    ToolTimeout {
        /// Name of the tool that timed out.
        tool: String,
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Configuration is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, client-facing classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidReference,
    UpstreamUnavailable,
    UpstreamRejected,
    UnsupportedFormat,
    TranscodeTimeout,
    TranscodeFailed,
    JobNotFound,
    Cancelled,
    InvalidTransition,
    Internal,
}

impl ErrorKind {
    /// The snake_case code used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidReference => "invalid_reference",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::UpstreamRejected => "upstream_rejected",
            Self::UnsupportedFormat => "unsupported_format",
            Self::TranscodeTimeout => "transcode_timeout",
            Self::TranscodeFailed => "transcode_failed",
            Self::JobNotFound => "job_not_found",
            Self::Cancelled => "cancelled",
            Self::InvalidTransition => "invalid_transition",
            Self::Internal => "internal",
        }
    }

    /// Whether this kind originates in the ingest stage.
    pub fn is_upstream(self) -> bool {
        matches!(
            self,
            Self::InvalidReference | Self::UpstreamUnavailable | Self::UpstreamRejected
        )
    }

    /// Whether this kind originates in the transcode stage.
    pub fn is_transcode(self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat | Self::TranscodeTimeout | Self::TranscodeFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidReference(_) => ErrorKind::InvalidReference,
            Error::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Error::UpstreamRejected { .. } => ErrorKind::UpstreamRejected,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::TranscodeTimeout(_) => ErrorKind::TranscodeTimeout,
            Error::TranscodeFailed(_) => ErrorKind::TranscodeFailed,
            Error::JobNotFound(_) => ErrorKind::JobNotFound,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Error::Tool { .. }
            | Error::ToolTimeout { .. }
            | Error::Io { .. }
            | Error::Config(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Connection failures, timeouts, 5xx and 429 responses are transient.
    /// Other rejections and malformed input are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::UpstreamUnavailable(_) => true,
            Error::UpstreamRejected {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidReference(_) => 400,
            Error::UnsupportedFormat(_) => 400,
            Error::JobNotFound(_) => 404,
            Error::Cancelled => 409,
            Error::InvalidTransition { .. } => 409,
            Error::UpstreamUnavailable(_) => 502,
            Error::UpstreamRejected { .. } => 502,
            Error::TranscodeTimeout(_) => 504,
            Error::TranscodeFailed(_) => 500,
            Error::Tool { .. } => 502,
            Error::ToolTimeout { .. } => 504,
            Error::Io { .. } => 500,
            Error::Config(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Detail safe to show to API clients.
    ///
    /// Tool and I/O errors can carry subprocess output or filesystem paths,
    /// so they collapse to a generic message.
    pub fn public_detail(&self) -> String {
        match self {
            Error::Tool { tool, .. } => format!("external tool {tool} failed"),
            Error::ToolTimeout { tool, .. } => format!("external tool {tool} timed out"),
            Error::Io { .. } => "internal I/O error".to_string(),
            other => other.to_string(),
        }
    }

    /// Convenience constructor for [`Error::UpstreamRejected`].
    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::UpstreamRejected {
            status,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::InvalidTransition`].
    pub fn invalid_transition(from: JobStatus, event: impl Into<String>) -> Self {
        Error::InvalidTransition {
            from,
            event: event.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidReference("not-a-url".into());
        assert_eq!(err.to_string(), "Invalid reference: not-a-url");

        let err = Error::TranscodeTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Transcode timed out after 30s");

        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");

        let err = Error::rejected(Some(404), "HTTP 404 Not Found");
        assert_eq!(err.to_string(), "Upstream rejected request: HTTP 404 Not Found");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::UpstreamUnavailable("refused".into()).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            Error::UnsupportedFormat("avi".into()).kind(),
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(Error::JobNotFound(JobId::new()).kind(), ErrorKind::JobNotFound);
        assert_eq!(Error::Internal("bug".into()).kind(), ErrorKind::Internal);
        assert_eq!(Error::tool("ffmpeg", "boom").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_kind_wire_codes() {
        let json = serde_json::to_string(&ErrorKind::TranscodeTimeout).unwrap();
        assert_eq!(json, "\"transcode_timeout\"");
        assert_eq!(ErrorKind::UpstreamRejected.as_str(), "upstream_rejected");
        assert_eq!(ErrorKind::JobNotFound.to_string(), "job_not_found");
    }

    #[test]
    fn test_kind_stage_classification() {
        assert!(ErrorKind::UpstreamUnavailable.is_upstream());
        assert!(ErrorKind::UpstreamRejected.is_upstream());
        assert!(!ErrorKind::UpstreamRejected.is_transcode());
        assert!(ErrorKind::TranscodeTimeout.is_transcode());
        assert!(ErrorKind::TranscodeFailed.is_transcode());
        assert!(!ErrorKind::Cancelled.is_upstream());
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::UpstreamUnavailable("timeout".into()).is_transient());
        assert!(Error::rejected(Some(503), "unavailable").is_transient());
        assert!(Error::rejected(Some(429), "slow down").is_transient());
        assert!(!Error::rejected(Some(404), "missing").is_transient());
        assert!(!Error::rejected(None, "too large").is_transient());
        assert!(!Error::InvalidReference("x".into()).is_transient());
        assert!(!Error::TranscodeFailed("x".into()).is_transient());
    }

    #[test]
    fn test_http_status() {
        assert_eq!(Error::InvalidReference("x".into()).http_status(), 400);
        assert_eq!(Error::UnsupportedFormat("x".into()).http_status(), 400);
        assert_eq!(Error::JobNotFound(JobId::new()).http_status(), 404);
        assert_eq!(Error::TranscodeTimeout(Duration::from_secs(1)).http_status(), 504);
        assert_eq!(
            Error::invalid_transition(JobStatus::Done, "cancel").http_status(),
            409
        );
    }

    #[test]
    fn test_public_detail_hides_tool_output() {
        let err = Error::tool("ffmpeg", "/tmp/.tmpXYZ/input.bin: Invalid data");
        let detail = err.public_detail();
        assert!(!detail.contains("/tmp"));
        assert!(detail.contains("ffmpeg"));
    }

    #[test]
    fn test_io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }
}
