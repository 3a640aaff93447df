//! Raw media payloads handed from the fetcher to the transcoder.

use bytes::Bytes;

/// Bytes retrieved from a source, before transcoding.
///
/// Lives only as long as the job's fetch-to-transcode hand-off.
#[derive(Debug, Clone)]
pub struct RawMedia {
    /// The payload.
    pub bytes: Bytes,
    /// Content type declared by the source, if any.
    pub content_type: Option<String>,
    /// URL the bytes were actually served from.
    pub source_url: String,
}

impl RawMedia {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>, source_url: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
            source_url: source_url.into(),
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Content type without parameters, lowercased (`video/mp4; codecs=..` -> `video/mp4`).
    pub fn mime_essence(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
    }
}
