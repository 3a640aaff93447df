//! Output metadata via `ffprobe`.

use std::path::Path;
use std::time::Duration;

use reelpipe_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Duration and resolution of a transcoded file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaMetadata {
    pub fn is_empty(&self) -> bool {
        self.duration_secs.is_none() && self.width.is_none() && self.height.is_none()
    }
}

/// Run ffprobe on `file` and extract its metadata.
pub async fn probe_metadata(ffprobe: &Path, file: &Path) -> Result<MediaMetadata> {
    let mut cmd = ToolCommand::new(ffprobe.to_path_buf());
    cmd.timeout(PROBE_TIMEOUT);
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]);
    cmd.arg(file.to_string_lossy().as_ref());

    let output = cmd.execute().await?;
    parse_ffprobe_json(&output.stdout)
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json` output.
pub fn parse_ffprobe_json(json: &str) -> Result<MediaMetadata> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::tool("ffprobe", format!("JSON parse error: {e}")))?;

    let video = ff
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    // Container duration first, then the first stream that reports one.
    let duration_secs = ff
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| ff.streams.iter().find_map(|s| s.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok());

    Ok(MediaMetadata {
        duration_secs,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_video_output() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac", "duration": "12.01"},
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.012000"}
        }"#;
        let meta = parse_ffprobe_json(json).unwrap();
        assert_eq!(meta.width, Some(1280));
        assert_eq!(meta.height, Some(720));
        assert!((meta.duration_secs.unwrap() - 12.012).abs() < 1e-9);
    }

    #[test]
    fn parse_audio_only_output() {
        let json = r#"{"streams": [{"codec_type": "audio", "duration": "3.5"}], "format": {}}"#;
        let meta = parse_ffprobe_json(json).unwrap();
        assert_eq!(meta.width, None);
        assert_eq!(meta.duration_secs, Some(3.5));
    }

    #[test]
    fn parse_empty_output() {
        let meta = parse_ffprobe_json("{}").unwrap();
        assert!(meta.is_empty());
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(parse_ffprobe_json("not json").is_err());
    }
}
