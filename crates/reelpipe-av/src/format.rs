//! Supported output formats and the ffmpeg flag sets they map to.
//!
//! Arguments are assembled from fixed per-format profiles clamped by
//! [`TranscodeLimits`]; the only free-form values passed to ffmpeg are the
//! workspace paths chosen by the engine.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use reelpipe_common::Error;
use serde::{Deserialize, Serialize};

/// Output formats the engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetFormat {
    #[serde(rename = "mp4-1080p")]
    Mp4_1080p,
    #[serde(rename = "mp4-720p")]
    Mp4_720p,
    #[serde(rename = "mp4-480p")]
    Mp4_480p,
    #[serde(rename = "webm-720p")]
    Webm720p,
    #[serde(rename = "mp3")]
    Mp3,
    #[serde(rename = "m4a")]
    M4a,
}

const ALL_FORMATS: [TargetFormat; 6] = [
    TargetFormat::Mp4_1080p,
    TargetFormat::Mp4_720p,
    TargetFormat::Mp4_480p,
    TargetFormat::Webm720p,
    TargetFormat::Mp3,
    TargetFormat::M4a,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoCodec {
    H264,
    Vp9,
}

#[derive(Debug, Clone, Copy)]
struct VideoProfile {
    codec: VideoCodec,
    crf: u32,
    height: u32,
    bitrate_kbps: u32,
}

#[derive(Debug, Clone, Copy)]
struct AudioProfile {
    codec: &'static str,
    bitrate_kbps: u32,
}

#[derive(Debug, Clone, Copy)]
struct Profile {
    video: Option<VideoProfile>,
    audio: AudioProfile,
    muxer: &'static str,
    faststart: bool,
}

impl TargetFormat {
    /// Every supported format, in display order.
    pub fn all() -> &'static [TargetFormat] {
        &ALL_FORMATS
    }

    /// Stable identifier used by the API and CLI.
    pub fn id(self) -> &'static str {
        match self {
            Self::Mp4_1080p => "mp4-1080p",
            Self::Mp4_720p => "mp4-720p",
            Self::Mp4_480p => "mp4-480p",
            Self::Webm720p => "webm-720p",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Mp4_1080p => "H.264 High / AAC stereo MP4, up to 1080p",
            Self::Mp4_720p => "H.264 High / AAC stereo MP4, up to 720p",
            Self::Mp4_480p => "H.264 High / AAC stereo MP4, up to 480p",
            Self::Webm720p => "VP9 / Opus WebM, up to 720p",
            Self::Mp3 => "MP3 audio only, stereo",
            Self::M4a => "AAC audio only in MP4, stereo",
        }
    }

    /// File extension of the output, without a dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4_1080p | Self::Mp4_720p | Self::Mp4_480p => "mp4",
            Self::Webm720p => "webm",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
        }
    }

    /// MIME type of the output.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Mp4_1080p | Self::Mp4_720p | Self::Mp4_480p => "video/mp4",
            Self::Webm720p => "video/webm",
            Self::Mp3 => "audio/mpeg",
            Self::M4a => "audio/mp4",
        }
    }

    pub fn is_audio_only(self) -> bool {
        self.profile().video.is_none()
    }

    fn profile(self) -> Profile {
        let h264 = |crf, height, bitrate_kbps| VideoProfile {
            codec: VideoCodec::H264,
            crf,
            height,
            bitrate_kbps,
        };
        let aac = |bitrate_kbps| AudioProfile {
            codec: "aac",
            bitrate_kbps,
        };

        match self {
            Self::Mp4_1080p => Profile {
                video: Some(h264(20, 1080, 6000)),
                audio: aac(160),
                muxer: "mp4",
                faststart: true,
            },
            Self::Mp4_720p => Profile {
                video: Some(h264(21, 720, 3500)),
                audio: aac(128),
                muxer: "mp4",
                faststart: true,
            },
            Self::Mp4_480p => Profile {
                video: Some(h264(23, 480, 1500)),
                audio: aac(96),
                muxer: "mp4",
                faststart: true,
            },
            Self::Webm720p => Profile {
                video: Some(VideoProfile {
                    codec: VideoCodec::Vp9,
                    crf: 32,
                    height: 720,
                    bitrate_kbps: 3000,
                }),
                audio: AudioProfile {
                    codec: "libopus",
                    bitrate_kbps: 128,
                },
                muxer: "webm",
                faststart: false,
            },
            Self::Mp3 => Profile {
                video: None,
                audio: AudioProfile {
                    codec: "libmp3lame",
                    bitrate_kbps: 192,
                },
                muxer: "mp3",
                faststart: false,
            },
            Self::M4a => Profile {
                video: None,
                audio: aac(192),
                muxer: "ipod",
                faststart: true,
            },
        }
    }

    /// Build the full ffmpeg argument list converting `input` into `output`.
    pub fn ffmpeg_args(self, input: &Path, output: &Path, limits: &TranscodeLimits) -> Vec<String> {
        let profile = self.profile();
        let mut args: Vec<String> = Vec::new();
        let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

        push(&["-nostdin", "-hide_banner", "-loglevel", "error", "-y"]);
        push(&["-i", &input.to_string_lossy()]);

        if let Some(max) = limits.max_duration {
            push(&["-t", &format!("{:.3}", max.as_secs_f64())]);
        }

        match profile.video {
            Some(video) => {
                push(&["-map", "0:v:0", "-map", "0:a:0?"]);

                let height = video.height.min(limits.max_height);
                let bitrate = video.bitrate_kbps.min(limits.max_video_bitrate_kbps);
                let crf = video.crf.to_string();

                match video.codec {
                    VideoCodec::H264 => {
                        push(&["-c:v", "libx264", "-profile:v", "high", "-pix_fmt", "yuv420p"]);
                        push(&["-preset", "veryfast", "-crf", &crf]);
                        push(&["-maxrate", &format!("{bitrate}k")]);
                        push(&["-bufsize", &format!("{}k", bitrate * 2)]);
                    }
                    VideoCodec::Vp9 => {
                        push(&["-c:v", "libvpx-vp9", "-deadline", "good", "-cpu-used", "4", "-row-mt", "1"]);
                        push(&["-crf", &crf, "-b:v", &format!("{bitrate}k")]);
                    }
                }

                push(&["-vf", &scale_filter(height)]);
            }
            None => push(&["-vn", "-map", "0:a:0"]),
        }

        let audio_bitrate = profile.audio.bitrate_kbps.min(limits.max_audio_bitrate_kbps);
        push(&["-c:a", profile.audio.codec, "-b:a", &format!("{audio_bitrate}k"), "-ac", "2"]);

        if profile.faststart {
            push(&["-movflags", "+faststart"]);
        }

        push(&["-f", profile.muxer, &output.to_string_lossy()]);
        args
    }
}

/// Cap the shorter side of the frame at `height`, keeping aspect ratio and
/// even dimensions, so portrait and landscape sources get the same quality.
fn scale_filter(height: u32) -> String {
    format!(
        "scale='if(gte(iw,ih),-2,min({height},trunc(iw/2)*2))':'if(gte(iw,ih),min({height},trunc(ih/2)*2),-2)'"
    )
}

impl FromStr for TargetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ALL_FORMATS
            .iter()
            .copied()
            .find(|f| f.id() == wanted)
            .ok_or_else(|| Error::UnsupportedFormat(s.to_string()))
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Ceilings applied on top of every format profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeLimits {
    pub max_height: u32,
    pub max_video_bitrate_kbps: u32,
    pub max_audio_bitrate_kbps: u32,
    /// Output is truncated to this length when set.
    pub max_duration: Option<Duration>,
}

impl Default for TranscodeLimits {
    fn default() -> Self {
        Self {
            max_height: 1080,
            max_video_bitrate_kbps: 6000,
            max_audio_bitrate_kbps: 192,
            max_duration: None,
        }
    }
}

/// File extension to give fetched input with the given MIME type.
///
/// ffmpeg probes the container itself; the extension is only a hint.
pub fn extension_for_content_type(mime: Option<&str>) -> &'static str {
    match mime {
        Some("video/mp4") => "mp4",
        Some("video/webm") => "webm",
        Some("video/quicktime") => "mov",
        Some("video/x-matroska") => "mkv",
        Some("audio/mpeg") => "mp3",
        Some("audio/mp4") | Some("audio/x-m4a") => "m4a",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::path::PathBuf;

    fn args_for(format: TargetFormat, limits: &TranscodeLimits) -> Vec<String> {
        format.ffmpeg_args(&PathBuf::from("/w/input.mp4"), &PathBuf::from("/w/output.out"), limits)
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn parse_known_ids() {
        for format in TargetFormat::all() {
            assert_eq!(format.id().parse::<TargetFormat>().unwrap(), *format);
        }
        assert_eq!(" MP4-720P ".parse::<TargetFormat>().unwrap(), TargetFormat::Mp4_720p);
    }

    #[test]
    fn parse_unknown_is_unsupported() {
        assert_matches!("avi".parse::<TargetFormat>(), Err(Error::UnsupportedFormat(f)) if f == "avi");
        assert_matches!("".parse::<TargetFormat>(), Err(Error::UnsupportedFormat(_)));
    }

    #[test]
    fn serde_uses_ids() {
        assert_eq!(serde_json::to_string(&TargetFormat::Webm720p).unwrap(), "\"webm-720p\"");
        let f: TargetFormat = serde_json::from_str("\"mp4-480p\"").unwrap();
        assert_eq!(f, TargetFormat::Mp4_480p);
    }

    #[test]
    fn mp4_720p_args() {
        let args = args_for(TargetFormat::Mp4_720p, &TranscodeLimits::default());

        assert_eq!(&args[..5], &["-nostdin", "-hide_banner", "-loglevel", "error", "-y"]);
        assert_eq!(value_after(&args, "-i"), Some("/w/input.mp4"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-crf"), Some("21"));
        assert_eq!(value_after(&args, "-maxrate"), Some("3500k"));
        assert_eq!(value_after(&args, "-bufsize"), Some("7000k"));
        assert_eq!(value_after(&args, "-c:a"), Some("aac"));
        assert_eq!(value_after(&args, "-b:a"), Some("128k"));
        assert_eq!(value_after(&args, "-movflags"), Some("+faststart"));
        assert_eq!(value_after(&args, "-f"), Some("mp4"));
        assert!(value_after(&args, "-vf").unwrap().contains("min(720,"));
        assert_eq!(args.last().map(String::as_str), Some("/w/output.out"));
        assert!(!args.contains(&"-t".to_string()));
    }

    #[test]
    fn limits_clamp_profile() {
        let limits = TranscodeLimits {
            max_height: 480,
            max_video_bitrate_kbps: 1000,
            max_audio_bitrate_kbps: 64,
            max_duration: Some(Duration::from_secs(30)),
        };
        let args = args_for(TargetFormat::Mp4_1080p, &limits);

        assert!(value_after(&args, "-vf").unwrap().contains("min(480,"));
        assert_eq!(value_after(&args, "-maxrate"), Some("1000k"));
        assert_eq!(value_after(&args, "-b:a"), Some("64k"));
        assert_eq!(value_after(&args, "-t"), Some("30.000"));
    }

    #[test]
    fn limits_never_raise_profile() {
        let limits = TranscodeLimits {
            max_height: 4320,
            max_video_bitrate_kbps: 100_000,
            max_audio_bitrate_kbps: 512,
            max_duration: None,
        };
        let args = args_for(TargetFormat::Mp4_480p, &limits);
        assert!(value_after(&args, "-vf").unwrap().contains("min(480,"));
        assert_eq!(value_after(&args, "-maxrate"), Some("1500k"));
        assert_eq!(value_after(&args, "-b:a"), Some("96k"));
    }

    #[test]
    fn webm_uses_vp9_and_opus() {
        let args = args_for(TargetFormat::Webm720p, &TranscodeLimits::default());
        assert_eq!(value_after(&args, "-c:v"), Some("libvpx-vp9"));
        assert_eq!(value_after(&args, "-b:v"), Some("3000k"));
        assert_eq!(value_after(&args, "-c:a"), Some("libopus"));
        assert_eq!(value_after(&args, "-f"), Some("webm"));
        assert!(!args.contains(&"-movflags".to_string()));
    }

    #[test]
    fn audio_formats_drop_video() {
        let mp3 = args_for(TargetFormat::Mp3, &TranscodeLimits::default());
        assert!(mp3.contains(&"-vn".to_string()));
        assert!(!mp3.contains(&"-c:v".to_string()));
        assert!(!mp3.contains(&"-vf".to_string()));
        assert_eq!(value_after(&mp3, "-c:a"), Some("libmp3lame"));
        assert_eq!(value_after(&mp3, "-ac"), Some("2"));

        let m4a = args_for(TargetFormat::M4a, &TranscodeLimits::default());
        assert_eq!(value_after(&m4a, "-f"), Some("ipod"));
        assert!(TargetFormat::M4a.is_audio_only());
        assert!(!TargetFormat::Mp4_720p.is_audio_only());
    }

    #[test]
    fn content_types_and_extensions() {
        assert_eq!(TargetFormat::Mp4_720p.content_type(), "video/mp4");
        assert_eq!(TargetFormat::Mp3.content_type(), "audio/mpeg");
        assert_eq!(TargetFormat::M4a.extension(), "m4a");
        assert_eq!(extension_for_content_type(Some("video/quicktime")), "mov");
        assert_eq!(extension_for_content_type(None), "bin");
    }
}
