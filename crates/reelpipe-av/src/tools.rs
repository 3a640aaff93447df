//! External tool detection.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the external
//! CLI tools the pipeline drives (ffmpeg, ffprobe, yt-dlp) and provides lookup
//! methods for the rest of the workspace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reelpipe_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Known tool names that the registry manages.
pub const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe", "yt-dlp"];

/// Budget for a single `--version` query.
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Optional path overrides for the external tools.
///
/// Doubles as the `[tools]` section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
}

impl ToolPaths {
    fn override_for(&self, name: &str) -> Option<&Path> {
        match name {
            "ffmpeg" => self.ffmpeg_path.as_deref(),
            "ffprobe" => self.ffprobe_path.as_deref(),
            "yt-dlp" => self.ytdlp_path.as_deref(),
            _ => None,
        }
    }
}

/// A discovered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of the version output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH`, preferring configured overrides.
    ///
    /// An override is used only if the path exists; otherwise [`which::which`]
    /// is tried. Tools that are not found are omitted from the registry.
    pub fn discover(paths: &ToolPaths) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let resolved = match paths.override_for(name) {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(tool = name, path = %p.display(), "Configured tool path does not exist, searching PATH");
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            match resolved {
                Some(path) => {
                    tracing::debug!(tool = name, path = %path.display(), "Found tool");
                    tools.insert(
                        name.to_string(),
                        ToolConfig {
                            name: name.to_string(),
                            path,
                        },
                    );
                }
                None => tracing::debug!(tool = name, "Tool not found"),
            }
        }

        Self { tools }
    }

    /// A registry with no tools; combine with [`with_tool`](Self::with_tool).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register `name` at an explicit path, replacing any discovered entry.
    pub fn with_tool(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(
            name.to_string(),
            ToolConfig {
                name: name.to_string(),
                path: path.into(),
            },
        );
        self
    }

    /// Look up a tool, or `None` if it was not discovered.
    pub fn get(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.get(name)
    }

    /// Return the [`ToolConfig`] for the given tool, or an [`Error::Tool`] if
    /// the tool was not found during discovery.
    pub fn require(&self, name: &str) -> Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| Error::Tool {
            tool: name.to_string(),
            message: format!("{name} not found; is it installed and in PATH?"),
        })
    }

    /// Check all known tools and return availability information.
    ///
    /// A tool that does not answer its version query in time is still
    /// reported as available, without a version.
    pub async fn check_all(&self) -> Vec<ToolInfo> {
        self.check_all_within(VERSION_TIMEOUT).await
    }

    async fn check_all_within(&self, timeout: Duration) -> Vec<ToolInfo> {
        let mut infos = Vec::with_capacity(KNOWN_TOOLS.len());
        for &name in KNOWN_TOOLS {
            let info = match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(name, &cfg.path, timeout).await,
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            };
            infos.push(info);
        }
        infos
    }
}

/// Run `<tool> --version` (or `-version` for ffmpeg/ffprobe) and return the
/// first line of stdout.
async fn detect_version(name: &str, path: &Path, timeout: Duration) -> Option<String> {
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };

    let output = match ToolCommand::new(path.to_path_buf())
        .arg(version_arg)
        .timeout(timeout)
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(tool = name, error = %e, "Version query failed");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    output.stdout.lines().next().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discover_with_default_paths() {
        let registry = ToolRegistry::discover(&ToolPaths::default());
        // No tool is guaranteed to be installed; the call must not panic.
        let _ = registry.check_all().await;
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::empty();
        let err = registry.require("ffmpeg").unwrap_err();
        assert!(err.to_string().contains("ffmpeg not found"));
    }

    #[tokio::test]
    async fn check_all_returns_known_tools() {
        let infos = ToolRegistry::empty().check_all().await;
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ffmpeg", "ffprobe", "yt-dlp"]);
        assert!(infos.iter().all(|i| !i.available));
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_is_first_line_of_output() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = fake_tool(dir.path(), "echo 2024.08.06\necho extra");
        let infos = ToolRegistry::empty().with_tool("yt-dlp", &ytdlp).check_all().await;

        let info = infos.iter().find(|i| i.name == "yt-dlp").unwrap();
        assert!(info.available);
        assert_eq!(info.version.as_deref(), Some("2024.08.06"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_version_query_is_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = fake_tool(dir.path(), "exec sleep 30");
        let registry = ToolRegistry::empty().with_tool("yt-dlp", &ytdlp);

        let started = std::time::Instant::now();
        let infos = registry.check_all_within(Duration::from_millis(200)).await;
        assert!(started.elapsed() < Duration::from_secs(5));

        let info = infos.iter().find(|i| i.name == "yt-dlp").unwrap();
        assert!(info.available);
        assert!(info.version.is_none());
    }

    #[test]
    fn existing_override_is_used() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let paths = ToolPaths {
            ffmpeg_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let registry = ToolRegistry::discover(&paths);
        assert_eq!(registry.require("ffmpeg").unwrap().path, file.path());
    }

    #[test]
    fn with_tool_registers_path() {
        let registry = ToolRegistry::empty().with_tool("yt-dlp", "/opt/yt-dlp");
        assert_eq!(registry.get("yt-dlp").unwrap().path, PathBuf::from("/opt/yt-dlp"));
        assert!(registry.get("ffmpeg").is_none());
    }

    #[test]
    fn tool_paths_deserialize_partial() {
        let paths: ToolPaths = serde_json::from_str(r#"{"ffmpeg_path":"/usr/bin/ffmpeg"}"#).unwrap();
        assert_eq!(paths.ffmpeg_path, Some(PathBuf::from("/usr/bin/ffmpeg")));
        assert!(paths.ytdlp_path.is_none());
    }
}
