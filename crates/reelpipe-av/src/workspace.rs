//! Scoped scratch directories for subprocess work.
//!
//! A [`Workspace`] owns a temporary directory that is removed when the
//! workspace is dropped, so every exit path (success, error, timeout, task
//! cancellation) releases it.

use std::path::{Path, PathBuf};

use reelpipe_common::{Error, Result};
use tempfile::TempDir;

/// Temporary directory for intermediate files.
///
/// # Example
///
/// ```no_run
/// use reelpipe_av::Workspace;
///
/// # async fn example() -> reelpipe_common::Result<()> {
/// let workspace = Workspace::new()?;
/// let input = workspace.write_input("input.mp4", b"...").await?;
/// let output = workspace.temp_file("output.mp4");
/// // ... run a tool from `input` to `output` ...
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a workspace in the system temp directory.
    pub fn new() -> Result<Self> {
        Self::build(None)
    }

    /// Create a workspace inside `root`, creating `root` if needed.
    pub fn new_in(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| workspace_error(format!(
            "failed to create work dir {}: {e}",
            root.display()
        )))?;
        Self::build(Some(root))
    }

    fn build(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("reelpipe-");
        let temp_dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| workspace_error(format!("failed to create temp dir: {e}")))?;

        Ok(Self { temp_dir })
    }

    /// Path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a path for a named temporary file inside the workspace.
    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Write `bytes` to `name` inside the workspace and return its path.
    pub async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.temp_file(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub fn close(self) -> Result<()> {
        self.temp_dir.close().map_err(Error::from)
    }
}

fn workspace_error(message: String) -> Error {
    Error::Tool {
        tool: "workspace".to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_file_inside_workspace() {
        let ws = Workspace::new().unwrap();
        let tf = ws.temp_file("output.mp4");
        assert!(tf.starts_with(ws.path()));
        assert_eq!(tf.file_name().unwrap(), "output.mp4");
    }

    #[test]
    fn dropped_workspace_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new_in(root.path()).unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("reelpipe-"));

        drop(ws);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn new_in_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("media").join("work");
        let ws = Workspace::new_in(&nested).unwrap();
        assert!(ws.path().starts_with(&nested));
        ws.close().unwrap();
        assert!(nested.exists());
    }

    #[tokio::test]
    async fn write_input_persists_bytes() {
        let ws = Workspace::new().unwrap();
        let path = ws.write_input("input.bin", b"payload").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }
}
