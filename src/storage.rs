//! User-data directory layout and file helpers.
//!
//! Everything the application persists lives under one root (default
//! `~/.moves`):
//!
//! ```text
//! ~/.moves/
//!   settings.toml
//!   models/asr/                     recognizer artifacts
//!   speakers/<speaker_id>/
//!     speaker.json
//!     sections.json
//!     presentation.pdf              cached copy
//!     transcript.pdf               cached copy
//! ```
//!
//! The root is an explicit value threaded through constructors rather than
//! process-wide state, so tests point it at a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// The standard per-user root, `~/.moves`.
    pub fn default_root() -> Result<Self> {
        let home = dirs::home_dir().context("Cannot determine the user home directory")?;
        Ok(Self::at(home.join(".moves")))
    }

    /// A root at an explicit location.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.toml")
    }

    pub fn speakers_dir(&self) -> PathBuf {
        self.root.join("speakers")
    }

    pub fn speaker_dir(&self, speaker_id: &str) -> PathBuf {
        self.speakers_dir().join(speaker_id)
    }

    pub fn asr_model_dir(&self) -> PathBuf {
        self.root.join("models").join("asr")
    }

    /// Write `contents` to `path`, creating parent directories as needed.
    pub fn write_text(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create directory: {}", parent.display()))?;
        }
        fs::write(path, contents).with_context(|| format!("Write failed: {}", path.display()))
    }

    pub fn read_text(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            bail!("File not found: {}", path.display());
        }
        fs::read_to_string(path).with_context(|| format!("Read failed: {}", path.display()))
    }

    /// Copy an external file into the data directory under a fixed name.
    pub fn cache_file(&self, source: &Path, target: &Path) -> Result<()> {
        if !source.exists() {
            bail!("Source not found: {}", source.display());
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create directory: {}", parent.display()))?;
        }
        fs::copy(source, target).with_context(|| {
            format!(
                "Copy failed: {} -> {}",
                source.display(),
                target.display()
            )
        })?;
        Ok(())
    }

    /// Remove a directory tree under the root.
    pub fn delete_dir(&self, path: &Path) -> Result<()> {
        if !path.starts_with(&self.root) {
            bail!("Refusing to delete outside the data directory: {}", path.display());
        }
        if !path.exists() {
            bail!("Path not found: {}", path.display());
        }
        fs::remove_dir_all(path).with_context(|| format!("Delete failed: {}", path.display()))
    }

    /// Subdirectories of `path`, sorted by name; empty when `path` is absent.
    pub fn subdirectories(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = fs::read_dir(path)
            .with_context(|| format!("List failed: {}", path.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_data_dir() -> (tempfile::TempDir, DataDir) {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::at(dir.path());
        (dir, data)
    }

    #[test]
    fn test_write_creates_parents_and_read_round_trips() {
        let (_guard, data) = temp_data_dir();
        let path = data.speaker_dir("alice-x1y2z").join("speaker.json");
        data.write_text(&path, "{}").unwrap();
        assert_eq!(data.read_text(&path).unwrap(), "{}");
    }

    #[test]
    fn test_read_missing_file_errors() {
        let (_guard, data) = temp_data_dir();
        assert!(data.read_text(&data.settings_file()).is_err());
    }

    #[test]
    fn test_cache_file() {
        let (_guard, data) = temp_data_dir();
        let source = tempfile::NamedTempFile::new().unwrap();
        fs::write(source.path(), b"pdf bytes").unwrap();

        let target = data.speaker_dir("bob-a1b2c").join("presentation.pdf");
        data.cache_file(source.path(), &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"pdf bytes");
    }

    #[test]
    fn test_cache_missing_source_errors() {
        let (_guard, data) = temp_data_dir();
        let target = data.speaker_dir("bob-a1b2c").join("presentation.pdf");
        assert!(data
            .cache_file(Path::new("/nonexistent/input.pdf"), &target)
            .is_err());
    }

    #[test]
    fn test_subdirectories_sorted_and_missing_ok() {
        let (_guard, data) = temp_data_dir();
        assert!(data.subdirectories(&data.speakers_dir()).unwrap().is_empty());

        fs::create_dir_all(data.speaker_dir("b-speaker")).unwrap();
        fs::create_dir_all(data.speaker_dir("a-speaker")).unwrap();
        let dirs = data.subdirectories(&data.speakers_dir()).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("a-speaker"));
    }

    #[test]
    fn test_delete_dir_refuses_outside_root() {
        let (_guard, data) = temp_data_dir();
        let outside = tempfile::tempdir().unwrap();
        assert!(data.delete_dir(outside.path()).is_err());
        assert!(outside.path().exists());
    }

    #[test]
    fn test_delete_dir() {
        let (_guard, data) = temp_data_dir();
        let dir = data.speaker_dir("gone-11111");
        fs::create_dir_all(&dir).unwrap();
        data.delete_dir(&dir).unwrap();
        assert!(!dir.exists());
    }
}
