//! Local directory sink: files are written to disk, texts appended to a log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use super::NotificationSink;
use crate::error::{RelayError, Result};

/// Name of the file collecting delivered texts.
pub const TEXT_LOG: &str = "messages.txt";

/// Delivers into a local directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Use `dir`, creating it if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| RelayError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl NotificationSink for DirectorySink {
    fn send_text(&mut self, text: &str) -> Result<()> {
        let path = self.dir.join(TEXT_LOG);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RelayError::io(&path, e))?;
        writeln!(file, "{text}\n").map_err(|e| RelayError::io(&path, e))?;
        info!(path = %path.display(), chars = text.chars().count(), "Stored text");
        Ok(())
    }

    fn send_file(&mut self, file_name: &str, bytes: &[u8], caption: Option<&str>) -> Result<()> {
        let name: String = file_name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        // Avoid overwriting, append a counter if needed
        let path = unique_path(&self.dir.join(name));
        std::fs::write(&path, bytes).map_err(|e| RelayError::io(&path, e))?;
        info!(path = %path.display(), caption = caption.unwrap_or(""), size = bytes.len(), "Stored file");
        Ok(())
    }
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    for i in 1..1000 {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
    }

    parent.join(format!("{stem}_dup.{ext}"))
}
