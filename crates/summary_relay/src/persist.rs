use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("settings directory missing or not writable: {0}")]
    Dir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure the directory holding persisted settings exists; create if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::Dir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::Dir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::Dir(e.to_string()))?;
    }
    Ok(())
}

/// Reads a file that may legitimately not exist yet.
pub fn read_optional(path: &Path) -> Result<Option<String>, PersistError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(PersistError::Io(err)),
    }
}

/// Atomically replaces `{dir}/{filename}`: write a temp file in `dir`, then rename over the target.
///
/// Readers never observe a half-written settings file.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}
