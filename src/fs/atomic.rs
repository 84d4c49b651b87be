use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    /// Could not even create the temp file; points at local resource
    /// pressure rather than the destination.
    #[error("Failed to create temporary file in {dir:?}: {source}")]
    TempFile { dir: PathBuf, source: io::Error },
    #[error("Failed to write temporary file for {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    /// The final rename onto the target failed; the destination is the
    /// problem (permissions, missing directory, cross-device rename).
    #[error("Failed to replace {path:?}: {source}")]
    Replace { path: PathBuf, source: io::Error },
}

/// Writes `content` to `path` without ever exposing a partially written
/// file: the content goes to a temp file in the target's directory, is
/// flushed to disk, and then renamed onto the target in one operation. The
/// temp file is removed on every exit path.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), WriteError> {
    // Same directory as the target so the rename stays on one filesystem
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(|source| WriteError::TempFile {
        dir: dir.to_path_buf(),
        source,
    })?;

    temp.write_all(content.as_bytes())
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|source| WriteError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    temp.persist(path).map_err(|err| WriteError::Replace {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    Ok(())
}
