//! Replace-on-write file helpers

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, RewriteError};

/// Write bytes to `path` atomically: temp file, fsync, rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    debug!(path = %path.display(), len = bytes.len(), "write_atomic: called");
    let tmp_path = tmp_path_for(path);

    {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| RewriteError::io(&tmp_path, e))?;
        file.write_all(bytes).map_err(|e| RewriteError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| RewriteError::io(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| RewriteError::io(path, e))
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| RewriteError::json(path, e))?;
    write_atomic(path, &bytes)
}

/// Read and parse a JSON file, returning None if it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    debug!(path = %path.display(), "read_json: called");
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("read_json: file not found");
            return Ok(None);
        }
        Err(e) => return Err(RewriteError::io(path, e)),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RewriteError::json(path, e))
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
