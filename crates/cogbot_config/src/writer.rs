//! Blocking file operations for bucket documents.
//!
//! Everything here touches the disk synchronously; the store runs these
//! through `spawn_blocking` so a large bucket never stalls the runtime.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConfigStoreError, Result};
use crate::scope::Scope;

/// A bucket's key-value document
pub type Bucket = Map<String, Value>;

/// A bucket file found while scanning the config directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketFile {
    pub scope: Scope,
    pub path: PathBuf,
    pub modified: SystemTime,
}

pub fn bucket_path(dir: &Path, scope: Scope) -> PathBuf {
    dir.join(scope.file_name())
}

/// Write a bucket without ever exposing a partial file.
///
/// The document goes to a temp file in the same directory which is then
/// persisted over the target (`rename(2)` on Unix, replacing `MoveFileExW`
/// on Windows). If anything fails the temp file is dropped, which deletes
/// it, and the previously committed file is left as it was.
///
/// Returns the committed file's modification time.
pub fn write_bucket(dir: &Path, scope: Scope, data: &Bucket) -> Result<SystemTime> {
    let target = bucket_path(dir, scope);
    let content = serde_json::to_vec_pretty(data).map_err(|e| ConfigStoreError::NotSerializable {
        key: scope.to_string(),
        cause: e,
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", scope.file_stem()))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| ConfigStoreError::io(dir, "create temp file in", e))?;

    temp.write_all(&content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| ConfigStoreError::io(temp.path(), "write", e))?;

    temp.persist(&target)
        .map_err(|e| ConfigStoreError::io(&target, "replace", e.error))?;

    let modified = modified_time(&target)?;
    debug!(bucket = %scope, path = %target.display(), "wrote bucket file");
    Ok(modified)
}

/// Read and parse one bucket file, with the mtime observed before reading.
pub fn read_bucket(path: &Path) -> Result<(Bucket, SystemTime)> {
    let modified = modified_time(path)?;
    let content = std::fs::read(path).map_err(|e| ConfigStoreError::io(path, "read", e))?;
    let data = serde_json::from_slice::<Bucket>(&content)
        .map_err(|e| ConfigStoreError::parse(path, e))?;
    Ok((data, modified))
}

/// Like [`read_bucket`], but a missing file is `Ok(None)`.
pub fn read_bucket_if_exists(dir: &Path, scope: Scope) -> Result<Option<(Bucket, SystemTime)>> {
    let path = bucket_path(dir, scope);
    match read_bucket(&path) {
        Ok(loaded) => Ok(Some(loaded)),
        Err(ConfigStoreError::BucketIo { cause, .. })
            if cause.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// List every bucket file in `dir` with its modification time.
///
/// Temp files and JSON files that don't name a bucket are skipped.
pub fn scan_dir(dir: &Path) -> Result<Vec<BucketFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigStoreError::io(dir, "list", e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigStoreError::io(dir, "list", e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(scope) = Scope::from_file_stem(stem) else {
            debug!(path = %path.display(), "ignoring non-bucket file");
            continue;
        };

        // a file can vanish between listing and stat
        let modified = match modified_time(&path) {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        files.push(BucketFile {
            scope,
            path,
            modified,
        });
    }

    files.sort_by_key(|f| f.scope);
    Ok(files)
}

fn modified_time(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| ConfigStoreError::io(path, "stat", e))
}
