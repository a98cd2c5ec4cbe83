//! JSON file persistence shared by the registry snapshot and delayed queue
//!
//! Writes are atomic: serialize to a sibling temp file, fsync, rename over
//! the target, then fsync the parent directory so the rename itself is
//! durable. A reader never observes a half-written artifact.

use crate::error::{Error, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Read and parse a JSON file
///
/// Returns `Ok(None)` when the file does not exist and
/// `Err(Error::StorageCorrupt)` when it exists but does not parse.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::StorageCorrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Serialize `value` and atomically replace `path` with it
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let temp_path = sibling(path, "tmp");
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path).await?;
    sync_parent_dir(path).await?;
    Ok(())
}

/// Flush the directory entry of `path` (no-op where directories cannot be opened)
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::File::open(parent).await?.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

/// Copy a malformed artifact next to itself before it gets replaced
///
/// Each copy gets its own `<path>.corrupt-<UTC timestamp>[-n]` name so an
/// earlier copy is never overwritten. Returns the path of the copy.
pub async fn preserve_corrupt(path: &Path) -> Result<PathBuf> {
    let stamp = format!("corrupt-{}", Utc::now().format("%Y%m%dT%H%M%SZ"));
    let mut backup = sibling(path, &stamp);
    let mut n = 1;
    while fs::try_exists(&backup).await? {
        backup = sibling(path, &format!("{}-{}", stamp, n));
        n += 1;
    }

    fs::copy(path, &backup).await?;
    Ok(backup)
}

/// `delayed.json` + `tmp` -> `delayed.json.tmp`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
