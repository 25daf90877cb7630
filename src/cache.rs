//! Cache directory layout for compressed uploads.
//!
//! Files are stored under `<cache_root>/uploads/` as
//! `<sha256 of source path>-<nonce>.jpg`. Every normalization gets its own
//! file, so two runs over the same source never share one. The caller that
//! requested a normalization owns the resulting file and removes it once the
//! upload is done.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub const UPLOADS_DIR: &str = "uploads";

pub fn uploads_dir(cache_root: &Path) -> PathBuf {
    cache_root.join(UPLOADS_DIR)
}

pub fn hash_key(source: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_os_str().to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fresh path for one compressed upload of `source`.
pub fn upload_path(cache_root: &Path, source: &Path) -> PathBuf {
    uploads_dir(cache_root).join(format!("{}-{}.jpg", hash_key(source), nonce()))
}

fn nonce() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{ts_nanos:x}{seq:04x}")
}

/// Delete one upload file. A file that is already gone is not an error.
pub fn remove_upload(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed upload file");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("Removing upload file {}", path.display()))
        }
    }
}

/// Delete every file in the uploads directory, returning how many were removed.
pub fn clear_uploads(cache_root: &Path) -> Result<usize> {
    let dir = uploads_dir(cache_root);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => {
            return Err(err).with_context(|| format!("Listing uploads in {}", dir.display()));
        }
    };
    let mut removed = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => warn!(path = %path.display(), "Failed to remove stale upload: {err}"),
        }
    }
    debug!(removed, dir = %dir.display(), "Cleared uploads");
    Ok(removed)
}

/// Sibling path used to write a file before renaming it into place.
pub(crate) fn unique_temp_path(path: &Path) -> PathBuf {
    let mut temp_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("upload.jpg")
        .to_string();
    temp_name.push_str(&format!(".tmp-{}", nonce()));
    path.with_file_name(temp_name)
}
