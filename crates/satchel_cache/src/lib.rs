//! Persistent cache of per-asset processed results.
//!
//! One file per entry, keyed by the identifier hash of the asset path. An
//! entry is only served while the source file's mtime and size match the
//! stamps recorded at write time and the option fingerprint is unchanged.
//! The cache is an accelerator, never a source of truth: every read or
//! write failure degrades to a miss or a no-op.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use satchel_core::hash::hash_path;
use satchel_core::types::ProcessedResult;
use satchel_filesystem::FileSystemRef;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
  mtime_ms: u64,
  size: u64,
  fingerprint: String,
  result: ProcessedResult,
}

pub struct Cache {
  fs: FileSystemRef,
  dir: PathBuf,
  fingerprint: String,
}

impl Cache {
  pub fn new(fs: FileSystemRef, dir: PathBuf, fingerprint: String) -> Self {
    if let Err(error) = fs.create_dir_all(&dir) {
      tracing::warn!(dir = %dir.display(), %error, "Failed to create cache directory");
    }

    Cache {
      fs,
      dir,
      fingerprint,
    }
  }

  fn entry_path(&self, asset_path: &Path) -> PathBuf {
    self.dir.join(format!("{}.json", hash_path(asset_path)))
  }

  /// The stored result for `asset_path`, provided the file on disk still
  /// matches the recorded stamps and the options haven't changed.
  pub fn read(&self, asset_path: &Path) -> Option<ProcessedResult> {
    let stamp = self.fs.stamp(asset_path).ok()?;
    let raw = self.fs.read(&self.entry_path(asset_path)).ok()?;

    let entry: CacheEntry = match serde_json::from_slice(&raw) {
      Ok(entry) => entry,
      Err(error) => {
        tracing::debug!(path = %asset_path.display(), %error, "Discarding unreadable cache entry");
        return None;
      }
    };

    if entry.mtime_ms != stamp.mtime_ms
      || entry.size != stamp.size
      || entry.fingerprint != self.fingerprint
    {
      return None;
    }

    Some(entry.result)
  }

  pub fn write(&self, asset_path: &Path, result: &ProcessedResult) {
    let Ok(stamp) = self.fs.stamp(asset_path) else {
      return;
    };

    let entry = CacheEntry {
      mtime_ms: stamp.mtime_ms,
      size: stamp.size,
      fingerprint: self.fingerprint.clone(),
      result: result.clone(),
    };

    let serialized = match serde_json::to_vec(&entry) {
      Ok(serialized) => serialized,
      Err(error) => {
        tracing::warn!(path = %asset_path.display(), %error, "Failed to serialize cache entry");
        return;
      }
    };

    if let Err(error) = self.fs.write(&self.entry_path(asset_path), &serialized) {
      tracing::warn!(path = %asset_path.display(), %error, "Failed to write cache entry");
    }
  }

  pub fn invalidate(&self, asset_path: &Path) {
    let _ = self.fs.remove_file(&self.entry_path(asset_path));
  }
}
