use std::collections::HashMap;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;

use crate::FileStamp;
use crate::FileSystem;

#[derive(Clone, Debug)]
struct FileEntry {
  contents: Vec<u8>,
  mtime_ms: u64,
}

/// In-memory [`FileSystem`] used by the test suite.
///
/// Writes tick a monotonic clock, so rewriting a file always changes its
/// stamp (the cache relies on that to notice modifications).
#[derive(Debug, Default)]
pub struct InMemoryFileSystem {
  files: RwLock<HashMap<PathBuf, FileEntry>>,
  dirs: RwLock<HashSet<PathBuf>>,
  clock: AtomicU64,
}

impl InMemoryFileSystem {
  pub fn new() -> Self {
    Self::default()
  }

  fn normalize(&self, path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
      path.to_path_buf()
    } else {
      PathBuf::from("/").join(path)
    };
    crate::normalize_path(&absolute)
  }

  fn tick(&self) -> u64 {
    self.clock.fetch_add(1, Ordering::SeqCst) + 1
  }
}

impl FileSystem for InMemoryFileSystem {
  fn cwd(&self) -> io::Result<PathBuf> {
    Ok(PathBuf::from("/"))
  }

  fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
    let normalized = self.normalize(path);
    if self.exists(&normalized) {
      Ok(normalized)
    } else {
      Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("No such file or directory: {}", normalized.display()),
      ))
    }
  }

  fn exists(&self, path: &Path) -> bool {
    self.is_file(path) || self.is_dir(path)
  }

  fn is_file(&self, path: &Path) -> bool {
    self.files.read().contains_key(&self.normalize(path))
  }

  fn is_dir(&self, path: &Path) -> bool {
    let normalized = self.normalize(path);
    if normalized == Path::new("/") || self.dirs.read().contains(&normalized) {
      return true;
    }
    self
      .files
      .read()
      .keys()
      .any(|file| file.starts_with(&normalized) && file != &normalized)
  }

  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    let normalized = self.normalize(path);
    self
      .files
      .read()
      .get(&normalized)
      .map(|entry| entry.contents.clone())
      .ok_or_else(|| {
        io::Error::new(
          io::ErrorKind::NotFound,
          format!("No such file: {}", normalized.display()),
        )
      })
  }

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    String::from_utf8(self.read(path)?)
      .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
  }

  fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    let normalized = self.normalize(path);
    let mtime_ms = self.tick();
    self.files.write().insert(
      normalized,
      FileEntry {
        contents: contents.to_vec(),
        mtime_ms,
      },
    );
    Ok(())
  }

  fn create_dir_all(&self, path: &Path) -> io::Result<()> {
    let normalized = self.normalize(path);
    let mut dirs = self.dirs.write();
    let mut current = PathBuf::new();
    for component in normalized.components() {
      current.push(component);
      dirs.insert(current.clone());
    }
    Ok(())
  }

  fn remove_file(&self, path: &Path) -> io::Result<()> {
    let normalized = self.normalize(path);
    self.files.write().remove(&normalized).map(|_| ()).ok_or_else(|| {
      io::Error::new(
        io::ErrorKind::NotFound,
        format!("No such file: {}", normalized.display()),
      )
    })
  }

  fn stamp(&self, path: &Path) -> io::Result<FileStamp> {
    let normalized = self.normalize(path);
    self
      .files
      .read()
      .get(&normalized)
      .map(|entry| FileStamp {
        mtime_ms: entry.mtime_ms,
        size: entry.contents.len() as u64,
      })
      .ok_or_else(|| {
        io::Error::new(
          io::ErrorKind::NotFound,
          format!("No such file: {}", normalized.display()),
        )
      })
  }
}
