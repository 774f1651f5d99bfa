use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

pub type FileSystemRef = Arc<dyn FileSystem + Send + Sync>;

/// The freshness stamp the cache stores next to each entry: a changed mtime
/// or size invalidates the entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileStamp {
  pub mtime_ms: u64,
  pub size: u64,
}

pub trait FileSystem {
  fn cwd(&self) -> io::Result<PathBuf>;

  /// Absolute, normalized form of `path`, resolving `.`/`..` components and
  /// (for the OS implementation) symlinks.
  fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

  fn exists(&self, path: &Path) -> bool;

  fn is_file(&self, path: &Path) -> bool;

  fn is_dir(&self, path: &Path) -> bool;

  fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

  fn read_to_string(&self, path: &Path) -> io::Result<String>;

  fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

  fn create_dir_all(&self, path: &Path) -> io::Result<()>;

  fn remove_file(&self, path: &Path) -> io::Result<()>;

  fn stamp(&self, path: &Path) -> io::Result<FileStamp>;
}
