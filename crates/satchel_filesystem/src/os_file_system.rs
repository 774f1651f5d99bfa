use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use crate::FileStamp;
use crate::FileSystem;

#[derive(Clone, Debug, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
  fn cwd(&self) -> io::Result<PathBuf> {
    std::env::current_dir()
  }

  fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
    fs::canonicalize(path)
  }

  fn exists(&self, path: &Path) -> bool {
    path.exists()
  }

  fn is_file(&self, path: &Path) -> bool {
    path.is_file()
  }

  fn is_dir(&self, path: &Path) -> bool {
    path.is_dir()
  }

  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    fs::read(path)
  }

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
  }

  fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)
  }

  fn create_dir_all(&self, path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
  }

  fn remove_file(&self, path: &Path) -> io::Result<()> {
    fs::remove_file(path)
  }

  fn stamp(&self, path: &Path) -> io::Result<FileStamp> {
    let metadata = fs::metadata(path)?;
    let mtime_ms = metadata
      .modified()?
      .duration_since(UNIX_EPOCH)
      .map(|duration| duration.as_millis() as u64)
      .unwrap_or(0);

    Ok(FileStamp {
      mtime_ms,
      size: metadata.len(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stamp_reflects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    let fs = OsFileSystem;

    fs.write(&path, b"one").unwrap();
    let first = fs.stamp(&path).unwrap();
    assert_eq!(first.size, 3);

    fs.write(&path, b"longer").unwrap();
    let second = fs.stamp(&path).unwrap();
    assert_eq!(second.size, 6);
  }
}
