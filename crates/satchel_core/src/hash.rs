use std::path::Path;

use xxhash_rust::xxh3::xxh3_64;
use xxhash_rust::xxh3::Xxh3;

/// Satchel needs a hasher for the identifiers used in cache keys and output
/// filenames.
///
/// The hashes don't need to be incredibly fast, but they must be stable
/// across runs, machines, platforms and versions: they end up written to
/// disk, both inside emitted bundles and in the cache directory.
pub type IdentifierHasher = Xxh3;

pub fn hash_bytes(bytes: &[u8]) -> String {
  format!("{:016x}", xxh3_64(bytes))
}

pub fn hash_string(s: &str) -> String {
  hash_bytes(s.as_bytes())
}

pub fn hash_path(path: &Path) -> String {
  hash_bytes(path.to_string_lossy().as_bytes())
}
