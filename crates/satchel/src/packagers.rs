mod css;
mod html;
mod js;
mod raw;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use satchel_core::types::FileType;
use satchel_core::types::ResolvedOptions;
use satchel_core::BundlerError;
use satchel_filesystem::FileSystemRef;

use crate::asset_graph::AssetGraph;
use crate::bundle_tree::Bundle;
use crate::bundle_tree::BundleTree;

pub use css::CssPackager;
pub use html::HtmlPackager;
pub use js::JsPackager;
pub use raw::RawPackager;

pub struct PackageContext<'a> {
  pub bundle: &'a Bundle,
  pub tree: &'a BundleTree,
  pub graph: &'a AssetGraph,
  pub options: &'a ResolvedOptions,
  pub fs: &'a FileSystemRef,
  pub output_path: &'a Path,
  /// The bundle's content hash from the previous build, if any. A matching
  /// hash lets the packager skip the write entirely.
  pub previous_hash: Option<&'a str>,
}

/// Combines a bundle's member artifacts into one output file.
///
/// Returns the content hash of the emitted file; hashes propagate upward so
/// the next rebuild can skip unchanged bundles.
#[async_trait]
pub trait Packager: Send + Sync {
  async fn package(&self, ctx: PackageContext<'_>) -> anyhow::Result<String>;
}

/// Write `contents` unless the previous build already produced the same
/// bytes. Shared by all built-in packagers.
pub(crate) fn write_if_changed(
  ctx: &PackageContext<'_>,
  contents: &[u8],
) -> anyhow::Result<String> {
  let hash = satchel_core::hash::hash_bytes(contents);
  if ctx.previous_hash == Some(hash.as_str()) {
    tracing::debug!(bundle = %ctx.bundle.name, "Bundle unchanged, skipping write");
    return Ok(hash);
  }

  ctx
    .fs
    .write(ctx.output_path, contents)
    .map_err(|error| BundlerError::io(ctx.output_path, "write", error))?;
  tracing::debug!(bundle = %ctx.bundle.name, bytes = contents.len(), "Wrote bundle");
  Ok(hash)
}

/// Output type → packager, frozen once bundling starts. Unknown types fall
/// back to the raw packager.
pub struct PackagerRegistry {
  packagers: BTreeMap<FileType, Arc<dyn Packager>>,
  fallback: Arc<dyn Packager>,
  locked: bool,
}

impl Default for PackagerRegistry {
  fn default() -> Self {
    let mut packagers: BTreeMap<FileType, Arc<dyn Packager>> = BTreeMap::new();
    packagers.insert(FileType::Js, Arc::new(JsPackager));
    packagers.insert(FileType::Css, Arc::new(CssPackager));
    packagers.insert(FileType::Html, Arc::new(HtmlPackager));

    PackagerRegistry {
      packagers,
      fallback: Arc::new(RawPackager),
      locked: false,
    }
  }
}

impl PackagerRegistry {
  pub fn register_packager(
    &mut self,
    file_type: FileType,
    packager: Arc<dyn Packager>,
  ) -> Result<(), BundlerError> {
    if self.locked {
      return Err(BundlerError::ConfigLocked);
    }
    self.packagers.insert(file_type, packager);
    Ok(())
  }

  pub fn lock(&mut self) {
    self.locked = true;
  }

  pub fn get(&self, file_type: &FileType) -> Arc<dyn Packager> {
    self
      .packagers
      .get(file_type)
      .cloned()
      .unwrap_or_else(|| self.fallback.clone())
  }
}
