use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use satchel_core::types::AssetId;
use satchel_core::types::DependencyRecord;
use satchel_core::types::FileType;
use satchel_core::types::Generated;
use satchel_core::types::Package;

use crate::assets::emitted_name;
use crate::bundle_tree::BundleId;

/// One source file plus its processing state within the dependency graph.
#[derive(Clone, Debug)]
pub struct AssetNode {
  pub id: AssetId,
  pub path: PathBuf,
  pub file_type: FileType,
  pub package: Arc<Package>,

  /// Set before the worker job is dispatched, so concurrent walks that
  /// converge on this asset share one job. Cleared by [`AssetNode::invalidate`].
  pub processed: bool,
  pub generated: Option<Generated>,
  pub hash: Option<String>,

  /// Outgoing edges in source order.
  pub dependencies: IndexMap<String, DependencyRecord>,
  /// Resolved counterpart of `dependencies`. Included-in-parent edges have
  /// no entry here; they live in the graph's `included_paths` map.
  pub dep_assets: IndexMap<String, AssetId>,

  pub parent_bundle: Option<BundleId>,
  /// Every bundle this asset is written into; more than one when the asset
  /// emits artifacts for several output types.
  pub bundles: HashSet<BundleId>,
  /// Incoming `(importer, specifier)` edges, for reverse lookup.
  pub parent_deps: HashSet<(AssetId, String)>,
}

impl AssetNode {
  /// Drop all processing state so the next build recomputes it from scratch.
  pub fn invalidate(&mut self) {
    self.processed = false;
    self.generated = None;
    self.hash = None;
    self.dependencies.clear();
    self.dep_assets.clear();
  }

  /// Clear only bundle membership; ran on every asset before the bundle
  /// tree is rebuilt so the builder starts from a clean slate.
  pub fn invalidate_bundle(&mut self) {
    self.parent_bundle = None;
    self.bundles.clear();
    self.parent_deps.clear();
  }

  /// The output filename for a bundle rooted at this asset. Entry bundles
  /// keep the human-readable stem; everything else gets the hashed name the
  /// URL helper already hands out.
  pub fn bundle_name(&self, is_entry: bool) -> String {
    if is_entry {
      let stem = self
        .path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "bundle".to_string());
      format!("{stem}.{}", self.file_type.extension())
    } else {
      emitted_name(&self.path)
    }
  }
}

/// The in-memory dependency graph: an arena of assets addressed by id, with
/// a path index for resolution sharing.
#[derive(Debug, Default)]
pub struct AssetGraph {
  assets: HashMap<AssetId, AssetNode>,
  loaded_paths: HashMap<PathBuf, AssetId>,
  /// Files whose content is inlined into other assets' output, keyed by
  /// resolved path. A watcher event for one of these invalidates the owners.
  included_paths: HashMap<PathBuf, HashSet<AssetId>>,
  next_id: AssetId,
}

impl AssetGraph {
  pub fn new() -> Self {
    AssetGraph::default()
  }

  pub fn insert(&mut self, path: PathBuf, file_type: FileType, package: Arc<Package>) -> AssetId {
    if let Some(id) = self.loaded_paths.get(&path) {
      return *id;
    }

    let id = self.next_id;
    self.next_id += 1;

    self.loaded_paths.insert(path.clone(), id);
    self.assets.insert(
      id,
      AssetNode {
        id,
        path,
        file_type,
        package,
        processed: false,
        generated: None,
        hash: None,
        dependencies: IndexMap::new(),
        dep_assets: IndexMap::new(),
        parent_bundle: None,
        bundles: HashSet::new(),
        parent_deps: HashSet::new(),
      },
    );
    id
  }

  pub fn get(&self, id: AssetId) -> Option<&AssetNode> {
    self.assets.get(&id)
  }

  pub fn get_mut(&mut self, id: AssetId) -> Option<&mut AssetNode> {
    self.assets.get_mut(&id)
  }

  pub fn id_for_path(&self, path: &Path) -> Option<AssetId> {
    self.loaded_paths.get(path).copied()
  }

  pub fn len(&self) -> usize {
    self.assets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.assets.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &AssetNode> {
    self.assets.values()
  }

  /// Asset ids whose worker job hasn't run yet: the load frontier.
  pub fn unprocessed(&self) -> Vec<AssetId> {
    let mut ids: Vec<AssetId> = self
      .assets
      .values()
      .filter(|asset| !asset.processed)
      .map(|asset| asset.id)
      .collect();
    ids.sort_unstable();
    ids
  }

  pub fn register_included(&mut self, path: PathBuf, owner: AssetId) {
    self.included_paths.entry(path).or_default().insert(owner);
  }

  pub fn owners_of_included(&self, path: &Path) -> Vec<AssetId> {
    let mut owners: Vec<AssetId> = self
      .included_paths
      .get(path)
      .map(|owners| owners.iter().copied().collect())
      .unwrap_or_default();
    owners.sort_unstable();
    owners
  }

  /// Clear all bundle assignments ahead of a bundle-tree rebuild.
  pub fn invalidate_bundles(&mut self) {
    for asset in self.assets.values_mut() {
      asset.invalidate_bundle();
    }
  }

  /// Assets that ended up without a bundle after allocation.
  pub fn find_orphan_assets(&self) -> impl Iterator<Item = &AssetNode> {
    self
      .assets
      .values()
      .filter(|asset| asset.parent_bundle.is_none())
  }

  /// Remove an asset entirely. Returns its path so the caller can unwatch
  /// it. Inlined-file registrations owned by the asset are dropped too.
  pub fn remove(&mut self, id: AssetId) -> Option<PathBuf> {
    let asset = self.assets.remove(&id)?;
    self.loaded_paths.remove(&asset.path);

    self.included_paths.retain(|_, owners| {
      owners.remove(&id);
      !owners.is_empty()
    });

    Some(asset.path)
  }
}
