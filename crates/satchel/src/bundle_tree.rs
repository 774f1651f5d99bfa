use std::collections::BTreeMap;
use std::collections::HashSet;

use indexmap::IndexSet;

use satchel_core::types::AssetId;
use satchel_core::types::DependencyRecord;
use satchel_core::types::FileType;

use crate::asset_graph::AssetGraph;

pub type BundleId = u32;

/// One output file: a node in the bundle tree.
#[derive(Clone, Debug)]
pub struct Bundle {
  pub id: BundleId,
  pub bundle_type: FileType,
  pub name: String,
  pub entry_asset: Option<AssetId>,
  /// Member assets, in traversal order.
  pub assets: IndexSet<AssetId>,
  pub parent: Option<BundleId>,
  pub children: Vec<BundleId>,
  /// Bundles produced alongside this one from the same entry but emitting a
  /// different output type. Siblings are also children in the tree.
  pub siblings: BTreeMap<FileType, BundleId>,
}

/// Allocates assets to bundles. Built fresh on every rebuild; bundles do
/// not persist across builds.
#[derive(Debug, Default)]
pub struct BundleTree {
  bundles: Vec<Bundle>,
  root: BundleId,
}

impl BundleTree {
  /// Walk the graph from `entry`, clearing previous bundle assignments
  /// first, and allocate every reachable asset.
  pub fn build(graph: &mut AssetGraph, entry: AssetId) -> BundleTree {
    graph.invalidate_bundles();
    let mut tree = BundleTree {
      bundles: Vec::new(),
      root: 0,
    };
    tree.create_bundle_tree(graph, entry, None, None);
    tree
  }

  pub fn root(&self) -> BundleId {
    self.root
  }

  pub fn get(&self, id: BundleId) -> &Bundle {
    &self.bundles[id as usize]
  }

  pub fn len(&self) -> usize {
    self.bundles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bundles.is_empty()
  }

  pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
    self.bundles.iter()
  }

  /// Bundle ids children-first, the order packaging runs in.
  pub fn post_order(&self) -> Vec<BundleId> {
    let mut order = Vec::with_capacity(self.bundles.len());
    if !self.bundles.is_empty() {
      self.visit_post_order(self.root, &mut order);
    }
    order
  }

  fn visit_post_order(&self, id: BundleId, order: &mut Vec<BundleId>) {
    for child in self.get(id).children.clone() {
      self.visit_post_order(child, order);
    }
    order.push(id);
  }

  fn create_bundle_tree(
    &mut self,
    graph: &mut AssetGraph,
    asset_id: AssetId,
    dep: Option<(AssetId, &DependencyRecord)>,
    bundle: Option<BundleId>,
  ) {
    if let Some((importer, record)) = dep {
      if let Some(asset) = graph.get_mut(asset_id) {
        asset.parent_deps.insert((importer, record.name.clone()));
      }
    }

    // An asset seen before was already traversed under its first bundle;
    // a second reference only decides whether it gets hoisted.
    let existing_parent = graph.get(asset_id).and_then(|asset| asset.parent_bundle);
    if let Some(parent_bundle) = existing_parent {
      if let Some(bundle) = bundle {
        if parent_bundle != bundle {
          let ancestor = self.find_common_ancestor(bundle, parent_bundle);
          if parent_bundle != ancestor
            && self.get(parent_bundle).bundle_type == self.get(ancestor).bundle_type
          {
            self.move_asset_to_bundle(graph, asset_id, ancestor);
          }
        }
      }
      return;
    }

    let (asset_type, root_name, child_name) = {
      let asset = graph.get(asset_id).expect("asset exists during allocation");
      (
        asset.file_type.clone(),
        asset.bundle_name(true),
        asset.bundle_name(false),
      )
    };

    let mut current = match bundle {
      Some(bundle) => bundle,
      None => self.new_bundle(asset_type.clone(), root_name, Some(asset_id), None),
    };

    // A dynamic edge is a split point: the asset roots a new child bundle.
    if dep.map(|(_, record)| record.dynamic).unwrap_or(false) {
      current = self.new_bundle(asset_type.clone(), child_name, Some(asset_id), Some(current));
    }

    let sibling = self.get_sibling_bundle(current, &asset_type);
    self.add_asset(graph, sibling, asset_id);

    // An asset contributing output in the enclosing bundle's type is written
    // there as well (e.g. the script stub of a stylesheet).
    if sibling != current {
      let current_type = self.get(current).bundle_type.clone();
      let contributes = graph
        .get(asset_id)
        .and_then(|asset| asset.generated.as_ref())
        .and_then(|generated| generated.get(&current_type))
        .map(|code| !code.is_empty())
        .unwrap_or(false);
      if contributes {
        self.add_asset(graph, current, asset_id);
      }
    }

    if let Some(asset) = graph.get_mut(asset_id) {
      asset.parent_bundle = Some(current);
    }

    let edges: Vec<(String, AssetId)> = graph
      .get(asset_id)
      .map(|asset| {
        asset
          .dep_assets
          .iter()
          .map(|(specifier, child)| (specifier.clone(), *child))
          .collect()
      })
      .unwrap_or_default();

    for (specifier, child) in edges {
      let record = graph
        .get(asset_id)
        .and_then(|asset| asset.dependencies.get(&specifier))
        .cloned()
        .unwrap_or_else(|| DependencyRecord::new(specifier));
      self.create_bundle_tree(graph, child, Some((asset_id, &record)), Some(current));
    }
  }

  fn new_bundle(
    &mut self,
    bundle_type: FileType,
    name: String,
    entry_asset: Option<AssetId>,
    parent: Option<BundleId>,
  ) -> BundleId {
    let id = self.bundles.len() as BundleId;
    self.bundles.push(Bundle {
      id,
      bundle_type,
      name,
      entry_asset,
      assets: IndexSet::new(),
      parent,
      children: Vec::new(),
      siblings: BTreeMap::new(),
    });
    if let Some(parent) = parent {
      self.bundles[parent as usize].children.push(id);
    }
    id
  }

  /// The bundle next to `bundle` that emits `file_type`: the bundle itself
  /// when types match, otherwise a sibling created on demand as a child of
  /// `bundle` with the extension swapped in its name.
  fn get_sibling_bundle(&mut self, bundle: BundleId, file_type: &FileType) -> BundleId {
    if &self.get(bundle).bundle_type == file_type {
      return bundle;
    }
    if let Some(sibling) = self.get(bundle).siblings.get(file_type) {
      return *sibling;
    }

    let name = swap_extension(&self.get(bundle).name, file_type);
    let entry = self.get(bundle).entry_asset;
    let sibling = self.new_bundle(file_type.clone(), name, entry, Some(bundle));
    self.bundles[bundle as usize]
      .siblings
      .insert(file_type.clone(), sibling);
    sibling
  }

  fn add_asset(&mut self, graph: &mut AssetGraph, bundle: BundleId, asset_id: AssetId) {
    self.bundles[bundle as usize].assets.insert(asset_id);
    if let Some(asset) = graph.get_mut(asset_id) {
      asset.bundles.insert(bundle);
    }
  }

  fn remove_asset(&mut self, graph: &mut AssetGraph, bundle: BundleId, asset_id: AssetId) {
    self.bundles[bundle as usize].assets.shift_remove(&asset_id);
    if let Some(asset) = graph.get_mut(asset_id) {
      asset.bundles.remove(&bundle);
    }
  }

  /// Re-home an asset (and transitively the part of its subtree still
  /// parented to its old bundle) into `target`'s sibling of matching type.
  fn move_asset_to_bundle(&mut self, graph: &mut AssetGraph, asset_id: AssetId, target: BundleId) {
    let old_parent = graph.get(asset_id).and_then(|asset| asset.parent_bundle);

    let mut memberships: Vec<BundleId> = graph
      .get(asset_id)
      .map(|asset| asset.bundles.iter().copied().collect())
      .unwrap_or_default();
    memberships.sort_unstable();

    for bundle in memberships {
      let bundle_type = self.get(bundle).bundle_type.clone();
      self.remove_asset(graph, bundle, asset_id);
      let sibling = self.get_sibling_bundle(target, &bundle_type);
      self.add_asset(graph, sibling, asset_id);
    }

    if let Some(asset) = graph.get_mut(asset_id) {
      asset.parent_bundle = Some(target);
    }

    let children: Vec<AssetId> = graph
      .get(asset_id)
      .map(|asset| asset.dep_assets.values().copied().collect())
      .unwrap_or_default();
    for child in children {
      if graph.get(child).and_then(|asset| asset.parent_bundle) == old_parent {
        self.move_asset_to_bundle(graph, child, target);
      }
    }
  }

  /// The deepest bundle that is an ancestor of both. Always succeeds: the
  /// tree has a single root.
  pub fn find_common_ancestor(&self, a: BundleId, b: BundleId) -> BundleId {
    let mut ancestors = HashSet::new();
    let mut cursor = Some(a);
    while let Some(id) = cursor {
      ancestors.insert(id);
      cursor = self.get(id).parent;
    }

    let mut cursor = Some(b);
    while let Some(id) = cursor {
      if ancestors.contains(&id) {
        return id;
      }
      cursor = self.get(id).parent;
    }

    self.root
  }
}

fn swap_extension(name: &str, file_type: &FileType) -> String {
  match name.rsplit_once('.') {
    Some((stem, _)) => format!("{stem}.{}", file_type.extension()),
    None => format!("{name}.{}", file_type.extension()),
  }
}
