use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use satchel_cache::Cache;
use satchel_core::diagnostic::CodeFrame;
use satchel_core::diagnostic::CodeHighlight;
use satchel_core::plugin::Delegate;
use satchel_core::plugin::NullDelegate;
use satchel_core::plugin::Resolver;
use satchel_core::types::AssetId;
use satchel_core::types::AssetKind;
use satchel_core::types::BundlerOptions;
use satchel_core::types::DependencyRecord;
use satchel_core::types::FileType;
use satchel_core::types::ProcessedResult;
use satchel_core::types::ResolvedOptions;
use satchel_core::BundlerError;
use satchel_filesystem::FileSystemRef;

use crate::asset_graph::AssetGraph;
use crate::assets::builtins;
use crate::bundle_tree::BundleTree;
use crate::events::AssetUpdate;
use crate::events::BuildEvent;
use crate::events::EventBus;
use crate::events::Notification;
use crate::packagers::PackageContext;
use crate::packagers::Packager;
use crate::packagers::PackagerRegistry;
use crate::registry::ParserRegistry;
use crate::resolver::NodeResolver;
use crate::watcher::Watcher;
use crate::worker_farm::WorkerFarm;

enum Pending {
  Cached(ProcessedResult),
  Job(tokio::sync::oneshot::Receiver<Result<ProcessedResult, BundlerError>>),
}

/// The coordinator. Owns the dependency graph, the bundle tree and every
/// pluggable seam; all graph mutation happens here, on one task, while the
/// worker farm carries the heavy per-asset work.
pub struct Bundler {
  entry: PathBuf,
  fs: FileSystemRef,
  raw_options: BundlerOptions,
  options: Option<Arc<ResolvedOptions>>,

  registry: ParserRegistry,
  packagers: PackagerRegistry,
  resolver: Option<Arc<dyn Resolver>>,
  delegate: Arc<dyn Delegate>,
  farm: Option<Arc<WorkerFarm>>,
  farm_is_shared: bool,
  cache: Option<Cache>,

  graph: AssetGraph,
  tree: Option<BundleTree>,
  bundle_hashes: HashMap<String, String>,
  main_asset: Option<AssetId>,
  changed_assets: HashSet<AssetId>,

  events: EventBus,
  watcher: Option<Watcher>,
  watch_rx: Option<tokio::sync::mpsc::UnboundedReceiver<PathBuf>>,

  started: bool,
  errored: bool,
}

impl Bundler {
  pub fn new(entry: impl Into<PathBuf>, fs: FileSystemRef, options: BundlerOptions) -> Self {
    Bundler {
      entry: entry.into(),
      fs,
      raw_options: options,
      options: None,
      registry: ParserRegistry::default(),
      packagers: PackagerRegistry::default(),
      resolver: None,
      delegate: Arc::new(NullDelegate),
      farm: None,
      farm_is_shared: false,
      cache: None,
      graph: AssetGraph::new(),
      tree: None,
      bundle_hashes: HashMap::new(),
      main_asset: None,
      changed_assets: HashSet::new(),
      events: EventBus::default(),
      watcher: None,
      watch_rx: None,
      started: false,
      errored: false,
    }
  }

  pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
    self.resolver = Some(resolver);
    self
  }

  pub fn with_delegate(mut self, delegate: Arc<dyn Delegate>) -> Self {
    self.delegate = delegate;
    self
  }

  pub fn with_farm(mut self, farm: Arc<WorkerFarm>) -> Self {
    self.farm = Some(farm);
    self
  }

  /// Fails with `ConfigLocked` once `bundle()` has started.
  pub fn register_extension(&mut self, ext: &str, kind: AssetKind) -> Result<(), BundlerError> {
    self.registry.register_extension(ext, kind)
  }

  /// Fails with `ConfigLocked` once `bundle()` has started.
  pub fn register_packager(
    &mut self,
    file_type: FileType,
    packager: Arc<dyn Packager>,
  ) -> Result<(), BundlerError> {
    self.packagers.register_packager(file_type, packager)
  }

  pub fn subscribe(&mut self) -> tokio::sync::mpsc::UnboundedReceiver<BuildEvent> {
    self.events.subscribe()
  }

  pub fn graph(&self) -> &AssetGraph {
    &self.graph
  }

  pub fn tree(&self) -> Option<&BundleTree> {
    self.tree.as_ref()
  }

  pub fn main_asset(&self) -> Option<AssetId> {
    self.main_asset
  }

  pub fn errored(&self) -> bool {
    self.errored
  }

  /// Worker jobs dispatched so far; cache hits never reach the farm.
  pub fn worker_jobs(&self) -> usize {
    self.farm.as_ref().map(|farm| farm.jobs_run()).unwrap_or(0)
  }

  fn opts(&self) -> Arc<ResolvedOptions> {
    self
      .options
      .clone()
      .expect("options are resolved before the first build")
  }

  /// Freeze configuration and materialize the lazy pieces. Runs once, on
  /// the first `bundle()` call.
  fn ensure_started(&mut self) -> anyhow::Result<()> {
    if self.started {
      return Ok(());
    }

    self.registry.lock();
    self.packagers.lock();

    let options = Arc::new(
      self
        .raw_options
        .clone()
        .resolve(self.registry.extensions().clone()),
    );

    if self.resolver.is_none() {
      let mut extensions = vec!["js".to_string()];
      extensions.extend(
        self
          .registry
          .extensions()
          .keys()
          .filter(|ext| ext.as_str() != "js")
          .cloned(),
      );
      self.resolver = Some(Arc::new(NodeResolver::new(self.fs.clone(), extensions)));
    }

    if self.farm.is_none() {
      self.farm = Some(WorkerFarm::shared(self.fs.clone(), options.threads));
      self.farm_is_shared = true;
    }

    if options.cache {
      self.cache = Some(Cache::new(
        self.fs.clone(),
        options.cache_dir.clone(),
        options.fingerprint(),
      ));
    }

    if options.watch && self.watcher.is_none() {
      match Watcher::new() {
        Ok((watcher, receiver)) => {
          self.watcher = Some(watcher);
          self.watch_rx = Some(receiver);
        }
        Err(error) => {
          tracing::warn!(%error, "Failed to start the file watcher; rebuilds are disabled");
        }
      }
    }

    self
      .fs
      .create_dir_all(&options.out_dir)
      .map_err(|error| BundlerError::io(options.out_dir.clone(), "create directory", error))?;

    self.options = Some(options);
    self.started = true;
    Ok(())
  }

  /// Run one full build: load the graph, allocate bundles, package them.
  ///
  /// In watch mode errors are recorded and swallowed so the loop survives;
  /// in one-shot mode they propagate to the caller.
  pub async fn bundle(&mut self) -> anyhow::Result<()> {
    self.ensure_started()?;
    let options = self.opts();
    let initial = self.main_asset.is_none();
    let started_at = Instant::now();

    self.events.emit(BuildEvent::BuildStart);

    match self.build(initial).await {
      Ok(()) => {
        self.errored = false;
        let bundles = self.tree.as_ref().map(BundleTree::len).unwrap_or(0);
        tracing::info!(
          bundles,
          assets = self.graph.len(),
          elapsed_ms = started_at.elapsed().as_millis() as u64,
          "Built"
        );
        self.events.emit(BuildEvent::Bundled { bundles });

        if !options.watch && options.kill_workers && self.farm_is_shared {
          WorkerFarm::shutdown_shared();
        }
        Ok(())
      }
      Err(error) => {
        self.errored = true;
        let message = match error.downcast_ref::<BundlerError>() {
          Some(bundler_error) => bundler_error.pretty(),
          None => format!("{error:#}"),
        };
        tracing::error!("{message}");
        self.events.emit(BuildEvent::BuildError { message });

        if options.watch {
          Ok(())
        } else {
          Err(error)
        }
      }
    }
  }

  async fn build(&mut self, initial: bool) -> anyhow::Result<()> {
    let options = self.opts();

    let entry_specifier = self.entry_specifier();
    let main = self.resolve_asset(&entry_specifier, None).await?;
    self.main_asset = Some(main);

    self.load_assets().await?;

    // Clients get the changed set before allocation wipes the previous
    // build's bundle assignments (orphans are exactly the assets the
    // recompute touched but hasn't attached anywhere yet).
    if options.hmr && !initial {
      let message = self.update_message();
      self.events.emit(BuildEvent::Update(message));
    }
    self.changed_assets.clear();

    let tree = BundleTree::build(&mut self.graph, main);
    self.package_bundles(&tree).await?;
    self.unload_orphaned_assets();
    self.tree = Some(tree);

    Ok(())
  }

  fn entry_specifier(&self) -> String {
    let raw = self.entry.to_string_lossy();
    if raw.starts_with('/') || raw.starts_with('.') {
      raw.into_owned()
    } else {
      format!("./{raw}")
    }
  }

  /// Map a specifier to a graph node, creating and watching it on first
  /// sight. Concurrent resolution of the same path shares one node.
  async fn resolve_asset(
    &mut self,
    specifier: &str,
    importer: Option<&Path>,
  ) -> Result<AssetId, BundlerError> {
    let resolver = self
      .resolver
      .clone()
      .expect("resolver is set before the first build");
    let resolution = resolver.resolve(specifier, importer).await?;

    if let Some(existing) = self.graph.id_for_path(&resolution.path) {
      return Ok(existing);
    }

    let file_type = self.registry.primary_file_type(&resolution.path);
    let id = self
      .graph
      .insert(resolution.path.clone(), file_type, resolution.package);
    tracing::debug!(id, path = %resolution.path.display(), "New asset");
    self.watch_path(&resolution.path);
    Ok(id)
  }

  /// Like [`Bundler::resolve_asset`], but failures carry a code frame for
  /// the importing source location when the record has one.
  async fn resolve_dep(
    &mut self,
    importer: AssetId,
    record: &DependencyRecord,
  ) -> Result<AssetId, BundlerError> {
    let importer_path = self
      .graph
      .get(importer)
      .map(|asset| asset.path.clone())
      .unwrap_or_default();

    match self.resolve_asset(&record.name, Some(&importer_path)).await {
      Ok(id) => Ok(id),
      Err(_) => {
        let code_frame = record.loc.map(|loc| CodeFrame {
          code: self.fs.read_to_string(&importer_path).ok(),
          file_path: Some(importer_path.clone()),
          code_highlights: vec![CodeHighlight::at(loc)],
        });
        Err(BundlerError::DependencyResolveFailed {
          specifier: record.name.clone(),
          from: importer_path,
          code_frame,
        })
      }
    }
  }

  /// The load pump: dispatch every unprocessed asset to the farm (cache
  /// first), fold the results back into the graph, and repeat until the
  /// frontier is empty. The `processed` flag is set at dispatch, so two
  /// parents converging on one asset cost exactly one job.
  async fn load_assets(&mut self) -> anyhow::Result<()> {
    let options = self.opts();

    loop {
      let frontier = self.graph.unprocessed();
      if frontier.is_empty() {
        break;
      }

      let mut in_flight: Vec<(AssetId, PathBuf, Pending)> = Vec::with_capacity(frontier.len());
      for id in frontier {
        let (path, package) = {
          let asset = self.graph.get_mut(id).expect("frontier assets exist");
          asset.processed = true;
          (asset.path.clone(), asset.package.clone())
        };

        if let Some(result) = self.cache.as_ref().and_then(|cache| cache.read(&path)) {
          tracing::debug!(path = %path.display(), "Cache hit");
          in_flight.push((id, path, Pending::Cached(result)));
          continue;
        }

        let farm = self.farm.clone().expect("farm is set before the first build");
        let receiver = farm.submit(path.clone(), package, options.clone())?;
        in_flight.push((id, path, Pending::Job(receiver)));
      }

      for (id, path, pending) in in_flight {
        let (result, from_worker) = match pending {
          Pending::Cached(result) => (result, false),
          Pending::Job(receiver) => {
            let outcome = receiver.await.unwrap_or_else(|_| {
              Err(BundlerError::WorkerCrashed {
                path: path.clone(),
                message: "worker exited without replying".to_string(),
              })
            });
            (outcome?, true)
          }
        };

        if from_worker {
          if let Some(cache) = &self.cache {
            cache.write(&path, &result);
          }
        }

        self.apply_result(id, result).await?;
      }
    }

    Ok(())
  }

  /// Fold one processed result into the graph and resolve its dependency
  /// list into child nodes.
  async fn apply_result(&mut self, id: AssetId, result: ProcessedResult) -> anyhow::Result<()> {
    let path = {
      let asset = self.graph.get_mut(id).expect("asset exists while loading");
      asset.generated = Some(result.generated);
      asset.hash = Some(result.hash);
      asset.dependencies.clear();
      asset.dep_assets.clear();
      asset.path.clone()
    };

    let mut records = result.dependencies;
    if let Some(implicit) = self.delegate.get_implicit_dependencies(&path) {
      records.extend(implicit);
    }

    for record in records {
      if record.included_in_parent {
        // The content is already inlined in this asset's output; track the
        // file only so a change to it invalidates its owner.
        let resolver = self.resolver.clone().expect("resolver set");
        match resolver.resolve(&record.name, Some(&path)).await {
          Ok(resolution) => {
            self.graph.register_included(resolution.path.clone(), id);
            self.watch_path(&resolution.path);
          }
          Err(error) => {
            tracing::debug!(specifier = %record.name, %error, "Ignoring unresolvable inlined file");
          }
        }
        if let Some(asset) = self.graph.get_mut(id) {
          asset.dependencies.insert(record.name.clone(), record);
        }
        continue;
      }

      let child = self.resolve_dep(id, &record).await?;
      let name = record.name.clone();
      if let Some(asset) = self.graph.get_mut(id) {
        asset.dependencies.insert(name.clone(), record);
        asset.dep_assets.insert(name, child);
      }
    }

    Ok(())
  }

  async fn package_bundles(&mut self, tree: &BundleTree) -> anyhow::Result<()> {
    let options = self.opts();
    let mut hashes = HashMap::new();

    for bundle_id in tree.post_order() {
      let bundle = tree.get(bundle_id);
      if bundle.assets.is_empty() {
        continue;
      }

      let packager = self.packagers.get(&bundle.bundle_type);
      let output_path = options.out_dir.join(&bundle.name);
      let previous_hash = self.bundle_hashes.get(&bundle.name).map(String::as_str);

      let hash = packager
        .package(PackageContext {
          bundle,
          tree,
          graph: &self.graph,
          options: &options,
          fs: &self.fs,
          output_path: &output_path,
          previous_hash,
        })
        .await
        .with_context(|| format!("Failed to package bundle '{}'", bundle.name))?;

      hashes.insert(bundle.name.clone(), hash);
    }

    self.bundle_hashes = hashes;
    Ok(())
  }

  fn unload_orphaned_assets(&mut self) {
    let orphans: Vec<AssetId> = self
      .graph
      .find_orphan_assets()
      .map(|asset| asset.id)
      .collect();

    for id in orphans {
      if let Some(path) = self.graph.remove(id) {
        tracing::debug!(id, path = %path.display(), "Unloading orphaned asset");
        if let Some(watcher) = &mut self.watcher {
          watcher.unwatch(&path);
        }
      }
    }
  }

  fn update_message(&self) -> Notification {
    let mut ids: BTreeSet<AssetId> = self.changed_assets.iter().copied().collect();
    ids.extend(self.graph.find_orphan_assets().map(|asset| asset.id));

    let assets = ids
      .into_iter()
      .filter_map(|id| self.graph.get(id))
      .map(|asset| AssetUpdate {
        id: asset.id,
        generated: asset
          .generated
          .iter()
          .flatten()
          .map(|(file_type, code)| {
            (
              file_type.extension().to_string(),
              String::from_utf8_lossy(code.bytes()).into_owned(),
            )
          })
          .collect(),
        deps: asset
          .dep_assets
          .iter()
          .map(|(specifier, child)| (specifier.clone(), *child))
          .collect(),
      })
      .collect();

    Notification::Update { assets }
  }

  fn watch_path(&mut self, path: &Path) {
    if builtins::is_builtin(path) {
      return;
    }
    if let Some(watcher) = &mut self.watcher {
      watcher.watch(path);
    }
  }

  /// Invalidate whatever `path` backs: the asset itself, or the owners of
  /// an inlined file. Returns whether anything was invalidated.
  pub fn invalidate_path(&mut self, path: &Path) -> bool {
    let mut targets = Vec::new();
    if let Some(id) = self.graph.id_for_path(path) {
      targets.push(id);
    }
    targets.extend(self.graph.owners_of_included(path));
    targets.sort_unstable();
    targets.dedup();

    if targets.is_empty() {
      return false;
    }

    for id in targets {
      if let Some(asset) = self.graph.get_mut(id) {
        let asset_path = asset.path.clone();
        tracing::info!(path = %asset_path.display(), "Invalidating");
        asset.invalidate();
        self.changed_assets.insert(id);
        if let Some(cache) = &self.cache {
          cache.invalidate(&asset_path);
        }
      }
    }
    true
  }

  /// Watch-loop entry point for one change notification.
  pub async fn on_change(&mut self, path: &Path) -> anyhow::Result<()> {
    if !self.invalidate_path(path) {
      return Ok(());
    }
    self.bundle().await
  }

  /// Build once, then (in watch mode) rebuild on file changes until the
  /// watcher goes away. Changes arriving while a build is in flight queue
  /// up and coalesce into the next rebuild.
  pub async fn run(&mut self) -> anyhow::Result<()> {
    self.bundle().await?;

    if !self.opts().watch {
      return Ok(());
    }
    let Some(mut receiver) = self.watch_rx.take() else {
      return Ok(());
    };

    tracing::info!("Watching for changes...");
    while let Some(first) = receiver.recv().await {
      let mut pending = vec![first];
      while let Ok(path) = receiver.try_recv() {
        pending.push(path);
      }

      let mut dirty = false;
      for path in &pending {
        dirty |= self.invalidate_path(path);
      }
      if dirty {
        self.bundle().await?;
      }
    }

    Ok(())
  }

  /// Release the watcher; the next `run()` returns after one build.
  pub fn stop(&mut self) {
    self.watcher = None;
    self.watch_rx = None;
  }
}

#[cfg(test)]
mod tests;
