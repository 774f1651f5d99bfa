use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use satchel_core::plugin::Resolution;
use satchel_core::plugin::Resolver;
use satchel_core::types::Package;
use satchel_core::BundlerError;
use satchel_filesystem::normalize_path;
use satchel_filesystem::FileSystemRef;

use crate::assets::builtins;

/// Node-style resolution: relative and absolute paths with extension
/// inference, directory entry points through `package.json`
/// `module`/`main`, package `alias` redirects, and a `node_modules` walk
/// upward from the importer.
pub struct NodeResolver {
  fs: FileSystemRef,
  /// Extensions tried when the specifier has none, in order.
  extensions: Vec<String>,
  packages: RwLock<HashMap<PathBuf, Option<Arc<Package>>>>,
}

impl NodeResolver {
  pub fn new(fs: FileSystemRef, extensions: Vec<String>) -> Self {
    NodeResolver {
      fs,
      extensions,
      packages: RwLock::new(HashMap::new()),
    }
  }

  /// The manifest in exactly `dir`, if there is one (cached).
  fn package_in(&self, dir: &Path) -> Option<Arc<Package>> {
    if let Some(cached) = self.packages.read().get(dir) {
      return cached.clone();
    }

    let manifest_path = dir.join("package.json");
    let loaded = self
      .fs
      .read_to_string(&manifest_path)
      .ok()
      .and_then(|raw| match serde_json::from_str(&raw) {
        Ok(manifest) => Some(Arc::new(Package::from_manifest(&manifest_path, &manifest))),
        Err(error) => {
          tracing::debug!(path = %manifest_path.display(), %error, "Ignoring unreadable manifest");
          None
        }
      });

    self
      .packages
      .write()
      .insert(dir.to_path_buf(), loaded.clone());
    loaded
  }

  /// The nearest manifest at or above `dir`.
  fn package_for(&self, dir: &Path) -> Option<Arc<Package>> {
    let mut current = Some(dir);
    while let Some(dir) = current {
      if let Some(package) = self.package_in(dir) {
        return Some(package);
      }
      current = dir.parent();
    }
    None
  }

  /// Resolve `candidate` as a file: exact path, then registered extensions,
  /// then as a directory through its manifest entry point or `index`.
  fn resolve_file(&self, candidate: &Path) -> Option<PathBuf> {
    if self.fs.is_file(candidate) {
      return Some(candidate.to_path_buf());
    }

    for ext in &self.extensions {
      let with_ext = PathBuf::from(format!("{}.{ext}", candidate.display()));
      if self.fs.is_file(&with_ext) {
        return Some(with_ext);
      }
    }

    if self.fs.is_dir(candidate) {
      if let Some(package) = self.package_in(candidate) {
        if let Some(entry) = package.entry_point() {
          let entry_path = normalize_path(&candidate.join(entry));
          if self.fs.is_file(&entry_path) {
            return Some(entry_path);
          }
          for ext in &self.extensions {
            let with_ext = PathBuf::from(format!("{}.{ext}", entry_path.display()));
            if self.fs.is_file(&with_ext) {
              return Some(with_ext);
            }
          }
        }
      }
      for ext in &self.extensions {
        let index = candidate.join(format!("index.{ext}"));
        if self.fs.is_file(&index) {
          return Some(index);
        }
      }
    }

    None
  }

  fn finish(&self, path: PathBuf) -> Resolution {
    let path = self.fs.canonicalize(&path).unwrap_or(path);
    let dir = path.parent().unwrap_or(Path::new("/"));
    let package = self
      .package_for(dir)
      .unwrap_or_else(|| Arc::new(Package::at(dir)));
    Resolution { path, package }
  }
}

#[async_trait]
impl Resolver for NodeResolver {
  async fn resolve<'a>(
    &'a self,
    specifier: &'a str,
    importer: Option<&'a Path>,
  ) -> Result<Resolution, BundlerError> {
    if let Some(path) = builtins::builtin_path(specifier) {
      return Ok(Resolution {
        path,
        package: Arc::new(Package::at("/__satchel__")),
      });
    }

    let base_dir = importer
      .and_then(Path::parent)
      .map(Path::to_path_buf)
      .unwrap_or_else(|| self.fs.cwd().unwrap_or_else(|_| PathBuf::from("/")));

    let not_found = || BundlerError::ResolveFailed {
      specifier: specifier.to_string(),
      importer: importer.map(Path::to_path_buf),
    };

    if specifier.starts_with('.') {
      let candidate = normalize_path(&base_dir.join(specifier));
      return self
        .resolve_file(&candidate)
        .map(|path| self.finish(path))
        .ok_or_else(not_found);
    }

    if specifier.starts_with('/') {
      let candidate = normalize_path(Path::new(specifier));
      return self
        .resolve_file(&candidate)
        .map(|path| self.finish(path))
        .ok_or_else(not_found);
    }

    // Bare specifier: the importing package's aliases first, then the
    // node_modules walk.
    let mut bare = specifier.to_string();
    if let Some(package) = self.package_for(&base_dir) {
      if let Some(target) = package.alias.get(specifier) {
        if target.starts_with('.') {
          let candidate = normalize_path(&package.dir.join(target));
          return self
            .resolve_file(&candidate)
            .map(|path| self.finish(path))
            .ok_or_else(not_found);
        }
        bare = target.clone();
      }
    }

    let mut current = Some(base_dir.as_path());
    while let Some(dir) = current {
      let candidate = dir.join("node_modules").join(&bare);
      if let Some(path) = self.resolve_file(&candidate) {
        return Ok(self.finish(path));
      }
      current = dir.parent();
    }

    Err(not_found())
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use satchel_filesystem::FileSystem;
  use satchel_filesystem::InMemoryFileSystem;

  use super::*;

  fn setup() -> (Arc<InMemoryFileSystem>, NodeResolver) {
    let fs = Arc::new(InMemoryFileSystem::new());
    let resolver = NodeResolver::new(
      fs.clone(),
      vec!["js".to_string(), "json".to_string(), "css".to_string()],
    );
    (fs, resolver)
  }

  #[tokio::test]
  async fn resolves_relative_paths_with_extension_inference() {
    let (fs, resolver) = setup();
    fs.write(Path::new("/app/index.js"), b"").unwrap();
    fs.write(Path::new("/app/foo.js"), b"").unwrap();

    let exact = resolver
      .resolve("./foo.js", Some(Path::new("/app/index.js")))
      .await
      .unwrap();
    assert_eq!(exact.path, PathBuf::from("/app/foo.js"));

    let inferred = resolver
      .resolve("./foo", Some(Path::new("/app/index.js")))
      .await
      .unwrap();
    assert_eq!(inferred.path, PathBuf::from("/app/foo.js"));
  }

  #[tokio::test]
  async fn resolves_directories_through_manifest_and_index() {
    let (fs, resolver) = setup();
    fs.write(Path::new("/app/index.js"), b"").unwrap();
    fs.write(Path::new("/app/lib/package.json"), br#"{"main": "entry.js"}"#)
      .unwrap();
    fs.write(Path::new("/app/lib/entry.js"), b"").unwrap();
    fs.write(Path::new("/app/util/index.js"), b"").unwrap();

    let manifest = resolver
      .resolve("./lib", Some(Path::new("/app/index.js")))
      .await
      .unwrap();
    assert_eq!(manifest.path, PathBuf::from("/app/lib/entry.js"));
    assert_eq!(
      manifest.package.manifest_path,
      Some(PathBuf::from("/app/lib/package.json"))
    );

    let index = resolver
      .resolve("./util", Some(Path::new("/app/index.js")))
      .await
      .unwrap();
    assert_eq!(index.path, PathBuf::from("/app/util/index.js"));
  }

  #[tokio::test]
  async fn walks_node_modules_upward() {
    let (fs, resolver) = setup();
    fs.write(Path::new("/app/src/deep/mod.js"), b"").unwrap();
    fs.write(
      Path::new("/app/node_modules/widget/package.json"),
      br#"{"name": "widget", "main": "lib/main.js"}"#,
    )
    .unwrap();
    fs.write(Path::new("/app/node_modules/widget/lib/main.js"), b"").unwrap();

    let resolution = resolver
      .resolve("widget", Some(Path::new("/app/src/deep/mod.js")))
      .await
      .unwrap();
    assert_eq!(
      resolution.path,
      PathBuf::from("/app/node_modules/widget/lib/main.js")
    );
    assert_eq!(resolution.package.name.as_deref(), Some("widget"));
  }

  #[tokio::test]
  async fn package_aliases_redirect_bare_specifiers() {
    let (fs, resolver) = setup();
    fs.write(
      Path::new("/app/package.json"),
      br#"{"name": "app", "alias": {"widget": "./shim/widget.js"}}"#,
    )
    .unwrap();
    fs.write(Path::new("/app/shim/widget.js"), b"").unwrap();
    fs.write(Path::new("/app/src/index.js"), b"").unwrap();

    let resolution = resolver
      .resolve("widget", Some(Path::new("/app/src/index.js")))
      .await
      .unwrap();
    assert_eq!(resolution.path, PathBuf::from("/app/shim/widget.js"));
  }

  #[tokio::test]
  async fn missing_modules_fail_with_the_importer_attached() {
    let (fs, resolver) = setup();
    fs.write(Path::new("/app/index.js"), b"").unwrap();

    let error = resolver
      .resolve("./missing.js", Some(Path::new("/app/index.js")))
      .await
      .unwrap_err();

    match error {
      BundlerError::ResolveFailed {
        specifier,
        importer,
      } => {
        assert_eq!(specifier, "./missing.js");
        assert_eq!(importer, Some(PathBuf::from("/app/index.js")));
      }
      other => panic!("expected ResolveFailed, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn builtin_loader_resolves_to_its_virtual_path() {
    let (_fs, resolver) = setup();
    let resolution = resolver.resolve("_bundle_loader", None).await.unwrap();
    assert!(builtins::is_builtin(&resolution.path));
  }
}
