use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

/// The package that owns an asset: its directory plus the manifest fields
/// the resolver and transforms care about. Supplied by the resolver, passed
/// opaquely through the pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Package {
  pub name: Option<String>,
  pub dir: PathBuf,
  pub manifest_path: Option<PathBuf>,
  pub main: Option<String>,
  pub module: Option<String>,
  pub alias: BTreeMap<String, String>,
}

impl Package {
  /// A bare package rooted at `dir`, for assets with no manifest in scope.
  pub fn at(dir: impl Into<PathBuf>) -> Self {
    Package {
      dir: dir.into(),
      ..Package::default()
    }
  }

  pub fn from_manifest(manifest_path: &Path, manifest: &serde_json::Value) -> Self {
    let field = |key: &str| {
      manifest
        .get(key)
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
    };

    let alias = manifest
      .get("alias")
      .and_then(|value| value.as_object())
      .map(|object| {
        object
          .iter()
          .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_string())))
          .collect()
      })
      .unwrap_or_default();

    Package {
      name: field("name"),
      dir: manifest_path.parent().unwrap_or(Path::new("/")).to_path_buf(),
      manifest_path: Some(manifest_path.to_path_buf()),
      main: field("main"),
      module: field("module"),
      alias,
    }
  }

  /// The manifest entry point, preferring `module` over `main`.
  pub fn entry_point(&self) -> Option<&str> {
    self.module.as_deref().or(self.main.as_deref())
  }
}
