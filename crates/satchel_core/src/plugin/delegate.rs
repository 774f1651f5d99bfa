use std::path::Path;

use mockall::automock;

use crate::types::DependencyRecord;

/// Optional user hook for dependencies the source itself cannot declare,
/// e.g. a config file that affects how an asset is transformed.
#[automock]
pub trait Delegate: Send + Sync {
  /// Extra dependency records for the asset at `path`, appended after the
  /// records the worker collected. `None` means nothing to add.
  fn get_implicit_dependencies(&self, path: &Path) -> Option<Vec<DependencyRecord>>;
}

/// The default delegate: no implicit dependencies.
#[derive(Debug, Default)]
pub struct NullDelegate;

impl Delegate for NullDelegate {
  fn get_implicit_dependencies(&self, _path: &Path) -> Option<Vec<DependencyRecord>> {
    None
  }
}
