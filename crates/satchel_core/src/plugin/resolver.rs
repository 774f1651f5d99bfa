use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;

use crate::types::Package;
use crate::BundlerError;

/// A successfully resolved specifier: the absolute path to load, plus the
/// package that owns it.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
  pub path: PathBuf,
  pub package: Arc<Package>,
}

/// Maps `(specifier, importer)` onto a file on disk.
///
/// The engine ships a node-style implementation; anything honoring this
/// contract can replace it. Resolution failures must be
/// [`BundlerError::ResolveFailed`] so the graph can annotate them with the
/// importing location.
#[automock]
#[async_trait]
pub trait Resolver: Send + Sync {
  async fn resolve<'a>(
    &'a self,
    specifier: &'a str,
    importer: Option<&'a Path>,
  ) -> Result<Resolution, BundlerError>;
}
