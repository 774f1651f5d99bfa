use std::collections::BTreeMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_repr::Deserialize_repr;
use serde_repr::Serialize_repr;

use crate::hash::IdentifierHasher;

/// Which built-in variant handles a file extension.
///
/// The table of registered extensions travels inside [`ResolvedOptions`] so
/// workers reconstitute the parser registry from it on every job.
#[derive(
  Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
  Js,
  Css,
  Html,
  Json,
  Raw,
}

#[derive(Clone, Copy, Debug, Default, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum LogLevel {
  Silent = 0,
  Error = 1,
  #[default]
  Info = 2,
  Verbose = 3,
}

/// The options passed into satchel through the CLI or the programmatic API.
///
/// Every field is optional; [`BundlerOptions::resolve`] fills in the
/// documented defaults, several of which depend on `production`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundlerOptions {
  pub out_dir: Option<PathBuf>,
  pub public_url: Option<String>,
  pub watch: Option<bool>,
  pub cache: Option<bool>,
  pub cache_dir: Option<PathBuf>,
  pub kill_workers: Option<bool>,
  pub minify: Option<bool>,
  pub hmr: Option<bool>,
  pub log_level: Option<LogLevel>,
  pub production: Option<bool>,
  pub threads: Option<usize>,
}

impl BundlerOptions {
  pub fn resolve(self, extensions: BTreeMap<String, AssetKind>) -> ResolvedOptions {
    let production = self
      .production
      .unwrap_or_else(|| std::env::var("NODE_ENV").as_deref() == Ok("production"));
    let out_dir = self.out_dir.unwrap_or_else(|| PathBuf::from("dist"));
    let public_url = self.public_url.unwrap_or_else(|| {
      let base = out_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
      format!("/{base}")
    });
    let watch = self.watch.unwrap_or(!production);

    ResolvedOptions {
      out_dir,
      public_url,
      watch,
      cache: self.cache.unwrap_or(true),
      cache_dir: self.cache_dir.unwrap_or_else(|| PathBuf::from(".cache")),
      kill_workers: self.kill_workers.unwrap_or(true),
      minify: self.minify.unwrap_or(production),
      hmr: self.hmr.unwrap_or(watch),
      log_level: self.log_level.unwrap_or_default(),
      production,
      threads: self.threads.unwrap_or(0),
      extensions,
    }
  }
}

/// Fully defaulted options, shared between the coordinator and the workers.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedOptions {
  pub out_dir: PathBuf,
  pub public_url: String,
  pub watch: bool,
  pub cache: bool,
  pub cache_dir: PathBuf,
  pub kill_workers: bool,
  pub minify: bool,
  pub hmr: bool,
  pub log_level: LogLevel,
  pub production: bool,
  /// Worker pool size; 0 means one worker per logical CPU.
  pub threads: usize,
  pub extensions: BTreeMap<String, AssetKind>,
}

impl ResolvedOptions {
  /// Hash over the option subset that affects transformation output. Cache
  /// entries written under a different fingerprint are treated as misses.
  pub fn fingerprint(&self) -> String {
    let mut hasher = IdentifierHasher::default();
    self.minify.hash(&mut hasher);
    self.production.hash(&mut hasher);
    self.public_url.hash(&mut hasher);
    self.extensions.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
  }

  /// Join an emitted filename onto the public URL prefix.
  pub fn public_path(&self, name: &str) -> String {
    format!("{}/{}", self.public_url.trim_end_matches('/'), name)
  }
}
