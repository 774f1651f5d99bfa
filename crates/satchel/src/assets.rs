pub mod builtins;
mod css;
mod html;
mod js;
mod json;
mod raw;

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use satchel_core::types::AssetKind;
use satchel_core::types::Code;
use satchel_core::types::DependencyRecord;
use satchel_core::types::Generated;
use satchel_core::types::Package;
use satchel_core::types::ProcessedResult;
use satchel_core::types::ResolvedOptions;
use satchel_core::types::SourceLocation;
use satchel_core::BundlerError;
use satchel_filesystem::FileSystemRef;

use crate::registry::ParserRegistry;

pub use css::CssAsset;
pub use html::HtmlAsset;
pub use js::JsAsset;
pub use json::JsonAsset;
pub use raw::RawAsset;

/// Everything a worker needs to reconstruct and process one asset.
#[derive(Clone, Debug)]
pub struct ProcessInput {
  pub path: PathBuf,
  pub package: Arc<Package>,
  pub options: Arc<ResolvedOptions>,
}

/// The per-type half of an asset: parsing, dependency collection,
/// transformation and artifact emission. Variants keep their parsed state
/// internally; the [`process_asset`] driver sequences the calls.
pub trait AssetVariant: Send {
  /// Fast pre-check so binary assets skip parsing entirely.
  fn might_have_dependencies(&self, contents: &Code) -> bool {
    let _ = contents;
    true
  }

  fn parse(&mut self, contents: &Code) -> Result<(), BundlerError> {
    let _ = contents;
    Ok(())
  }

  fn collect_dependencies(&mut self, collect: &mut CollectContext) -> Result<(), BundlerError> {
    let _ = collect;
    Ok(())
  }

  fn transform(&mut self, options: &ResolvedOptions) -> Result<(), BundlerError> {
    let _ = options;
    Ok(())
  }

  fn generate(&self, ctx: &GenerateContext) -> Result<Generated, BundlerError>;
}

pub struct GenerateContext<'a> {
  pub path: &'a Path,
  pub contents: &'a Code,
  pub options: &'a ResolvedOptions,
}

static SCHEME_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(?:[a-zA-Z][a-zA-Z0-9+.-]*:|//)").unwrap());

/// Collects the dependency records a variant discovers, in source order.
pub struct CollectContext {
  path: PathBuf,
  fs: FileSystemRef,
  options: Arc<ResolvedOptions>,
  dependencies: IndexMap<String, DependencyRecord>,
}

impl CollectContext {
  pub fn new(path: PathBuf, fs: FileSystemRef, options: Arc<ResolvedOptions>) -> Self {
    CollectContext {
      path,
      fs,
      options,
      dependencies: IndexMap::new(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn fs(&self) -> &FileSystemRef {
    &self.fs
  }

  pub fn options(&self) -> &ResolvedOptions {
    &self.options
  }

  /// Register a dependency. The first record for a specifier wins, so a file
  /// that references the same module twice produces one edge.
  pub fn add_dependency(&mut self, record: DependencyRecord) {
    self
      .dependencies
      .entry(record.name.clone())
      .or_insert(record);
  }

  /// The helper variants call for URL-shaped references.
  ///
  /// Scheme-prefixed and empty URLs pass through unchanged. Anything else is
  /// resolved against `from`'s directory, registered as a dynamic dependency
  /// on the relative specifier, and replaced by the deterministic filename
  /// the referenced asset will be emitted under, so emitted artifacts
  /// cross-reference output files without a second pass.
  pub fn add_url_dependency(&mut self, url: &str, from: &Path) -> String {
    if url.is_empty() || SCHEME_RE.is_match(url) {
      return url.to_string();
    }

    let from_dir = from.parent().unwrap_or(Path::new("/"));
    let absolute = satchel_filesystem::normalize_path(&from_dir.join(url));

    let specifier = match pathdiff::diff_paths(&absolute, from_dir) {
      Some(relative) => {
        let relative = relative.to_string_lossy().into_owned();
        if relative.starts_with('.') {
          relative
        } else {
          format!("./{relative}")
        }
      }
      None => url.to_string(),
    };

    self.add_dependency(DependencyRecord::url(specifier));
    emitted_name(&absolute)
  }

  pub fn into_dependencies(self) -> Vec<DependencyRecord> {
    self.dependencies.into_values().collect()
  }
}

/// The deterministic output filename for a URL-referenced asset: identifier
/// hash of the absolute path plus the file's own extension.
pub fn emitted_name(path: &Path) -> String {
  let hash = satchel_core::hash::hash_path(path);
  match path.extension().and_then(|ext| ext.to_str()) {
    Some(ext) => format!("{hash}.{ext}"),
    None => hash,
  }
}

pub(crate) fn make_variant(kind: AssetKind, path: &Path) -> Box<dyn AssetVariant> {
  match kind {
    AssetKind::Js => Box::new(JsAsset::new(path)),
    AssetKind::Css => Box::new(CssAsset::new(path)),
    AssetKind::Html => Box::new(HtmlAsset::new(path)),
    AssetKind::Json => Box::new(JsonAsset::new(path)),
    AssetKind::Raw => Box::new(RawAsset::new(path)),
  }
}

fn load(fs: &FileSystemRef, path: &Path) -> Result<Code, BundlerError> {
  if let Some(source) = builtins::builtin_source(path) {
    return Ok(Code::from(source));
  }
  fs.read(path)
    .map(Code::new)
    .map_err(|error| BundlerError::io(path, "read", error))
}

/// Run one asset through `load → (parse + collect) → transform → generate →
/// hash`. Pure with respect to the inputs: this is the single operation a
/// worker exposes.
pub fn process_asset(
  fs: &FileSystemRef,
  input: &ProcessInput,
) -> Result<ProcessedResult, BundlerError> {
  let registry = ParserRegistry::from_extensions(input.options.extensions.clone());
  let mut variant = make_variant(registry.kind_for(&input.path), &input.path);

  let contents = load(fs, &input.path)?;
  let mut collect = CollectContext::new(input.path.clone(), fs.clone(), input.options.clone());

  if variant.might_have_dependencies(&contents) {
    variant.parse(&contents)?;
    variant.collect_dependencies(&mut collect)?;
  }

  variant.transform(&input.options)?;

  let generated = variant.generate(&GenerateContext {
    path: &input.path,
    contents: &contents,
    options: &input.options,
  })?;

  Ok(ProcessedResult {
    hash: ProcessedResult::hash_generated(&generated),
    generated,
    dependencies: collect.into_dependencies(),
  })
}

/// 1-indexed line/column of a byte offset, for dependency locations.
pub(crate) fn location_of(source: &str, offset: usize) -> SourceLocation {
  let prefix = &source[..offset.min(source.len())];
  let line = prefix.bytes().filter(|byte| *byte == b'\n').count() as u32 + 1;
  let column = match prefix.rfind('\n') {
    Some(newline) => offset - newline,
    None => offset + 1,
  } as u32;
  SourceLocation { line, column }
}

/// Apply `(range, replacement)` edits to `source`. Ranges must not overlap;
/// they are applied in offset order.
pub(crate) fn splice(source: &str, mut edits: Vec<(std::ops::Range<usize>, String)>) -> String {
  edits.sort_by_key(|(range, _)| range.start);
  let mut out = String::with_capacity(source.len());
  let mut cursor = 0;
  for (range, replacement) in edits {
    out.push_str(&source[cursor..range.start]);
    out.push_str(&replacement);
    cursor = range.end;
  }
  out.push_str(&source[cursor..]);
  out
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use pretty_assertions::assert_eq;
  use satchel_core::types::BundlerOptions;
  use satchel_filesystem::InMemoryFileSystem;

  use super::*;

  fn context() -> CollectContext {
    let fs: FileSystemRef = Arc::new(InMemoryFileSystem::new());
    let options = Arc::new(BundlerOptions {
      production: Some(false),
      ..BundlerOptions::default()
    }
    .resolve(BTreeMap::new()));
    CollectContext::new(PathBuf::from("/app/src/index.less"), fs, options)
  }

  #[test]
  fn url_dependency_passes_schemes_through() {
    let mut collect = context();
    let from = PathBuf::from("/app/src/index.less");

    assert_eq!(
      collect.add_url_dependency("http://google.com", &from),
      "http://google.com"
    );
    assert_eq!(collect.add_url_dependency("data:image/png;base64,xx", &from), "data:image/png;base64,xx");
    assert_eq!(collect.add_url_dependency("", &from), "");
    assert!(collect.into_dependencies().is_empty());
  }

  #[test]
  fn url_dependency_registers_a_dynamic_edge_and_returns_the_emitted_name() {
    let mut collect = context();
    let from = PathBuf::from("/app/src/index.less");

    let name = collect.add_url_dependency("./test.woff2", &from);
    assert_eq!(name, emitted_name(Path::new("/app/src/test.woff2")));
    assert!(name.ends_with(".woff2"));

    let deps = collect.into_dependencies();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].name, "./test.woff2");
    assert!(deps[0].dynamic);
    assert!(deps[0].url_is_asset_boundary);
  }

  #[test]
  fn url_dependency_resolves_parent_segments() {
    let mut collect = context();
    let from = PathBuf::from("/app/src/index.less");

    let name = collect.add_url_dependency("../fonts/a.woff2", &from);
    assert_eq!(name, emitted_name(Path::new("/app/fonts/a.woff2")));

    let deps = collect.into_dependencies();
    assert_eq!(deps[0].name, "../fonts/a.woff2");
  }

  #[test]
  fn locations_are_one_indexed() {
    let source = "a\nbb\nccc";
    assert_eq!(location_of(source, 0), SourceLocation { line: 1, column: 1 });
    assert_eq!(location_of(source, 2), SourceLocation { line: 2, column: 1 });
    assert_eq!(location_of(source, 7), SourceLocation { line: 3, column: 3 });
  }

  #[test]
  fn splice_applies_edits_in_order() {
    let out = splice("url(a) and url(b)", vec![(15..16, "B".into()), (4..5, "A".into())]);
    assert_eq!(out, "url(A) and url(B)");
  }
}
