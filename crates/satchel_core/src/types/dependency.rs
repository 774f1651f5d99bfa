use serde::Deserialize;
use serde::Serialize;

/// A line/column pair within a source file, 1-indexed.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SourceLocation {
  pub line: u32,
  pub column: u32,
}

/// One outgoing edge collected from an asset's source.
///
/// Records are keyed by `name` (the raw specifier) in the owning asset's
/// insertion-ordered dependency map, so emitted module tables are
/// deterministic.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRecord {
  /// The import specifier exactly as written in the source
  pub name: String,

  /// Marks a bundle split point: the resolved asset becomes the entry of a
  /// new child bundle
  #[serde(default)]
  pub dynamic: bool,

  /// The dependency's content is already inlined in the parent's generated
  /// output. It is never written as its own entry, but a change to it still
  /// invalidates the parent.
  #[serde(default)]
  pub included_in_parent: bool,

  /// Where the specifier was found, when the variant can tell
  #[serde(default)]
  pub loc: Option<SourceLocation>,

  /// The edge came from a URL-shaped reference (`url()`, `src`, `href`).
  /// URL edges are always dynamic; this flag keeps their origin visible.
  #[serde(default)]
  pub url_is_asset_boundary: bool,
}

impl DependencyRecord {
  pub fn new(name: impl Into<String>) -> Self {
    DependencyRecord {
      name: name.into(),
      ..DependencyRecord::default()
    }
  }

  pub fn dynamic(name: impl Into<String>) -> Self {
    DependencyRecord {
      name: name.into(),
      dynamic: true,
      ..DependencyRecord::default()
    }
  }

  pub fn url(name: impl Into<String>) -> Self {
    DependencyRecord {
      name: name.into(),
      dynamic: true,
      url_is_asset_boundary: true,
      ..DependencyRecord::default()
    }
  }

  pub fn at(mut self, line: u32, column: u32) -> Self {
    self.loc = Some(SourceLocation { line, column });
    self
  }
}
