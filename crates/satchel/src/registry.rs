use std::collections::BTreeMap;
use std::path::Path;

use satchel_core::types::AssetKind;
use satchel_core::types::FileType;
use satchel_core::BundlerError;

/// Maps file extensions onto the asset variant that processes them.
///
/// The coordinator owns one registry; its extension table is copied into the
/// resolved options so every worker reconstitutes an identical registry per
/// job. Unknown extensions fall back to the raw binary variant.
#[derive(Clone, Debug)]
pub struct ParserRegistry {
  extensions: BTreeMap<String, AssetKind>,
  locked: bool,
}

impl Default for ParserRegistry {
  fn default() -> Self {
    let mut extensions = BTreeMap::new();
    for ext in ["js", "mjs", "cjs"] {
      extensions.insert(ext.to_string(), AssetKind::Js);
    }
    for ext in ["css", "less"] {
      extensions.insert(ext.to_string(), AssetKind::Css);
    }
    for ext in ["html", "htm"] {
      extensions.insert(ext.to_string(), AssetKind::Html);
    }
    extensions.insert("json".to_string(), AssetKind::Json);

    ParserRegistry {
      extensions,
      locked: false,
    }
  }
}

impl ParserRegistry {
  /// Rebuild a registry from the extension table carried in the options.
  pub fn from_extensions(extensions: BTreeMap<String, AssetKind>) -> Self {
    ParserRegistry {
      extensions,
      locked: true,
    }
  }

  /// Add or replace an extension mapping. Fails once bundling has started.
  pub fn register_extension(
    &mut self,
    extension: &str,
    kind: AssetKind,
  ) -> Result<(), BundlerError> {
    if self.locked {
      return Err(BundlerError::ConfigLocked);
    }
    self
      .extensions
      .insert(extension.trim_start_matches('.').to_string(), kind);
    Ok(())
  }

  pub fn lock(&mut self) {
    self.locked = true;
  }

  pub fn extensions(&self) -> &BTreeMap<String, AssetKind> {
    &self.extensions
  }

  pub fn kind_for(&self, path: &Path) -> AssetKind {
    path
      .extension()
      .and_then(|ext| ext.to_str())
      .and_then(|ext| self.extensions.get(ext))
      .copied()
      .unwrap_or(AssetKind::Raw)
  }

  /// The primary output type an asset of this path will have, before the
  /// worker runs. Some variants override the extension tag: JSON emits as
  /// `js`, stylesheet dialects emit as `css`.
  pub fn primary_file_type(&self, path: &Path) -> FileType {
    let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match self.kind_for(path) {
      AssetKind::Js => FileType::Js,
      AssetKind::Json => FileType::Js,
      AssetKind::Css => FileType::Css,
      AssetKind::Html => FileType::Html,
      AssetKind::Raw => FileType::Other(ext.to_string()),
    }
  }
}
