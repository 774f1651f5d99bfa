use std::path::Path;
use std::path::PathBuf;

use satchel_core::types::Code;
use satchel_core::types::FileType;
use satchel_core::types::Generated;
use satchel_core::BundlerError;

use super::emitted_name;
use super::AssetVariant;
use super::GenerateContext;

/// The fallback for unknown extensions. The bytes pass through untouched;
/// importing a binary from a script yields the URL it was emitted under.
pub struct RawAsset {
  path: PathBuf,
  file_type: FileType,
}

impl RawAsset {
  pub fn new(path: &Path) -> Self {
    let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    RawAsset {
      path: path.to_path_buf(),
      file_type: FileType::Other(ext.to_string()),
    }
  }
}

impl AssetVariant for RawAsset {
  fn might_have_dependencies(&self, _contents: &Code) -> bool {
    false
  }

  fn generate(&self, ctx: &GenerateContext) -> Result<Generated, BundlerError> {
    let url = ctx.options.public_path(&emitted_name(&self.path));
    let stub = serde_json::to_string(&url).map_err(|error| BundlerError::TransformFailed {
      path: self.path.clone(),
      message: error.to_string(),
    })?;

    let mut generated = Generated::new();
    generated.insert(self.file_type.clone(), ctx.contents.clone());
    generated.insert(FileType::Js, Code::from(format!("module.exports = {stub};")));
    Ok(generated)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use pretty_assertions::assert_eq;
  use satchel_core::types::BundlerOptions;

  use super::*;

  #[test]
  fn passes_bytes_through_and_exports_the_emitted_url() {
    let path = Path::new("/app/test.woff2");
    let asset = RawAsset::new(path);
    let contents = Code::new(vec![0u8, 1, 2, 255]);
    let options = BundlerOptions {
      production: Some(false),
      ..BundlerOptions::default()
    }
    .resolve(BTreeMap::new());

    let generated = asset
      .generate(&GenerateContext {
        path,
        contents: &contents,
        options: &options,
      })
      .unwrap();

    let woff2 = FileType::Other("woff2".into());
    assert_eq!(generated.get(&woff2).unwrap().bytes(), &[0u8, 1, 2, 255]);

    let stub = generated.get(&FileType::Js).unwrap().as_str().unwrap().to_string();
    let name = emitted_name(path);
    assert_eq!(stub, format!("module.exports = \"/dist/{name}\";"));
  }
}
