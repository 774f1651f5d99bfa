use std::path::Path;
use std::path::PathBuf;

use satchel_core::types::Code;
use satchel_core::types::FileType;
use satchel_core::types::Generated;
use satchel_core::types::SourceLocation;
use satchel_core::BundlerError;

use super::AssetVariant;
use super::GenerateContext;

/// JSON becomes a script module: `module.exports = JSON.parse("…")`, so
/// requiring a JSON file from a script embeds it in the same bundle.
pub struct JsonAsset {
  path: PathBuf,
  value: Option<serde_json::Value>,
}

impl JsonAsset {
  pub fn new(path: &Path) -> Self {
    JsonAsset {
      path: path.to_path_buf(),
      value: None,
    }
  }
}

impl AssetVariant for JsonAsset {
  fn parse(&mut self, contents: &Code) -> Result<(), BundlerError> {
    let source = contents
      .as_str()
      .map_err(|error| BundlerError::ParseFailed {
        path: self.path.clone(),
        loc: None,
        message: error.to_string(),
      })?;

    self.value = Some(serde_json::from_str(source).map_err(|error| {
      BundlerError::ParseFailed {
        path: self.path.clone(),
        loc: Some(SourceLocation {
          line: error.line() as u32,
          column: error.column() as u32,
        }),
        message: error.to_string(),
      }
    })?);
    Ok(())
  }

  fn generate(&self, ctx: &GenerateContext) -> Result<Generated, BundlerError> {
    let value: serde_json::Value = match &self.value {
      Some(value) => value.clone(),
      // parse has not run for this asset.
      None => {
        let mut fallback = JsonAsset::new(self.path.as_path());
        fallback.parse(ctx.contents)?;
        fallback.value.unwrap()
      }
    };

    let minified = serde_json::to_string(&value).map_err(|error| BundlerError::TransformFailed {
      path: self.path.clone(),
      message: error.to_string(),
    })?;
    let quoted = serde_json::to_string(&minified).map_err(|error| BundlerError::TransformFailed {
      path: self.path.clone(),
      message: error.to_string(),
    })?;

    let mut generated = Generated::new();
    generated.insert(
      FileType::Js,
      Code::from(format!("module.exports = JSON.parse({quoted});")),
    );
    Ok(generated)
  }
}
