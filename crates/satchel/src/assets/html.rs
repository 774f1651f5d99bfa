use std::path::Path;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use satchel_core::types::Code;
use satchel_core::types::FileType;
use satchel_core::types::Generated;
use satchel_core::BundlerError;

use super::AssetVariant;
use super::CollectContext;
use super::GenerateContext;

static SCRIPT_SRC_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"<script[^>]*\ssrc\s*=\s*["']([^"']+)["']"#).unwrap());

static LINK_HREF_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"<link[^>]*\shref\s*=\s*["']([^"']+)["']"#).unwrap());

static IMG_SRC_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"<img[^>]*\ssrc\s*=\s*["']([^"']+)["']"#).unwrap());

/// The markup adapter: `<script src>`, `<link href>` and `<img src>` all go
/// through the URL-dependency helper, so every referenced file becomes its
/// own bundle and the emitted markup points at the output filenames under
/// the public URL.
pub struct HtmlAsset {
  path: PathBuf,
  source: String,
  output: String,
}

impl HtmlAsset {
  pub fn new(path: &Path) -> Self {
    HtmlAsset {
      path: path.to_path_buf(),
      source: String::new(),
      output: String::new(),
    }
  }
}

impl AssetVariant for HtmlAsset {
  fn parse(&mut self, contents: &Code) -> Result<(), BundlerError> {
    self.source = contents
      .as_str()
      .map_err(|error| BundlerError::ParseFailed {
        path: self.path.clone(),
        loc: None,
        message: error.to_string(),
      })?
      .to_string();
    self.output = self.source.clone();
    Ok(())
  }

  fn collect_dependencies(&mut self, collect: &mut CollectContext) -> Result<(), BundlerError> {
    let mut references: Vec<(std::ops::Range<usize>, String)> = Vec::new();
    for re in [&*SCRIPT_SRC_RE, &*LINK_HREF_RE, &*IMG_SRC_RE] {
      for caps in re.captures_iter(&self.source) {
        let url_match = caps.get(1).unwrap();
        references.push((url_match.range(), url_match.as_str().to_string()));
      }
    }
    // Dependencies register in source order regardless of tag type.
    references.sort_by_key(|(range, _)| range.start);

    let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();
    for (range, url) in references {
      let name = collect.add_url_dependency(&url, &self.path);
      if name != url {
        edits.push((range, collect.options().public_path(&name)));
      }
    }

    self.output = super::splice(&self.source, edits);
    Ok(())
  }

  fn generate(&self, _ctx: &GenerateContext) -> Result<Generated, BundlerError> {
    let mut generated = Generated::new();
    generated.insert(FileType::Html, Code::from(self.output.clone()));
    Ok(generated)
  }
}
