use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use satchel_core::types::Code;
use satchel_core::types::DependencyRecord;
use satchel_core::types::FileType;
use satchel_core::types::Generated;
use satchel_core::types::ResolvedOptions;
use satchel_core::BundlerError;
use satchel_filesystem::normalize_path;

use super::AssetVariant;
use super::CollectContext;
use super::GenerateContext;

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#"@import\s+(?:url\(\s*)?['"]([^'"]+)['"]\s*\)?\s*;"#).unwrap()
});

static URL_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap());

/// The stylesheet adapter. It compiles dialects only as far as inlining
/// `@import`ed files (recorded as included-in-parent edges so their changes
/// still invalidate this asset) and rewriting `url()` references onto the
/// deterministic output filenames.
pub struct CssAsset {
  path: PathBuf,
  source: String,
  output: String,
}

impl CssAsset {
  pub fn new(path: &Path) -> Self {
    CssAsset {
      path: path.to_path_buf(),
      source: String::new(),
      output: String::new(),
    }
  }
}

impl AssetVariant for CssAsset {
  fn parse(&mut self, contents: &Code) -> Result<(), BundlerError> {
    self.source = contents
      .as_str()
      .map_err(|error| BundlerError::ParseFailed {
        path: self.path.clone(),
        loc: None,
        message: error.to_string(),
      })?
      .to_string();
    Ok(())
  }

  fn collect_dependencies(&mut self, collect: &mut CollectContext) -> Result<(), BundlerError> {
    let mut seen = HashSet::from([self.path.clone()]);
    let source = std::mem::take(&mut self.source);
    self.output = compile(&source, &self.path, collect, &mut seen);
    self.source = source;
    Ok(())
  }

  fn transform(&mut self, options: &ResolvedOptions) -> Result<(), BundlerError> {
    if options.minify {
      self.output = minify_css(&self.output);
    }
    Ok(())
  }

  fn generate(&self, _ctx: &GenerateContext) -> Result<Generated, BundlerError> {
    let mut generated = Generated::new();
    generated.insert(FileType::Css, Code::from(self.output.clone()));
    // The stub is what requiring a stylesheet from a script evaluates to; it
    // also keeps the asset present in its importer's script bundle.
    generated.insert(FileType::Js, Code::from("module.exports = {};"));
    Ok(generated)
  }
}

/// Inline `@import`s (depth-first, cycle-safe) and rewrite `url()`
/// references, registering dependencies along the way.
fn compile(
  source: &str,
  file_path: &Path,
  collect: &mut CollectContext,
  seen: &mut HashSet<PathBuf>,
) -> String {
  let file_dir = file_path.parent().unwrap_or(Path::new("/"));
  let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();
  let mut import_ranges: Vec<std::ops::Range<usize>> = Vec::new();

  for caps in IMPORT_RE.captures_iter(source) {
    let whole = caps.get(0).unwrap();
    import_ranges.push(whole.range());
    let specifier = caps.get(1).unwrap().as_str();
    if super::SCHEME_RE.is_match(specifier) {
      continue;
    }

    collect.add_dependency(DependencyRecord {
      name: specifier.to_string(),
      included_in_parent: true,
      ..DependencyRecord::default()
    });

    let resolved = normalize_path(&file_dir.join(specifier));
    if !seen.insert(resolved.clone()) {
      edits.push((whole.range(), String::new()));
      continue;
    }

    let inlined = match collect.fs().read_to_string(&resolved) {
      Ok(imported) => compile(&imported, &resolved, collect, seen),
      Err(error) => {
        tracing::warn!(
          path = %resolved.display(),
          %error,
          "Leaving unresolvable @import in place"
        );
        continue;
      }
    };
    edits.push((whole.range(), inlined));
  }

  for caps in URL_RE.captures_iter(source) {
    let whole = caps.get(0).unwrap();
    // `@import url(…)` is already handled above.
    if import_ranges
      .iter()
      .any(|range| range.start <= whole.start() && whole.end() <= range.end)
    {
      continue;
    }
    let url = caps.get(1).unwrap().as_str();
    let name = collect.add_url_dependency(url, file_path);
    if name != url {
      edits.push((whole.range(), format!("url(\"{name}\")")));
    }
  }

  super::splice(source, edits)
}

fn minify_css(source: &str) -> String {
  let mut out = String::with_capacity(source.len());
  let mut last_space = true;
  for character in source.chars() {
    if character.is_whitespace() {
      if !last_space {
        out.push(' ');
        last_space = true;
      }
    } else {
      if matches!(character, '{' | '}' | ';' | ':' | ',') && out.ends_with(' ') {
        out.pop();
      }
      out.push(character);
      last_space = matches!(character, '{' | '}' | ';' | ':' | ',');
    }
  }
  out.trim().to_string()
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::sync::Arc;

  use pretty_assertions::assert_eq;
  use satchel_core::types::BundlerOptions;
  use satchel_filesystem::FileSystem;
  use satchel_filesystem::InMemoryFileSystem;

  use super::super::emitted_name;
  use super::*;

  fn context(fs: Arc<InMemoryFileSystem>, path: &Path) -> CollectContext {
    let options = Arc::new(
      BundlerOptions {
        production: Some(false),
        ..BundlerOptions::default()
      }
      .resolve(BTreeMap::new()),
    );
    CollectContext::new(path.to_path_buf(), fs, options)
  }

  fn run(fs: Arc<InMemoryFileSystem>, path: &Path, source: &str) -> (String, Vec<DependencyRecord>) {
    let mut asset = CssAsset::new(path);
    asset.parse(&Code::from(source)).unwrap();
    let mut collect = context(fs, path);
    asset.collect_dependencies(&mut collect).unwrap();
    (asset.output.clone(), collect.into_dependencies())
  }

  #[test]
  fn rewrites_urls_and_passes_schemes_through() {
    let fs = Arc::new(InMemoryFileSystem::new());
    let path = Path::new("/app/index.less");
    let source = ".index { background: url(./test.woff2); cursor: url(http://google.com); }";

    let (output, deps) = run(fs, path, source);

    let name = emitted_name(Path::new("/app/test.woff2"));
    assert!(output.contains(&format!("url(\"{name}\")")));
    assert!(output.contains("url(http://google.com)"));
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].name, "./test.woff2");
    assert!(deps[0].dynamic);
  }

  #[test]
  fn inlines_imports_as_included_in_parent() {
    let fs = Arc::new(InMemoryFileSystem::new());
    fs.write(Path::new("/app/base.css"), b".base { color: red; }").unwrap();
    let path = Path::new("/app/index.css");

    let (output, deps) = run(fs, path, "@import \"./base.css\";\n.index { x: 1; }");

    assert!(output.contains(".base { color: red; }"));
    assert!(output.contains(".index { x: 1; }"));
    assert!(!output.contains("@import"));
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].name, "./base.css");
    assert!(deps[0].included_in_parent);
    assert!(!deps[0].dynamic);
  }

  #[test]
  fn import_cycles_terminate() {
    let fs = Arc::new(InMemoryFileSystem::new());
    fs.write(Path::new("/app/a.css"), b"@import \"./b.css\";\n.a {}").unwrap();
    fs.write(Path::new("/app/b.css"), b"@import \"./a.css\";\n.b {}").unwrap();

    let (output, deps) = run(fs, Path::new("/app/a.css"), "@import \"./b.css\";\n.a {}");

    assert!(output.contains(".a {}"));
    assert!(output.contains(".b {}"));
    assert_eq!(deps.len(), 2);
  }

  #[test]
  fn minifies_whitespace() {
    assert_eq!(
      minify_css(".index {\n  color : red;\n}\n"),
      ".index{color:red;}"
    );
  }
}
