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

use super::builtins::BUNDLE_LOADER_SPECIFIER;
use super::location_of;
use super::AssetVariant;
use super::CollectContext;
use super::GenerateContext;

static REQUIRE_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

static DYNAMIC_IMPORT_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"\bimport\s*\(\s*(['"][^'"]+['"])\s*\)"#).unwrap());

static IMPORT_FROM_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#"(?m)^\s*(?:import|export)\b[^;'"()]*?\bfrom\s*['"]([^'"]+)['"]"#).unwrap()
});

static IMPORT_BARE_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"(?m)^\s*import\s*['"]([^'"]+)['"]"#).unwrap());

static IMPORT_STATEMENT_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#"(?m)^([ \t]*)import\s+(.+?)\s+from\s*(['"][^'"]+['"])[ \t]*;?[ \t]*$"#).unwrap()
});

static IMPORT_SIDE_EFFECT_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"(?m)^([ \t]*)import\s*(['"][^'"]+['"])[ \t]*;?[ \t]*$"#).unwrap());

static EXPORT_DEFAULT_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?m)^(\s*)export\s+default\s+").unwrap());

static LINE_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*//.*$").unwrap());

/// The script adapter: a regex-backed scanner standing in for a real
/// JavaScript compiler. It understands `require()`, static `import`/`export
/// … from` and dynamic `import()`, and lowers the ES module syntax it knows
/// about to CommonJS so the packager only deals with one module shape.
pub struct JsAsset {
  path: PathBuf,
  source: String,
}

impl JsAsset {
  pub fn new(path: &Path) -> Self {
    JsAsset {
      path: path.to_path_buf(),
      source: String::new(),
    }
  }
}

impl AssetVariant for JsAsset {
  fn might_have_dependencies(&self, contents: &Code) -> bool {
    match std::str::from_utf8(contents.bytes()) {
      Ok(source) => {
        source.contains("require") || source.contains("import") || source.contains("export")
      }
      Err(_) => false,
    }
  }

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
    let mut found: Vec<(usize, String, bool)> = Vec::new();

    for caps in REQUIRE_RE.captures_iter(&self.source) {
      let spec = caps.get(1).unwrap();
      found.push((spec.start(), spec.as_str().to_string(), false));
    }
    for caps in IMPORT_FROM_RE.captures_iter(&self.source) {
      let spec = caps.get(1).unwrap();
      found.push((spec.start(), spec.as_str().to_string(), false));
    }
    for caps in IMPORT_BARE_RE.captures_iter(&self.source) {
      let spec = caps.get(1).unwrap();
      found.push((spec.start(), spec.as_str().to_string(), false));
    }
    for caps in DYNAMIC_IMPORT_RE.captures_iter(&self.source) {
      let spec = caps.get(1).unwrap();
      found.push((
        spec.start(),
        spec.as_str().trim_matches(&['\'', '"'][..]).to_string(),
        true,
      ));
    }

    found.sort_by_key(|(offset, _, _)| *offset);

    for (offset, specifier, dynamic) in found {
      if dynamic {
        // The rewritten import() call requires the loader at runtime.
        collect.add_dependency(DependencyRecord::new(BUNDLE_LOADER_SPECIFIER));
      }
      let loc = location_of(&self.source, offset);
      let record = if dynamic {
        DependencyRecord::dynamic(specifier)
      } else {
        DependencyRecord::new(specifier)
      };
      collect.add_dependency(record.at(loc.line, loc.column));
    }

    Ok(())
  }

  fn transform(&mut self, options: &ResolvedOptions) -> Result<(), BundlerError> {
    let source = rewrite_esm(&self.source);
    let source = rewrite_dynamic_imports(&source);
    self.source = if options.minify {
      minify_js(&source)
    } else {
      source
    };
    Ok(())
  }

  fn generate(&self, ctx: &GenerateContext) -> Result<Generated, BundlerError> {
    // parse is skipped entirely when the pre-check finds no module syntax;
    // the artifact is then the file as-is.
    let code = if self.source.is_empty() {
      String::from_utf8_lossy(ctx.contents.bytes()).into_owned()
    } else {
      self.source.clone()
    };

    let mut generated = Generated::new();
    generated.insert(FileType::Js, Code::from(code));
    Ok(generated)
  }
}

/// Lower the supported ES module forms to CommonJS.
fn rewrite_esm(source: &str) -> String {
  let source = IMPORT_STATEMENT_RE.replace_all(source, |caps: &regex::Captures| {
    let indent = &caps[1];
    let clause = &caps[2];
    let module = &caps[3];
    format!("{indent}{}", import_clause_to_vars(clause, module))
  });

  let source = IMPORT_SIDE_EFFECT_RE
    .replace_all(&source, |caps: &regex::Captures| {
      format!("{}require({});", &caps[1], &caps[2])
    });

  EXPORT_DEFAULT_RE
    .replace_all(&source, "${1}module.exports = ")
    .into_owned()
}

fn import_clause_to_vars(clause: &str, module: &str) -> String {
  let mut statements = Vec::new();

  for part in split_top_level(clause) {
    let part = part.trim();
    if part.is_empty() {
      continue;
    }
    if let Some(namespace) = part.strip_prefix("* as ") {
      statements.push(format!("var {} = require({module});", namespace.trim()));
    } else if part.starts_with('{') {
      let names = part
        .trim_start_matches('{')
        .trim_end_matches('}')
        .replace(" as ", ": ");
      statements.push(format!("var {{{}}} = require({module});", names.trim()));
    } else {
      statements.push(format!("var {part} = require({module});"));
    }
  }

  statements.join(" ")
}

/// Split an import clause on commas that are not inside braces, so
/// `default, { a, b }` becomes two parts.
fn split_top_level(clause: &str) -> Vec<&str> {
  let mut parts = Vec::new();
  let mut depth = 0;
  let mut start = 0;

  for (index, character) in clause.char_indices() {
    match character {
      '{' => depth += 1,
      '}' => depth -= 1,
      ',' if depth == 0 => {
        parts.push(&clause[start..index]);
        start = index + 1;
      }
      _ => {}
    }
  }
  parts.push(&clause[start..]);
  parts
}

fn rewrite_dynamic_imports(source: &str) -> String {
  DYNAMIC_IMPORT_RE
    .replace_all(source, |caps: &regex::Captures| {
      format!(
        "require(\"{BUNDLE_LOADER_SPECIFIER}\")(require.resolve({}))",
        &caps[1]
      )
    })
    .into_owned()
}

fn minify_js(source: &str) -> String {
  let source = LINE_COMMENT_RE.replace_all(source, "");
  source
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}
