use std::path::Path;
use std::path::PathBuf;

/// The module a dynamic import desugars to. The parent bundle carries this
/// stub; at runtime it fetches the child bundle and resolves to its entry
/// module's exports.
pub const BUNDLE_LOADER_SPECIFIER: &str = "_bundle_loader";

const BUILTIN_ROOT: &str = "/__satchel__";

/// The loader avoids the tokens the script scanner looks for, so processing
/// it never produces further dependencies.
const BUNDLE_LOADER_SOURCE: &str = r#"var loadedBundles = {};
module.exports = function loadBundle(name) {
  if (loadedBundles[name]) {
    return loadedBundles[name];
  }
  var promise = new Promise(function (resolve, reject) {
    var script = document.createElement('script');
    script.async = true;
    script.charset = 'utf-8';
    script.src = name;
    script.onerror = function (error) {
      script.onerror = script.onload = null;
      reject(error);
    };
    script.onload = function () {
      script.onerror = script.onload = null;
      resolve(satchelRequire.take());
    };
    document.getElementsByTagName('head')[0].appendChild(script);
  });
  loadedBundles[name] = promise;
  return promise;
};
"#;

/// Resolve a built-in specifier to its virtual path, if it is one.
pub fn builtin_path(specifier: &str) -> Option<PathBuf> {
  match specifier {
    BUNDLE_LOADER_SPECIFIER => Some(PathBuf::from(BUILTIN_ROOT).join("bundle_loader.js")),
    _ => None,
  }
}

/// The embedded source for a virtual built-in path.
pub fn builtin_source(path: &Path) -> Option<&'static str> {
  if path == builtin_path(BUNDLE_LOADER_SPECIFIER)?.as_path() {
    Some(BUNDLE_LOADER_SOURCE)
  } else {
    None
  }
}

/// Built-in paths are virtual; they are never registered with the watcher.
pub fn is_builtin(path: &Path) -> bool {
  path.starts_with(BUILTIN_ROOT)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn loader_resolves_and_loads() {
    let path = builtin_path(BUNDLE_LOADER_SPECIFIER).unwrap();
    assert!(is_builtin(&path));
    assert!(builtin_source(&path).unwrap().contains("loadBundle"));
    assert_eq!(builtin_path("./app.js"), None);
  }

  #[test]
  fn loader_source_has_no_scannable_dependencies() {
    let source = BUNDLE_LOADER_SOURCE;
    assert!(!source.contains("require("));
    assert!(!source.contains("import"));
  }
}
