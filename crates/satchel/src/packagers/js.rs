use std::fmt::Write;

use async_trait::async_trait;

use satchel_core::types::FileType;

use super::PackageContext;
use super::Packager;

/// The script runtime every root bundle starts with: a module table, a
/// scoped `require` with `require.resolve` backed by each module's mapping,
/// and registration hooks for dynamically loaded child bundles.
const PRELUDE: &str = r#"var satchelRequire = (function (modules, entry) {
  var cache = {};
  var pending = null;
  function instantiate(id) {
    if (cache[id]) {
      return cache[id].exports;
    }
    var definition = modules[id];
    if (!definition) {
      throw new Error('Cannot find module ' + id);
    }
    var module = (cache[id] = { exports: {} });
    definition[0](makeRequire(definition[1]), module, module.exports);
    return module.exports;
  }
  function makeRequire(mapping) {
    function require(name) {
      return instantiate(mapping[name]);
    }
    require.resolve = function (name) {
      return mapping[name];
    };
    return require;
  }
  instantiate.register = function (extra, extraEntry) {
    for (var id in extra) {
      modules[id] = extra[id];
    }
    pending = extraEntry;
  };
  instantiate.take = function () {
    return instantiate(pending);
  };
  instantiate(entry);
  return instantiate;
})"#;

/// Emits one script bundle: each member asset wrapped as a module-table
/// entry whose dependency map routes sync specifiers to member asset ids
/// and dynamic specifiers to child bundle filenames.
#[derive(Debug, Default)]
pub struct JsPackager;

#[async_trait]
impl Packager for JsPackager {
  async fn package(&self, ctx: PackageContext<'_>) -> anyhow::Result<String> {
    let mut modules = String::from("{\n");

    for asset_id in &ctx.bundle.assets {
      let Some(asset) = ctx.graph.get(*asset_id) else {
        continue;
      };
      let Some(code) = asset
        .generated
        .as_ref()
        .and_then(|generated| generated.get(&FileType::Js))
      else {
        continue;
      };

      let mut mapping = String::from("{");
      let mut first = true;
      for (specifier, record) in &asset.dependencies {
        if record.included_in_parent {
          continue;
        }
        let Some(child) = asset.dep_assets.get(specifier) else {
          continue;
        };
        if !first {
          mapping.push_str(", ");
        }
        first = false;

        let key = serde_json::to_string(specifier)?;
        if record.dynamic {
          // Dynamic edges resolve to the child bundle's filename; the
          // bundle-loader stub fetches it at runtime.
          let child_name = ctx
            .graph
            .get(*child)
            .map(|child| child.bundle_name(false))
            .unwrap_or_default();
          let _ = write!(mapping, "{key}: {}", serde_json::to_string(&child_name)?);
        } else {
          let _ = write!(mapping, "{key}: {child}");
        }
      }
      mapping.push('}');

      let _ = write!(
        modules,
        "{}: [function (require, module, exports) {{\n{}\n}}, {mapping}],\n",
        asset.id,
        code.as_str()?
      );
    }
    modules.push('}');

    let entry = ctx
      .bundle
      .entry_asset
      .map(|id| id.to_string())
      .unwrap_or_else(|| "null".to_string());

    let contents = if ctx.bundle.parent.is_none() {
      format!("{PRELUDE}({modules}, {entry});\n")
    } else {
      format!("satchelRequire.register({modules}, {entry});\n")
    };

    super::write_if_changed(&ctx, contents.as_bytes())
  }
}
