use async_trait::async_trait;

use satchel_core::types::FileType;

use super::PackageContext;
use super::Packager;

/// Concatenates the stylesheet artifacts of a bundle's members in traversal
/// order.
#[derive(Debug, Default)]
pub struct CssPackager;

#[async_trait]
impl Packager for CssPackager {
  async fn package(&self, ctx: PackageContext<'_>) -> anyhow::Result<String> {
    let mut contents = String::new();

    for asset_id in &ctx.bundle.assets {
      let Some(asset) = ctx.graph.get(*asset_id) else {
        continue;
      };
      if let Some(css) = asset
        .generated
        .as_ref()
        .and_then(|generated| generated.get(&FileType::Css))
      {
        contents.push_str(css.as_str()?);
        if !contents.ends_with('\n') {
          contents.push('\n');
        }
      }
    }

    super::write_if_changed(&ctx, contents.as_bytes())
  }
}
