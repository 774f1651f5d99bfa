use async_trait::async_trait;

use satchel_core::types::FileType;

use super::PackageContext;
use super::Packager;

/// Writes the markup artifacts of a bundle; references inside were already
/// rewritten to output filenames during transformation.
#[derive(Debug, Default)]
pub struct HtmlPackager;

#[async_trait]
impl Packager for HtmlPackager {
  async fn package(&self, ctx: PackageContext<'_>) -> anyhow::Result<String> {
    let mut contents = String::new();

    for asset_id in &ctx.bundle.assets {
      let Some(asset) = ctx.graph.get(*asset_id) else {
        continue;
      };
      if let Some(html) = asset
        .generated
        .as_ref()
        .and_then(|generated| generated.get(&FileType::Html))
      {
        contents.push_str(html.as_str()?);
      }
    }

    super::write_if_changed(&ctx, contents.as_bytes())
  }
}
