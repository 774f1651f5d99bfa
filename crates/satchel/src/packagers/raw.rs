use anyhow::Context;
use async_trait::async_trait;

use super::PackageContext;
use super::Packager;

/// Fallback for binary bundles: write the entry asset's bytes for the
/// bundle's own type, untouched.
#[derive(Debug, Default)]
pub struct RawPackager;

#[async_trait]
impl Packager for RawPackager {
  async fn package(&self, ctx: PackageContext<'_>) -> anyhow::Result<String> {
    let entry = ctx
      .bundle
      .entry_asset
      .and_then(|id| ctx.graph.get(id))
      .with_context(|| format!("bundle '{}' has no entry asset", ctx.bundle.name))?;

    let bytes = entry
      .generated
      .as_ref()
      .and_then(|generated| generated.get(&ctx.bundle.bundle_type))
      .map(|code| code.bytes().to_vec())
      .unwrap_or_default();

    super::write_if_changed(&ctx, &bytes)
  }
}
