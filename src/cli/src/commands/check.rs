//! `a3s-watch check` command: check an image against its registry.

use std::sync::Arc;

use a3s_watch_core::image::UNKNOWN_REGISTRY;
use a3s_watch_core::tag::{parse_semver, TagFilter};
use a3s_watch_core::{ImageRef, RegistryRef, TagRef, WatchConfig};
use a3s_watch_runtime::reference::DEFAULT_TAG;
use a3s_watch_runtime::{ImageName, ProviderRegistry, RegistryProvider};
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct CheckArgs {
    /// Image reference (e.g., ghcr.io/org/app:1.2.3)
    pub image: String,

    /// Platform architecture used to pick a manifest
    #[arg(long, default_value = "amd64")]
    pub arch: String,

    /// Platform operating system used to pick a manifest
    #[arg(long, default_value = "linux")]
    pub os: String,

    /// Platform variant (e.g., v8)
    #[arg(long)]
    pub variant: Option<String>,
}

pub async fn execute(args: CheckArgs, config: &WatchConfig) -> anyhow::Result<()> {
    let providers = ProviderRegistry::new();
    for entry in &config.registries {
        match RegistryProvider::register(&entry.provider, &entry.name, &entry.config).await {
            Ok(provider) => providers.insert(Arc::new(provider)),
            Err(e) => tracing::warn!(provider = %entry.provider, name = %entry.name, error = %e, "Skipping registry"),
        }
    }

    let image = local_image(&args)?;
    let (image, provider) = providers.normalize(&image);
    let Some(provider) = provider else {
        anyhow::bail!("No configured registry provider matches {}", args.image);
    };

    let tags = provider.get_tags(&image).await?;
    let candidates = TagFilter::default().candidates(&image.tag.value, image.tag.semver, &tags);
    let digest = match provider.get_image_manifest_digest(&image, None).await {
        Ok(digest) => format!("{} (v{})", output::short_digest(&digest.digest), digest.version),
        Err(e) => {
            tracing::warn!(image = %args.image, error = %e, "Digest lookup failed");
            "-".to_string()
        }
    };

    let newest = candidates.first().cloned().unwrap_or_else(|| "-".to_string());
    let mut table = output::new_table(&["FIELD", "VALUE"]);
    table.add_row(["Provider", provider.id()]);
    table.add_row(["Registry", image.registry.url.as_str()]);
    table.add_row(["Repository", image.name.as_str()]);
    table.add_row(["Tag", image.tag.value.as_str()]);
    table.add_row(["Semver", if image.tag.semver { "yes" } else { "no" }]);
    table.add_row(["Tags", tags.len().to_string().as_str()]);
    table.add_row(["Candidates", output::join_limited(&candidates, 5).as_str()]);
    table.add_row(["Newest", newest.as_str()]);
    table.add_row(["Digest", digest.as_str()]);
    println!("{table}");
    Ok(())
}

/// Image reference as a watcher would build it for a running container.
fn local_image(args: &CheckArgs) -> anyhow::Result<ImageRef> {
    let parsed = ImageName::parse(&args.image)?;
    let tag = parsed.tag.unwrap_or_else(|| DEFAULT_TAG.to_string());
    Ok(ImageRef {
        registry: RegistryRef {
            name: UNKNOWN_REGISTRY.to_string(),
            url: parsed.domain.unwrap_or_default(),
        },
        name: parsed.path,
        tag: TagRef {
            semver: parse_semver(&tag).is_some(),
            value: tag,
        },
        architecture: args.arch.clone(),
        os: args.os.clone(),
        variant: args.variant.iter().cloned().collect(),
        ..Default::default()
    })
}
