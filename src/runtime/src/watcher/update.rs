//! Update detection for one container.

use crate::engine::Engine;
use crate::registry::RegistryProvider;
use a3s_watch_core::error::Result;
use a3s_watch_core::{TrackedContainer, UpdateResult};

/// Find the newest version of a container's image on its registry.
///
/// Without a provider the running tag is returned unchanged. When the
/// digest is watched the local digest reference is refreshed on
/// `container.image.digest.value` so the verdict can compare both sides.
pub async fn find_new_version(
    container: &mut TrackedContainer,
    provider: Option<&RegistryProvider>,
    engine: &dyn Engine,
) -> Result<UpdateResult> {
    let mut result = UpdateResult {
        tag: container.image.tag.value.clone(),
        ..Default::default()
    };

    let Some(provider) = provider else {
        tracing::warn!(
            container = %container.name,
            image = %container.image.name,
            registry = %container.image.registry.url,
            "Unsupported registry; no update detection"
        );
        return Ok(result);
    };

    let tags = provider.get_tags(&container.image).await?;
    tracing::debug!(container = %container.name, count = tags.len(), "Fetched tags");

    let candidates = container.tag_filter().candidates(
        &container.image.tag.value,
        container.image.tag.semver,
        &tags,
    );

    if container.image.digest.watch {
        if let Some(repo_digest) = container.image.digest.repo.clone() {
            // Check the best candidate when there is one (local `mongo:8`,
            // remote `mongo:8.0.1`), the running tag otherwise
            let target = match candidates.first() {
                Some(candidate) => container.image.with_tag(candidate),
                None => container.image.clone(),
            };

            let remote = provider.get_image_manifest_digest(&target, None).await?;
            result.digest = Some(remote.digest.clone());
            result.created = remote.created.clone();

            container.image.digest.value = if remote.version == 2 {
                let local = provider
                    .get_image_manifest_digest(&target, Some(&repo_digest))
                    .await?;
                Some(local.digest)
            } else {
                // Legacy manifests compare against the local config image
                engine.inspect_image(&container.image.id).await?.config_image()
            };
        }
    }

    if let Some(best) = candidates.into_iter().next() {
        result.tag = best;
    }
    Ok(result)
}
