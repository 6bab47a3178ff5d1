//! Version resolution against registry metadata.

use std::sync::Arc;

use semver::{Version, VersionReq};

use crate::cache::{BoundedCache, METADATA_CACHE_CAPACITY, METADATA_CACHE_TTL};
use crate::loader::ModuleLoader;
use crate::plugin::{Plugin, VersionInfo};
use crate::registry::{PackageMetadata, RegistryClient};
use crate::services::ManifestStore;

/// Resolves current/latest/wanted versions for plugins.
///
/// Registry metadata is cached; only successful lookups are cached, so a
/// failed lookup retries on the next call. Missing metadata degrades to the
/// installed version, never to an error.
pub struct VersionResolver {
    registry: Arc<dyn RegistryClient>,
    manifests: Arc<dyn ManifestStore>,
    loader: Arc<dyn ModuleLoader>,
    cache: BoundedCache<PackageMetadata>,
}

impl VersionResolver {
    /// Create a resolver over a registry client.
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        manifests: Arc<dyn ManifestStore>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        Self {
            registry,
            manifests,
            loader,
            cache: BoundedCache::with_ttl(METADATA_CACHE_CAPACITY, METADATA_CACHE_TTL),
        }
    }

    /// Cached registry metadata for a package, or `None` when unavailable.
    pub async fn metadata(&self, id: &str) -> Option<PackageMetadata> {
        if let Some(metadata) = self.cache.get(id) {
            return Some(metadata);
        }
        match self.registry.metadata(id).await {
            Ok(metadata) => {
                self.cache.put(id, metadata.clone());
                Some(metadata)
            }
            Err(e) => {
                tracing::debug!(package = id, error = %e, "registry metadata unavailable");
                None
            }
        }
    }

    /// Version information for a plugin. Never fails; absence of data
    /// degrades to `None` / the installed version.
    pub async fn version_info(&self, plugin: &Plugin) -> VersionInfo {
        let current = if plugin.installed {
            self.loader
                .resolve_root(&plugin.id)
                .and_then(|root| self.manifests.read(&root).ok())
                .and_then(|manifest| manifest.version)
        } else {
            None
        };

        let mut latest = None;
        let mut wanted = None;
        if let Some(metadata) = self.metadata(&plugin.id).await {
            latest = metadata.latest().map(str::to_string);
            wanted = max_satisfying(&metadata, &plugin.version_range);
        }

        VersionInfo {
            latest: latest.or_else(|| current.clone()),
            wanted: wanted.or_else(|| current.clone()),
            current,
            range: plugin.version_range.clone(),
        }
    }
}

/// Highest published version satisfying a range, if any.
fn max_satisfying(metadata: &PackageMetadata, range: &str) -> Option<String> {
    let req = VersionReq::parse(range).ok()?;
    metadata
        .versions
        .keys()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| req.matches(v))
        .max()
        .map(|v| v.to_string())
}
