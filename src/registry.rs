//! Registry metadata lookups.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

/// Package metadata returned by a registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default)]
    pub name: String,
    /// Distribution tags, e.g. `latest`
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    /// All published versions, keyed by version string
    #[serde(default)]
    pub versions: BTreeMap<String, serde_json::Value>,
}

impl PackageMetadata {
    /// The version behind the `latest` distribution tag.
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get("latest").map(String::as_str)
    }
}

/// Client for package registry metadata.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch metadata for a package. Non-success responses are errors.
    async fn metadata(&self, id: &str) -> Result<PackageMetadata>;
}

/// Registry client over HTTP.
pub struct HttpRegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRegistryClient {
    /// Create a client for a registry base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn package_url(&self, id: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            id.replace('/', "%2F")
        )
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn metadata(&self, id: &str) -> Result<PackageMetadata> {
        let response = self.http.get(self.package_url(id)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Registry {
                id: id.to_string(),
                message: format!("registry responded with status {}", status),
            });
        }
        Ok(response.json().await?)
    }
}
