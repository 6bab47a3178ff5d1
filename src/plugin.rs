//! Plugin records and identifier classification.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier of the host service entry.
pub const HOST_SERVICE_ID: &str = "@vue/cli-service";

const OFFICIAL_SCOPE: &str = "@vue/";
const PLUGIN_PREFIX: &str = "vue-cli-plugin-";
const OFFICIAL_PLUGIN_PREFIX: &str = "@vue/cli-plugin-";

/// A plugin declared in the project manifest.
///
/// Recomputed on every discovery pass, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    /// Unique package identifier
    pub id: String,
    /// Declared semver range from the manifest
    pub version_range: String,
    /// Matches the official naming convention or is the host service
    pub official: bool,
    /// The plugin's module root resolves on disk
    pub installed: bool,
    /// Website URL derived from the identifier
    pub website: Option<String>,
}

/// Version information derived for a plugin, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Version of the installed package (None when not installed)
    pub current: Option<String>,
    /// Registry's latest distribution tag, falling back to `current`
    pub latest: Option<String>,
    /// Highest registry version satisfying the range, falling back to `current`
    pub wanted: Option<String>,
    /// The declared range
    pub range: String,
}

/// Step of an in-flight install/uninstall/invoke flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallationStep {
    Install,
    Config,
    Diff,
    Uninstall,
}

/// Transient installation state, cleared on completion or explicit finish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallationState {
    /// Plugin currently mid-install/uninstall/invoke
    pub current_plugin_id: Option<String>,
    /// Current step of the flow
    pub step: Option<InstallationStep>,
}

/// A project opened in the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

/// Whether an identifier names a plugin package.
///
/// Matches `vue-cli-plugin-*`, `@vue/cli-plugin-*`, and scoped third-party
/// ids of the form `@scope/vue-cli-plugin-*`.
pub fn is_plugin(id: &str) -> bool {
    if id.starts_with(PLUGIN_PREFIX) || id.starts_with(OFFICIAL_PLUGIN_PREFIX) {
        return true;
    }
    if let Some(rest) = id.strip_prefix('@') {
        if let Some((_, name)) = rest.split_once('/') {
            return name.starts_with(PLUGIN_PREFIX);
        }
    }
    false
}

/// Whether an identifier names an official plugin or the host service.
pub fn is_official(id: &str) -> bool {
    id == HOST_SERVICE_ID || (is_plugin(id) && id.starts_with(OFFICIAL_SCOPE))
}

/// Short name of a plugin, with scope and prefix stripped.
pub fn plugin_short_name(id: &str) -> &str {
    let name = id
        .strip_prefix('@')
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, name)| name)
        .unwrap_or(id);
    name.strip_prefix(PLUGIN_PREFIX)
        .or_else(|| name.strip_prefix("cli-plugin-"))
        .unwrap_or(name)
}

/// Website URL for a plugin identifier, if one can be derived.
pub fn plugin_website(id: &str) -> Option<String> {
    if id == HOST_SERVICE_ID {
        return Some("https://cli.vuejs.org/".to_string());
    }
    if !is_plugin(id) {
        return None;
    }
    if is_official(id) {
        Some(format!(
            "https://github.com/vuejs/vue-cli/tree/dev/packages/%40vue/cli-plugin-{}#readme",
            plugin_short_name(id)
        ))
    } else {
        Some(format!(
            "https://www.npmjs.com/package/{}",
            id.replace('/', "%2F")
        ))
    }
}
