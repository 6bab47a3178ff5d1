//! Plugin host configuration.

use std::path::PathBuf;

/// Default registry used for package metadata lookups.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// File tag of the host's own built-in UI module.
pub const BUILTIN_UI_FILE: &str = "ui-defaults";

/// Default file tag of a plugin's contributed UI module.
pub const PLUGIN_UI_FILE: &str = "ui";

/// Default file tag of the project-local UI module.
pub const PROJECT_UI_FILE: &str = "vue-cli-ui";

/// Configuration for the plugin host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// The open project's root directory (where its manifest lives)
    pub project_dir: PathBuf,

    /// Root under which installed plugin packages resolve
    pub modules_dir: PathBuf,

    /// Registry URL for package metadata
    pub registry_url: String,

    /// File tag of the project-local UI module
    pub project_ui_file: String,

    /// Debug mode: official-plugin install/uninstall/update only edit the
    /// manifest instead of driving the package manager
    pub debug: bool,
}

impl HostConfig {
    /// Create a configuration rooted at a project directory.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let modules_dir = project_dir.join("node_modules");
        Self {
            project_dir,
            modules_dir,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            project_ui_file: PROJECT_UI_FILE.to_string(),
            debug: false,
        }
    }

    /// Set the module resolution root.
    pub fn with_modules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.modules_dir = dir.into();
        self
    }

    /// Set the registry URL.
    pub fn with_registry(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Set the project-local UI module file tag.
    pub fn with_project_ui_file(mut self, tag: impl Into<String>) -> Self {
        self.project_ui_file = tag.into();
        self
    }

    /// Enable debug mode.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        let project_dir = std::env::current_dir()
            .unwrap_or_else(|_| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
        Self::new(project_dir)
    }
}
