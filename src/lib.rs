//! Plugin host for a local development-tool UI.
//!
//! Discovers the plugins declared in a project manifest, installs and
//! updates them through a package manager, loads each plugin's contributed
//! UI module against a shared registration surface, and dispatches lifecycle
//! hooks and user-invoked actions across the loaded set.
//!
//! # Example
//!
//! ```rust,ignore
//! use ui_plugin_host::{HostConfig, UiPluginHost};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HostConfig::new("/path/to/project");
//!     let mut host = UiPluginHost::new(config);
//!
//!     // Discover declared plugins; this also resets the plugin API surface.
//!     let plugins = host.list().await?;
//!
//!     // Install another one.
//!     host.install("vue-cli-plugin-apollo").await?;
//!
//!     // Dispatch an action to every registered callback.
//!     let result = host
//!         .call_action("refresh-dashboard", serde_json::json!({}))
//!         .await;
//!     println!("{} callback(s) ran", result.results.len());
//!
//!     let _ = plugins;
//!     Ok(())
//! }
//! ```

mod api;
mod cache;
mod config;
mod error;
mod host;
mod loader;
mod plugin;
mod registry;
mod services;
mod ui_registry;
mod version;

pub use api::*;
pub use cache::*;
pub use config::*;
pub use error::*;
pub use host::*;
pub use loader::*;
pub use plugin::*;
pub use registry::*;
pub use services::*;
pub use ui_registry::*;
pub use version::*;
