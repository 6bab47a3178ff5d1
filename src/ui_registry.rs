//! Shared UI registries populated from the plugin API surface.
//!
//! Views and client addons declared on the surface are propagated here on
//! every reset, and deregistered again when the surface is torn down. UI
//! consumers read these registries at runtime.

use std::sync::RwLock;

use crate::api::{ClientAddon, ViewDescriptor};

/// Thread-safe registry of contributed views.
pub struct ViewRegistry {
    views: RwLock<Vec<ViewDescriptor>>,
}

impl ViewRegistry {
    /// Create a new empty view registry.
    pub fn new() -> Self {
        Self {
            views: RwLock::new(Vec::new()),
        }
    }

    /// Register a view, replacing any earlier registration with the same id.
    pub fn register(&self, view: ViewDescriptor) {
        if let Ok(mut views) = self.views.write() {
            tracing::info!("Registered view: {}", view.id);
            if let Some(existing) = views.iter_mut().find(|v| v.id == view.id) {
                *existing = view;
            } else {
                views.push(view);
            }
        }
    }

    /// Remove a view by id.
    pub fn remove(&self, id: &str) {
        if let Ok(mut views) = self.views.write() {
            let before = views.len();
            views.retain(|v| v.id != id);
            if views.len() != before {
                tracing::info!("Removed view: {}", id);
            }
        }
    }

    /// Get a view by id.
    pub fn get(&self, id: &str) -> Option<ViewDescriptor> {
        self.views
            .read()
            .ok()?
            .iter()
            .find(|v| v.id == id)
            .cloned()
    }

    /// List all views in registration order.
    pub fn list(&self) -> Vec<ViewDescriptor> {
        self.views.read().map(|v| v.clone()).unwrap_or_default()
    }

    /// Check if a view is registered.
    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Get the number of registered views.
    pub fn len(&self) -> usize {
        self.views.read().map(|v| v.len()).unwrap_or(0)
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe registry of contributed client addons.
pub struct AddonRegistry {
    addons: RwLock<Vec<ClientAddon>>,
}

impl AddonRegistry {
    /// Create a new empty addon registry.
    pub fn new() -> Self {
        Self {
            addons: RwLock::new(Vec::new()),
        }
    }

    /// Register an addon, replacing any earlier registration with the same id.
    pub fn register(&self, addon: ClientAddon) {
        if let Ok(mut addons) = self.addons.write() {
            tracing::info!("Registered client addon: {}", addon.id);
            if let Some(existing) = addons.iter_mut().find(|a| a.id == addon.id) {
                *existing = addon;
            } else {
                addons.push(addon);
            }
        }
    }

    /// Remove an addon by id.
    pub fn remove(&self, id: &str) {
        if let Ok(mut addons) = self.addons.write() {
            addons.retain(|a| a.id != id);
        }
    }

    /// Get an addon by id.
    pub fn get(&self, id: &str) -> Option<ClientAddon> {
        self.addons
            .read()
            .ok()?
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// List all addons in registration order.
    pub fn list(&self) -> Vec<ClientAddon> {
        self.addons.read().map(|a| a.clone()).unwrap_or_default()
    }

    /// Get the number of registered addons.
    pub fn len(&self) -> usize {
        self.addons.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AddonRegistry {
    fn default() -> Self {
        Self::new()
    }
}
