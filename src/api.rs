//! The plugin API surface and the registration handle given to plugin modules.
//!
//! A fresh [`PluginApi`] is built on every reset. Plugin modules never touch
//! it directly: each module receives an [`Api`] handle scoped to its own
//! plugin id, so every registered hook, action, view, and addon carries an
//! owner tag attributing it to the plugin that contributed it.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HostError;
use crate::loader::UiModule;
use crate::plugin::Project;

/// Hook fired when a project is opened, with the previous project attached.
pub const PROJECT_OPEN: &str = "projectOpen";

/// Hook fired when plugins are reloaded for an already-open project.
pub const PLUGIN_RELOAD: &str = "pluginReload";

/// Callback registered under an action identifier.
pub type ActionCallback =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, HostError>> + Send + Sync>;

/// Callback registered under a hook identifier.
pub type HookCallback =
    Arc<dyn Fn(HookPayload) -> BoxFuture<'static, Result<(), HostError>> + Send + Sync>;

/// Callback registered as an inter-process handler.
pub type IpcCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Arguments passed to hook callbacks.
#[derive(Debug, Clone, Default)]
pub struct HookPayload {
    pub project: Option<Project>,
    pub previous_project: Option<Project>,
}

/// A view contributed by a plugin to the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDescriptor {
    /// Unique view identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Icon identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Tooltip shown in the navigation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

/// A client-side addon bundle contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAddon {
    /// Unique addon identifier
    pub id: String,
    /// URL the addon bundle is served from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Local folder holding the built bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Outcome of dispatching an action to all registered callbacks.
///
/// `results` and `errors` are parallel arrays the length of the callback
/// list; a position holds either a result or an error, never both.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub id: String,
    pub params: Value,
    pub results: Vec<Option<Value>>,
    pub errors: Vec<Option<String>>,
}

pub(crate) struct HookHandler {
    pub owner: String,
    pub callback: HookCallback,
}

pub(crate) struct ActionHandler {
    pub owner: String,
    pub callback: ActionCallback,
}

pub(crate) struct IpcHandler {
    #[allow(dead_code)] // Owner attribution, kept for diagnostics
    pub owner: String,
    pub callback: IpcCallback,
}

#[derive(Default)]
struct ApiInner {
    hooks: HashMap<String, Vec<HookHandler>>,
    actions: HashMap<String, Vec<ActionHandler>>,
    views: Vec<ViewDescriptor>,
    client_addons: Vec<ClientAddon>,
    ipc_handlers: Vec<IpcHandler>,
    ipc_handler_ids: Vec<u64>,
    // Loaded module objects keep their backing dynamic libraries mapped.
    // Must be the last field: handlers above may point into module code and
    // have to drop first when the surface is discarded.
    modules: Vec<Arc<dyn UiModule>>,
}

/// The registration surface populated by plugin modules during a reset.
///
/// Replaced, never mutated in place, on every reset; the host owns it and
/// other components read through accessors.
#[derive(Default)]
pub struct PluginApi {
    inner: RwLock<ApiInner>,
    project: RwLock<Option<Project>>,
}

impl PluginApi {
    /// Create an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a registration handle attributing contributions to `owner`.
    pub fn scoped(&self, owner: impl Into<String>) -> Api<'_> {
        Api {
            owner: owner.into(),
            surface: self,
        }
    }

    /// Declared views, in declaration order.
    pub fn views(&self) -> Vec<ViewDescriptor> {
        self.inner
            .read()
            .map(|inner| inner.views.clone())
            .unwrap_or_default()
    }

    /// Declared client addons, in declaration order.
    pub fn client_addons(&self) -> Vec<ClientAddon> {
        self.inner
            .read()
            .map(|inner| inner.client_addons.clone())
            .unwrap_or_default()
    }

    /// Callbacks registered under a hook identifier, in registration order.
    pub fn hook_callbacks(&self, id: &str) -> Vec<HookCallback> {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .hooks
                    .get(id)
                    .map(|handlers| handlers.iter().map(|h| h.callback.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Callbacks registered under an action identifier, in registration order.
    pub fn action_callbacks(&self, id: &str) -> Vec<ActionCallback> {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .actions
                    .get(id)
                    .map(|handlers| handlers.iter().map(|h| h.callback.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Owner ids of the callbacks registered under an action identifier.
    pub fn action_owners(&self, id: &str) -> Vec<String> {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .actions
                    .get(id)
                    .map(|handlers| handlers.iter().map(|h| h.owner.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// The project bound to this surface, if a project-open hook has fired.
    pub fn project(&self) -> Option<Project> {
        self.project.read().ok().and_then(|p| p.clone())
    }

    pub(crate) fn bind_project(&self, project: Project) {
        if let Ok(mut slot) = self.project.write() {
            *slot = Some(project);
        }
    }

    pub(crate) fn retain_module(&self, module: Arc<dyn UiModule>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.modules.push(module);
        }
    }

    pub(crate) fn ipc_callbacks(&self) -> Vec<IpcCallback> {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .ipc_handlers
                    .iter()
                    .map(|h| h.callback.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn ipc_handler_ids(&self) -> Vec<u64> {
        self.inner
            .read()
            .map(|inner| inner.ipc_handler_ids.clone())
            .unwrap_or_default()
    }

    pub(crate) fn push_ipc_handler_id(&self, id: u64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.ipc_handler_ids.push(id);
        }
    }

    /// Number of IPC handlers already bound to the bus.
    pub(crate) fn bound_ipc_count(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.ipc_handler_ids.len())
            .unwrap_or(0)
    }
}

/// Registration handle a plugin module configures the surface through.
///
/// Scoped to the contributing plugin: everything registered here is tagged
/// with that plugin's id.
pub struct Api<'a> {
    owner: String,
    surface: &'a PluginApi,
}

impl Api<'_> {
    /// Identifier of the plugin this handle is scoped to.
    pub fn plugin_id(&self) -> &str {
        &self.owner
    }

    /// Declare a view. Later declarations with the same id replace earlier ones.
    pub fn add_view(&mut self, view: ViewDescriptor) {
        if let Ok(mut inner) = self.surface.inner.write() {
            if let Some(existing) = inner.views.iter_mut().find(|v| v.id == view.id) {
                *existing = view;
            } else {
                inner.views.push(view);
            }
        }
    }

    /// Declare a client addon.
    pub fn add_client_addon(&mut self, addon: ClientAddon) {
        if let Ok(mut inner) = self.surface.inner.write() {
            if let Some(existing) = inner.client_addons.iter_mut().find(|a| a.id == addon.id) {
                *existing = addon;
            } else {
                inner.client_addons.push(addon);
            }
        }
    }

    /// Register a callback under a hook identifier.
    pub fn on<F, Fut>(&mut self, hook_id: impl Into<String>, callback: F)
    where
        F: Fn(HookPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HostError>> + Send + 'static,
    {
        let handler = HookHandler {
            owner: self.owner.clone(),
            callback: Arc::new(move |payload| -> BoxFuture<'static, Result<(), HostError>> {
                Box::pin(callback(payload))
            }),
        };
        if let Ok(mut inner) = self.surface.inner.write() {
            inner.hooks.entry(hook_id.into()).or_default().push(handler);
        }
    }

    /// Register a project-open callback.
    pub fn on_project_open<F, Fut>(&mut self, callback: F)
    where
        F: Fn(HookPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HostError>> + Send + 'static,
    {
        self.on(PROJECT_OPEN, callback);
    }

    /// Register a plugin-reload callback.
    pub fn on_plugin_reload<F, Fut>(&mut self, callback: F)
    where
        F: Fn(HookPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HostError>> + Send + 'static,
    {
        self.on(PLUGIN_RELOAD, callback);
    }

    /// Register a callback under an action identifier.
    pub fn on_action<F, Fut>(&mut self, action_id: impl Into<String>, callback: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HostError>> + Send + 'static,
    {
        let handler = ActionHandler {
            owner: self.owner.clone(),
            callback: Arc::new(move |params| -> BoxFuture<'static, Result<Value, HostError>> {
                Box::pin(callback(params))
            }),
        };
        if let Ok(mut inner) = self.surface.inner.write() {
            inner
                .actions
                .entry(action_id.into())
                .or_default()
                .push(handler);
        }
    }

    /// Register an inter-process handler, bound to the bus when the surface
    /// is propagated and torn down with it.
    pub fn ipc_on<F>(&mut self, callback: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let handler = IpcHandler {
            owner: self.owner.clone(),
            callback: Arc::new(callback),
        };
        if let Ok(mut inner) = self.surface.inner.write() {
            inner.ipc_handlers.push(handler);
        }
    }
}
