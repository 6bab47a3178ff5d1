//! Main plugin host implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

use crate::api::{
    ActionResult, HookPayload, PluginApi, PLUGIN_RELOAD, PROJECT_OPEN,
};
use crate::cache::{BoundedCache, LOGO_CACHE_CAPACITY};
use crate::config::{HostConfig, BUILTIN_UI_FILE, PLUGIN_UI_FILE};
use crate::error::{HostError, Result};
use crate::loader::{DylibLoader, ModuleLoad, ModuleLoader, PromptsLoad, BUILTIN_MODULE_ID};
use crate::plugin::{
    is_official, is_plugin, plugin_website, InstallationState, InstallationStep, Plugin, Project,
    VersionInfo, HOST_SERVICE_ID,
};
use crate::registry::HttpRegistryClient;
use crate::services::{
    HostServices, ProgressState, PLUGIN_ACTION_CALLED, PLUGIN_ACTION_RESOLVED,
    PLUGIN_INSTALL_CHANNEL, PLUGIN_UPDATE_CHANNEL, VIEW_OPEN,
};
use crate::ui_registry::{AddonRegistry, ViewRegistry};
use crate::version::VersionResolver;

/// Main plugin host: discovers plugins, loads their UI modules against a
/// fresh API surface, and drives install/uninstall/update flows.
pub struct UiPluginHost {
    config: HostConfig,
    services: HostServices,
    loader: Arc<dyn ModuleLoader>,
    versions: VersionResolver,
    plugins: Vec<Plugin>,
    api: Option<Arc<PluginApi>>,
    view_registry: Arc<ViewRegistry>,
    addon_registry: Arc<AddonRegistry>,
    installation: InstallationState,
    logo_cache: BoundedCache<String>,
    last_project: Option<Project>,
    current_view: Option<String>,
}

impl UiPluginHost {
    /// Create a host with default collaborators and a dylib module loader.
    pub fn new(config: HostConfig) -> Self {
        let loader = Arc::new(DylibLoader::new(&config.project_dir, &config.modules_dir));
        let services = HostServices {
            registry: Arc::new(HttpRegistryClient::new(&config.registry_url)),
            ..HostServices::default()
        };
        Self::with_services(config, services, loader)
    }

    /// Create a host with custom collaborators.
    pub fn with_services(
        config: HostConfig,
        services: HostServices,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        let versions = VersionResolver::new(
            services.registry.clone(),
            services.manifests.clone(),
            loader.clone(),
        );
        Self {
            config,
            services,
            loader,
            versions,
            plugins: Vec::new(),
            api: None,
            view_registry: Arc::new(ViewRegistry::new()),
            addon_registry: Arc::new(AddonRegistry::new()),
            installation: InstallationState::default(),
            logo_cache: BoundedCache::new(LOGO_CACHE_CAPACITY),
            last_project: None,
            current_view: None,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Get the collaborator set.
    pub fn services(&self) -> &HostServices {
        &self.services
    }

    /// The current API surface, if a reset has run.
    pub fn api(&self) -> Option<Arc<PluginApi>> {
        self.api.clone()
    }

    /// The shared view registry.
    pub fn view_registry(&self) -> &Arc<ViewRegistry> {
        &self.view_registry
    }

    /// The shared client-addon registry.
    pub fn addon_registry(&self) -> &Arc<AddonRegistry> {
        &self.addon_registry
    }

    /// Snapshot of the transient installation state.
    pub fn installation(&self) -> InstallationState {
        self.installation.clone()
    }

    /// Clear the transient installation state.
    pub fn finish_installation(&mut self) {
        self.installation = InstallationState::default();
    }

    // === Discovery ===

    /// List plugins declared in the project manifest.
    ///
    /// Dev dependencies come before regular dependencies; the host-service
    /// entry, when present, is promoted to index 0. Duplicate ids across the
    /// two maps are kept. Discovery ends with a full API-surface reset, since
    /// the plugin list is the reset's primary input.
    pub async fn list(&mut self) -> Result<Vec<Plugin>> {
        let manifest = self.services.manifests.read(&self.config.project_dir)?;
        let mut plugins: Vec<Plugin> = Vec::new();
        plugins.extend(self.collect_plugins(&manifest.dev_dependencies));
        plugins.extend(self.collect_plugins(&manifest.dependencies));
        if let Some(index) = plugins.iter().position(|p| p.id == HOST_SERVICE_ID) {
            let host_service = plugins.remove(index);
            plugins.insert(0, host_service);
        }
        self.plugins = plugins.clone();
        self.reset_plugin_api().await;
        Ok(plugins)
    }

    /// The last discovered plugin list.
    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Get a discovered plugin by id.
    pub fn plugin(&self, id: &str) -> Option<Plugin> {
        self.plugins.iter().find(|p| p.id == id).cloned()
    }

    fn collect_plugins(&self, deps: &BTreeMap<String, String>) -> Vec<Plugin> {
        deps.iter()
            .filter(|(id, _)| is_plugin(id) || id.as_str() == HOST_SERVICE_ID)
            .map(|(id, range)| Plugin {
                id: id.clone(),
                version_range: range.clone(),
                official: is_official(id),
                installed: self.loader.resolve_root(id).is_some(),
                website: plugin_website(id),
            })
            .collect()
    }

    // === Versions & logos ===

    /// Version information for a discovered plugin.
    pub async fn version_info(&self, id: &str) -> Result<VersionInfo> {
        let plugin = self
            .plugin(id)
            .ok_or_else(|| HostError::PluginNotFound(id.to_string()))?;
        Ok(self.versions.version_info(&plugin).await)
    }

    /// Logo of an installed plugin as a data URI, if it ships one.
    pub fn logo(&self, id: &str) -> Option<String> {
        if let Some(logo) = self.logo_cache.get(id) {
            return Some(logo);
        }
        let root = self.loader.resolve_root(id)?;
        let bytes = std::fs::read(root.join("logo.png")).ok()?;
        let logo = format!("data:image/png;base64,{}", BASE64.encode(&bytes));
        self.logo_cache.put(id, logo.clone());
        Some(logo)
    }

    // === Reset ===

    /// Tear down the previous surface, build a new one, then make the
    /// project-open/reload decision for the current project.
    pub async fn reset_plugin_api(&mut self) {
        self.begin_reset();
        let project = self.services.projects.current().await;
        self.complete_reset(project).await;
    }

    /// Synchronous phase of a reset: deregister the old surface, clear
    /// watchers and suggestions, load every module against a fresh surface,
    /// and propagate its declarations into the shared registries.
    pub fn begin_reset(&mut self) {
        if let Some(old) = self.api.take() {
            for view in old.views() {
                self.view_registry.remove(&view.id);
            }
            for addon in old.client_addons() {
                self.addon_registry.remove(&addon.id);
            }
            for handler_id in old.ipc_handler_ids() {
                self.services.ipc.off(handler_id);
            }
        }
        self.services.watchers.clear();
        self.services.suggestions.clear();

        let surface = Arc::new(PluginApi::new());
        self.run_plugin_api(&surface, BUILTIN_MODULE_ID, BUILTIN_UI_FILE);
        let plugin_ids: Vec<String> = self.plugins.iter().map(|p| p.id.clone()).collect();
        for id in &plugin_ids {
            self.run_plugin_api(&surface, id, PLUGIN_UI_FILE);
        }
        let project_ui_file = self.config.project_ui_file.clone();
        self.run_plugin_api(&surface, ".", &project_ui_file);
        self.propagate(&surface);
        self.api = Some(surface);
    }

    /// Completion phase of a reset: decide between a project-open transition
    /// and a reload for the given project, fire the matching hook, and bind
    /// the project onto the surface.
    pub async fn complete_reset(&mut self, project: Option<Project>) {
        let Some(project) = project else { return };
        let same_project = self
            .last_project
            .as_ref()
            .map(|p| p.id == project.id)
            .unwrap_or(false);
        if same_project {
            self.call_hook(
                PLUGIN_RELOAD,
                HookPayload {
                    project: Some(project.clone()),
                    previous_project: None,
                },
            )
            .await;
            if let Some(view) = self.current_view.clone() {
                self.open_view(&view);
            }
        } else {
            let previous = self.last_project.take();
            tracing::info!(project = %project.id, "project opened");
            self.call_hook(
                PROJECT_OPEN,
                HookPayload {
                    project: Some(project.clone()),
                    previous_project: previous,
                },
            )
            .await;
        }
        if let Some(api) = &self.api {
            api.bind_project(project.clone());
        }
        self.last_project = Some(project);
    }

    /// Load one module against a surface, attributing its registrations.
    ///
    /// An absent module is skipped silently; a broken one is logged and
    /// skipped. Locale resources are loaded from the plugin folder regardless
    /// of the module outcome, and locale failures are ignored.
    pub fn run_plugin_api(&self, surface: &PluginApi, id: &str, file_tag: &str) {
        match self.loader.load_ui(id, file_tag) {
            ModuleLoad::Loaded(module) => {
                {
                    let mut api = surface.scoped(id);
                    module.register(&mut api);
                }
                surface.retain_module(module);
                tracing::debug!(plugin = id, file = file_tag, "loaded ui module");
            }
            ModuleLoad::Absent => {
                tracing::trace!(plugin = id, file = file_tag, "no ui module");
            }
            ModuleLoad::Failed(e) => {
                tracing::warn!(plugin = id, file = file_tag, error = %e, "failed to load ui module");
            }
        }

        if let Some(folder) = self.module_folder(id) {
            if let Err(e) = self.services.locales.load_folder(&folder) {
                tracing::trace!(plugin = id, error = %e, "no locales loaded");
            }
        }
    }

    fn propagate(&self, surface: &PluginApi) {
        for addon in surface.client_addons() {
            self.addon_registry.register(addon);
        }
        for view in surface.views() {
            self.view_registry.register(view);
        }
        let callbacks = surface.ipc_callbacks();
        for callback in callbacks.into_iter().skip(surface.bound_ipc_count()) {
            let id = self.services.ipc.on(callback);
            surface.push_ipc_handler_id(id);
        }
    }

    /// Open a view, publishing its open event.
    pub fn open_view(&mut self, id: &str) {
        self.current_view = Some(id.to_string());
        self.services.publisher.publish(VIEW_OPEN, json!({ "view": id }));
    }

    // === Dispatch ===

    /// Invoke every callback registered under a hook identifier, in
    /// registration order. A failing callback is logged and never prevents
    /// the remaining callbacks from running. Return values are discarded.
    pub async fn call_hook(&self, id: &str, payload: HookPayload) {
        let surface = self.api.clone();
        let callbacks = surface
            .as_ref()
            .map(|s| s.hook_callbacks(id))
            .unwrap_or_default();
        for callback in &callbacks {
            if let Err(e) = callback(payload.clone()).await {
                tracing::error!(hook = id, error = %e, "hook callback failed");
            }
        }
    }

    /// Invoke every callback registered under an action identifier,
    /// sequentially and in registration order, isolating per-callback
    /// failure. `results` and `errors` are parallel arrays; both events are
    /// published even with zero callbacks registered.
    pub async fn call_action(&self, id: &str, params: Value) -> ActionResult {
        tracing::debug!(action = id, "action called");
        self.services
            .publisher
            .publish(PLUGIN_ACTION_CALLED, json!({ "id": id, "params": params }));

        // Hold the surface across the dispatch so module code stays loaded.
        let surface = self.api.clone();
        let callbacks = surface
            .as_ref()
            .map(|s| s.action_callbacks(id))
            .unwrap_or_default();

        let mut results = Vec::with_capacity(callbacks.len());
        let mut errors = Vec::with_capacity(callbacks.len());
        for callback in &callbacks {
            match callback(params.clone()).await {
                Ok(value) => {
                    results.push(Some(value));
                    errors.push(None);
                }
                Err(e) => {
                    tracing::error!(action = id, error = %e, "action callback failed");
                    results.push(None);
                    errors.push(Some(e.to_string()));
                }
            }
        }

        let result = ActionResult {
            id: id.to_string(),
            params,
            results,
            errors,
        };
        self.services.publisher.publish(
            PLUGIN_ACTION_RESOLVED,
            serde_json::to_value(&result).unwrap_or(Value::Null),
        );
        result
    }

    // === Install / uninstall / update / invoke ===

    /// Install a plugin and collect its prompts.
    ///
    /// On failure the error propagates and `current_plugin_id` stays set;
    /// cleanup is the caller's responsibility.
    pub async fn install(&mut self, id: &str) -> Result<InstallationState> {
        self.services.progress.start(PLUGIN_INSTALL_CHANNEL);
        let result = self.install_inner(id).await;
        self.report_progress(PLUGIN_INSTALL_CHANNEL, &result);
        result
    }

    async fn install_inner(&mut self, id: &str) -> Result<InstallationState> {
        tracing::info!(plugin = id, "installing plugin");
        self.installation.current_plugin_id = Some(id.to_string());
        self.installation.step = Some(InstallationStep::Install);
        self.services.progress.set(
            PLUGIN_INSTALL_CHANNEL,
            ProgressState::status("plugin-install", Some(id.to_string())),
        );

        if self.config.debug && is_official(id) {
            self.mock_install(id)?;
        } else {
            self.services
                .package_manager
                .install(&self.config.project_dir, id)
                .await?;
        }

        self.services.prompts.reset();
        match self.loader.load_prompts(id) {
            PromptsLoad::Loaded(prompts) => {
                for prompt in prompts {
                    self.services.prompts.add(prompt);
                }
            }
            PromptsLoad::Absent => {
                tracing::warn!(plugin = id, "plugin has no prompts module");
            }
            PromptsLoad::Failed(e) => {
                tracing::warn!(plugin = id, error = %e, "failed to load prompts module");
            }
        }
        self.installation.step = Some(InstallationStep::Config);

        self.services.notifier.notify("Plugin installed", id, "done");
        Ok(self.installation.clone())
    }

    /// Uninstall a plugin, clearing the installation state on completion.
    pub async fn uninstall(&mut self, id: &str) -> Result<InstallationState> {
        self.services.progress.start(PLUGIN_INSTALL_CHANNEL);
        let result = self.uninstall_inner(id).await;
        self.report_progress(PLUGIN_INSTALL_CHANNEL, &result);
        result
    }

    async fn uninstall_inner(&mut self, id: &str) -> Result<InstallationState> {
        tracing::info!(plugin = id, "uninstalling plugin");
        self.installation.current_plugin_id = Some(id.to_string());
        self.installation.step = Some(InstallationStep::Uninstall);
        self.services.progress.set(
            PLUGIN_INSTALL_CHANNEL,
            ProgressState::status("plugin-uninstall", Some(id.to_string())),
        );

        if self.config.debug && is_official(id) {
            self.mock_uninstall(id)?;
        } else {
            self.services
                .package_manager
                .uninstall(&self.config.project_dir, id)
                .await?;
        }

        self.finish_installation();
        self.services
            .notifier
            .notify("Plugin uninstalled", id, "done");
        Ok(self.installation.clone())
    }

    /// Update a plugin to its wanted version, then reset the API surface.
    pub async fn update(&mut self, id: &str) -> Result<InstallationState> {
        self.services.progress.start(PLUGIN_UPDATE_CHANNEL);
        let result = self.update_inner(id, false).await;
        self.report_progress(PLUGIN_UPDATE_CHANNEL, &result);
        result.map(|_| self.installation.clone())
    }

    async fn update_inner(&mut self, id: &str, batch: bool) -> Result<()> {
        let plugin = self
            .plugin(id)
            .ok_or_else(|| HostError::PluginNotFound(id.to_string()))?;
        self.installation.current_plugin_id = Some(id.to_string());
        let info = self.versions.version_info(&plugin).await;
        tracing::info!(
            "Updating {} from {} to {}",
            id,
            info.current.as_deref().unwrap_or("(not installed)"),
            info.wanted.as_deref().unwrap_or("(unknown)"),
        );

        if self.config.debug && is_official(id) {
            self.mock_update(id, info.wanted.as_deref())?;
        } else {
            self.services
                .package_manager
                .update(&self.config.project_dir, id)
                .await?;
        }

        self.installation.current_plugin_id = None;
        if !batch {
            self.services.notifier.notify("Plugin updated", id, "done");
            self.reset_plugin_api().await;
        }
        Ok(())
    }

    /// Update every plugin whose wanted version differs from the installed
    /// one. Per-item notification and reset are suppressed; one notification
    /// and one reset run after the batch. Returns the updated plugins.
    pub async fn update_all(&mut self) -> Result<Vec<Plugin>> {
        self.services.progress.start(PLUGIN_UPDATE_CHANNEL);
        let result = self.update_all_inner().await;
        self.report_progress(PLUGIN_UPDATE_CHANNEL, &result);
        result
    }

    async fn update_all_inner(&mut self) -> Result<Vec<Plugin>> {
        let mut updated = Vec::new();
        for plugin in self.plugins.clone() {
            let info = self.versions.version_info(&plugin).await;
            let (Some(current), Some(wanted)) = (info.current.clone(), info.wanted.clone()) else {
                continue;
            };
            if current == wanted {
                continue;
            }
            self.update_inner(&plugin.id, true).await?;
            updated.push(plugin);
        }
        if !updated.is_empty() {
            self.services.notifier.notify(
                "Plugins updated",
                &format!("{} plugin(s) updated", updated.len()),
                "done",
            );
            self.reset_plugin_api().await;
        }
        Ok(updated)
    }

    /// Run a plugin's generator with the collected prompt answers, then
    /// re-run its module load to pick up newly generated registrations.
    pub async fn run_invoke(&mut self, id: &str) -> Result<InstallationState> {
        self.services.progress.start(PLUGIN_INSTALL_CHANNEL);
        let result = self.run_invoke_inner(id).await;
        self.report_progress(PLUGIN_INSTALL_CHANNEL, &result);
        result
    }

    async fn run_invoke_inner(&mut self, id: &str) -> Result<InstallationState> {
        tracing::info!(plugin = id, "invoking plugin generator");
        self.installation.current_plugin_id = Some(id.to_string());
        let answers = self.services.prompts.answers();
        self.services
            .invoker
            .invoke(&self.config.project_dir, id, answers)
            .await?;

        if let Some(surface) = self.api.clone() {
            self.run_plugin_api(&surface, id, PLUGIN_UI_FILE);
            self.propagate(&surface);
        }

        self.installation.step = Some(InstallationStep::Diff);
        self.services
            .notifier
            .notify("Plugin invoked successfully", id, "done");
        Ok(self.installation.clone())
    }

    fn report_progress<T>(&self, channel: &str, result: &Result<T>) {
        if let Err(e) = result {
            self.services
                .progress
                .set(channel, ProgressState::failed(e.to_string()));
        }
        self.services.progress.finish(channel);
    }

    fn mock_install(&self, id: &str) -> Result<()> {
        let mut manifest = self.services.manifests.read(&self.config.project_dir)?;
        manifest
            .dev_dependencies
            .insert(id.to_string(), "latest".to_string());
        self.services
            .manifests
            .write(&self.config.project_dir, &manifest)
    }

    fn mock_uninstall(&self, id: &str) -> Result<()> {
        let mut manifest = self.services.manifests.read(&self.config.project_dir)?;
        manifest.dependencies.remove(id);
        manifest.dev_dependencies.remove(id);
        self.services
            .manifests
            .write(&self.config.project_dir, &manifest)
    }

    fn mock_update(&self, id: &str, wanted: Option<&str>) -> Result<()> {
        let Some(wanted) = wanted else { return Ok(()) };
        let mut manifest = self.services.manifests.read(&self.config.project_dir)?;
        let range = format!("^{}", wanted);
        if manifest.dependencies.contains_key(id) {
            manifest.dependencies.insert(id.to_string(), range);
        } else {
            manifest.dev_dependencies.insert(id.to_string(), range);
        }
        self.services
            .manifests
            .write(&self.config.project_dir, &manifest)
    }

    // === Static assets ===

    /// Folder a plugin id serves static assets from, if resolvable.
    pub fn asset_folder(&self, id: &str) -> Option<PathBuf> {
        self.module_folder(id)
    }

    /// Resolve a static asset inside a plugin folder. The error message is
    /// suitable as a 404 response body.
    pub fn resolve_asset(&self, id: &str, relative_path: &str) -> Result<PathBuf> {
        let folder = self.module_folder(id).ok_or_else(|| HostError::AssetNotFound {
            id: id.to_string(),
            message: format!("Folder for '{}' could not be resolved", id),
        })?;
        let path = folder.join(relative_path);
        if path.is_file() {
            Ok(path)
        } else {
            Err(HostError::AssetNotFound {
                id: id.to_string(),
                message: format!("File '{}' not found in plugin '{}'", relative_path, id),
            })
        }
    }

    fn module_folder(&self, id: &str) -> Option<PathBuf> {
        if id == "." {
            return Some(self.config.project_dir.clone());
        }
        let as_path = Path::new(id);
        if as_path.is_absolute() && as_path.is_dir() {
            return Some(as_path.to_path_buf());
        }
        self.loader.resolve_root(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Api, ClientAddon, ViewDescriptor};
    use crate::loader::UiModule;
    use crate::registry::{PackageMetadata, RegistryClient};
    use crate::services::{
        FsManifestStore, ManifestStore, MemoryDataWatchers, MemoryIpcBus, MemoryProgressSink,
        MemoryProjectStore, MemoryPromptSink, MemoryPublisher, MemorySuggestions, NoopInvoker,
        PackageManager, PromptSink, TracingNotifier,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct OkPackageManager;

    #[async_trait]
    impl PackageManager for OkPackageManager {
        async fn install(&self, _cwd: &Path, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn uninstall(&self, _cwd: &Path, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn update(&self, _cwd: &Path, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FailingPackageManager;

    #[async_trait]
    impl PackageManager for FailingPackageManager {
        async fn install(&self, _cwd: &Path, id: &str) -> Result<()> {
            Err(HostError::PackageManager {
                id: id.to_string(),
                message: "install failed".to_string(),
            })
        }
        async fn uninstall(&self, _cwd: &Path, id: &str) -> Result<()> {
            Err(HostError::PackageManager {
                id: id.to_string(),
                message: "uninstall failed".to_string(),
            })
        }
        async fn update(&self, _cwd: &Path, id: &str) -> Result<()> {
            Err(HostError::PackageManager {
                id: id.to_string(),
                message: "update failed".to_string(),
            })
        }
    }

    struct UnreachableRegistry;

    #[async_trait]
    impl RegistryClient for UnreachableRegistry {
        async fn metadata(&self, id: &str) -> Result<PackageMetadata> {
            Err(HostError::Registry {
                id: id.to_string(),
                message: "offline".to_string(),
            })
        }
    }

    struct ViewModule {
        view_id: &'static str,
    }

    impl UiModule for ViewModule {
        fn register(&self, api: &mut Api<'_>) {
            api.add_view(ViewDescriptor {
                id: self.view_id.to_string(),
                name: self.view_id.to_string(),
                icon: None,
                tooltip: None,
            });
            api.add_client_addon(ClientAddon {
                id: format!("{}-addon", self.view_id),
                url: None,
                path: None,
            });
        }
    }

    struct ActionsModule;

    impl UiModule for ActionsModule {
        fn register(&self, api: &mut Api<'_>) {
            api.on_action("test-action", |params| async move {
                Ok(json!({ "echo": params }))
            });
            api.on_action("test-action", |_| async move {
                let failed: Result<Value> = Err(HostError::Action("boom".to_string()));
                failed
            });
            api.on_action("test-action", |_| async move { Ok(json!("third")) });
        }
    }

    struct HookModule {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl UiModule for HookModule {
        fn register(&self, api: &mut Api<'_>) {
            let log = self.log.clone();
            api.on_project_open(move |payload| {
                let log = log.clone();
                async move {
                    let id = payload.project.map(|p| p.id).unwrap_or_default();
                    log.lock().unwrap().push(format!("open:{}", id));
                    Ok(())
                }
            });
            let log = self.log.clone();
            api.on_plugin_reload(move |_| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("reload".to_string());
                    Ok(())
                }
            });
        }
    }

    struct IpcModule;

    impl UiModule for IpcModule {
        fn register(&self, api: &mut Api<'_>) {
            api.ipc_on(|_payload| {});
        }
    }

    struct Fixture {
        host: UiPluginHost,
        loader: Arc<DylibLoader>,
        publisher: Arc<MemoryPublisher>,
        projects: Arc<MemoryProjectStore>,
        prompts: Arc<MemoryPromptSink>,
        ipc: Arc<MemoryIpcBus>,
    }

    fn fixture(dir: &Path, package_manager: Arc<dyn PackageManager>, debug: bool) -> Fixture {
        let loader = Arc::new(DylibLoader::new(dir, dir.join("node_modules")));
        let publisher = Arc::new(MemoryPublisher::new());
        let projects = Arc::new(MemoryProjectStore::new());
        let prompts = Arc::new(MemoryPromptSink::new());
        let ipc = Arc::new(MemoryIpcBus::new());
        let services = HostServices {
            manifests: Arc::new(FsManifestStore),
            package_manager,
            registry: Arc::new(UnreachableRegistry),
            progress: Arc::new(MemoryProgressSink::new()),
            notifier: Arc::new(TracingNotifier),
            publisher: publisher.clone(),
            prompts: prompts.clone(),
            projects: projects.clone(),
            invoker: Arc::new(NoopInvoker),
            ipc: ipc.clone(),
            watchers: Arc::new(MemoryDataWatchers::new()),
            suggestions: Arc::new(MemorySuggestions::new()),
            locales: Arc::new(crate::services::FsLocaleLoader::new()),
        };
        let config = HostConfig::new(dir).with_debug(debug);
        let host = UiPluginHost::with_services(config, services, loader.clone());
        Fixture {
            host,
            loader,
            publisher,
            projects,
            prompts,
            ipc,
        }
    }

    fn write_manifest(dir: &Path, content: &str) {
        std::fs::write(dir.join("package.json"), content).unwrap();
    }

    #[tokio::test]
    async fn test_list_orders_host_service_first() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{
                "devDependencies": {"@vue/cli-service": "^4.0.0"},
                "dependencies": {"vue-cli-plugin-foo": "^1.0.0"}
            }"#,
        );
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);

        let plugins = f.host.list().await.unwrap();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[0].id, HOST_SERVICE_ID);
        assert!(plugins[0].official);
        assert_eq!(plugins[1].id, "vue-cli-plugin-foo");
        assert!(!plugins[1].official);
        assert!(!plugins[1].installed);
        assert!(plugins[1].website.as_deref().unwrap().contains("npmjs.com"));
    }

    #[tokio::test]
    async fn test_host_service_promoted_from_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{
                "devDependencies": {"vue-cli-plugin-aaa": "^1.0.0"},
                "dependencies": {"@vue/cli-service": "^4.0.0"}
            }"#,
        );
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);

        let plugins = f.host.list().await.unwrap();
        assert_eq!(plugins[0].id, HOST_SERVICE_ID);
        assert_eq!(plugins[1].id, "vue-cli-plugin-aaa");
    }

    #[tokio::test]
    async fn test_list_keeps_duplicates_across_maps() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{
                "devDependencies": {"vue-cli-plugin-foo": "^1.0.0"},
                "dependencies": {"vue-cli-plugin-foo": "^2.0.0"}
            }"#,
        );
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);

        let plugins = f.host.list().await.unwrap();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[0].version_range, "^1.0.0");
        assert_eq!(plugins[1].version_range, "^2.0.0");
    }

    #[tokio::test]
    async fn test_list_filters_non_plugins() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{
                "dependencies": {
                    "lodash": "^4.0.0",
                    "@babel/core": "^7.0.0",
                    "vue-cli-plugin-foo": "^1.0.0"
                }
            }"#,
        );
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);

        let plugins = f.host.list().await.unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].id, "vue-cli-plugin-foo");
    }

    #[tokio::test]
    async fn test_double_reset_keeps_single_registration() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"dependencies": {"vue-cli-plugin-foo": "^1.0.0"}}"#,
        );
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);
        f.loader.register_static(
            "vue-cli-plugin-foo",
            PLUGIN_UI_FILE,
            Arc::new(ViewModule { view_id: "foo.main" }),
        );

        f.host.list().await.unwrap();
        assert_eq!(f.host.view_registry().len(), 1);
        assert_eq!(f.host.addon_registry().len(), 1);

        f.host.reset_plugin_api().await;
        assert_eq!(f.host.view_registry().len(), 1);
        assert_eq!(f.host.addon_registry().len(), 1);
        assert!(f.host.view_registry().has("foo.main"));
    }

    #[tokio::test]
    async fn test_ipc_handlers_torn_down_on_reset() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"dependencies": {"vue-cli-plugin-foo": "^1.0.0"}}"#,
        );
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);
        f.loader
            .register_static("vue-cli-plugin-foo", PLUGIN_UI_FILE, Arc::new(IpcModule));

        f.host.list().await.unwrap();
        assert_eq!(f.ipc.len(), 1);

        f.host.reset_plugin_api().await;
        assert_eq!(f.ipc.len(), 1);
    }

    #[tokio::test]
    async fn test_call_action_without_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);
        f.host.list().await.unwrap();

        let result = f.host.call_action("missing-action", json!({ "a": 1 })).await;
        assert!(result.results.is_empty());
        assert!(result.errors.is_empty());
        assert_eq!(f.publisher.events_on(PLUGIN_ACTION_CALLED).len(), 1);
        assert_eq!(f.publisher.events_on(PLUGIN_ACTION_RESOLVED).len(), 1);
    }

    #[tokio::test]
    async fn test_call_action_isolates_failing_callback() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"dependencies": {"vue-cli-plugin-foo": "^1.0.0"}}"#,
        );
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);
        f.loader
            .register_static("vue-cli-plugin-foo", PLUGIN_UI_FILE, Arc::new(ActionsModule));
        f.host.list().await.unwrap();

        let result = f.host.call_action("test-action", json!(null)).await;
        assert_eq!(result.results.len(), 3);
        assert_eq!(result.errors.len(), 3);
        assert!(result.results[0].is_some());
        assert!(result.results[1].is_none());
        assert_eq!(result.results[2], Some(json!("third")));
        assert!(result.errors[0].is_none());
        assert!(result.errors[1].as_deref().unwrap().contains("boom"));
        assert!(result.errors[2].is_none());
    }

    #[tokio::test]
    async fn test_install_failure_keeps_current_plugin_id() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let mut f = fixture(dir.path(), Arc::new(FailingPackageManager), false);

        let result = f.host.install("vue-cli-plugin-foo").await;
        assert!(result.is_err());
        assert_eq!(
            f.host.installation().current_plugin_id.as_deref(),
            Some("vue-cli-plugin-foo")
        );
    }

    #[tokio::test]
    async fn test_install_collects_prompts_and_advances_step() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);
        f.loader
            .register_prompts("vue-cli-plugin-foo", || vec![json!({ "name": "useRouter" })]);

        let state = f.host.install("vue-cli-plugin-foo").await.unwrap();
        assert_eq!(state.step, Some(InstallationStep::Config));
        assert_eq!(state.current_plugin_id.as_deref(), Some("vue-cli-plugin-foo"));
        assert_eq!(f.prompts.list().len(), 1);

        f.host.finish_installation();
        assert_eq!(f.host.installation(), InstallationState::default());
    }

    #[tokio::test]
    async fn test_uninstall_clears_state() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);

        let state = f.host.uninstall("vue-cli-plugin-foo").await.unwrap();
        assert_eq!(state.current_plugin_id, None);
        assert_eq!(state.step, None);
    }

    #[tokio::test]
    async fn test_debug_install_edits_manifest_only() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        // A failing package manager proves the mock path never reaches it.
        let mut f = fixture(dir.path(), Arc::new(FailingPackageManager), true);

        f.host.install("@vue/cli-plugin-babel").await.unwrap();
        let manifest = FsManifestStore.read(dir.path()).unwrap();
        assert_eq!(
            manifest.dev_dependencies.get("@vue/cli-plugin-babel"),
            Some(&"latest".to_string())
        );
    }

    #[tokio::test]
    async fn test_debug_install_of_unofficial_plugin_uses_package_manager() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let mut f = fixture(dir.path(), Arc::new(FailingPackageManager), true);

        assert!(f.host.install("vue-cli-plugin-foo").await.is_err());
    }

    #[tokio::test]
    async fn test_project_open_and_reload_hooks() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"dependencies": {"vue-cli-plugin-foo": "^1.0.0"}}"#,
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);
        f.loader.register_static(
            "vue-cli-plugin-foo",
            PLUGIN_UI_FILE,
            Arc::new(HookModule { log: log.clone() }),
        );
        f.projects.open(Project {
            id: "p1".to_string(),
            name: "demo".to_string(),
            path: dir.path().to_path_buf(),
        });

        f.host.list().await.unwrap();
        f.host.reset_plugin_api().await;

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen, ["open:p1", "reload"]);
        assert_eq!(f.host.api().unwrap().project().unwrap().id, "p1");
    }

    #[tokio::test]
    async fn test_reset_without_project_fires_no_hooks() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"dependencies": {"vue-cli-plugin-foo": "^1.0.0"}}"#,
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);
        f.loader.register_static(
            "vue-cli-plugin-foo",
            PLUGIN_UI_FILE,
            Arc::new(HookModule { log: log.clone() }),
        );

        f.host.list().await.unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert!(f.host.api().unwrap().project().is_none());
    }

    #[tokio::test]
    async fn test_reload_reopens_current_view() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);
        f.projects.open(Project {
            id: "p1".to_string(),
            name: "demo".to_string(),
            path: dir.path().to_path_buf(),
        });

        f.host.list().await.unwrap();
        f.host.open_view("foo.main");
        f.host.reset_plugin_api().await;

        let opens = f.publisher.events_on(VIEW_OPEN);
        assert_eq!(opens.len(), 2);
        assert_eq!(opens[1]["view"], json!("foo.main"));
    }

    #[tokio::test]
    async fn test_update_unknown_plugin_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);

        let result = f.host.update("vue-cli-plugin-nope").await;
        assert!(matches!(result, Err(HostError::PluginNotFound(_))));
    }

    #[tokio::test]
    async fn test_debug_update_edits_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"devDependencies": {"@vue/cli-plugin-babel": "~1.0.0"}}"#,
        );
        let root = dir.path().join("node_modules").join("@vue/cli-plugin-babel");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("package.json"),
            r#"{"name": "@vue/cli-plugin-babel", "version": "1.0.0"}"#,
        )
        .unwrap();
        let mut f = fixture(dir.path(), Arc::new(FailingPackageManager), true);
        f.host.list().await.unwrap();

        // Registry is unreachable, so wanted falls back to the installed
        // version and the mock pins that.
        let state = f.host.update("@vue/cli-plugin-babel").await.unwrap();
        assert_eq!(state.current_plugin_id, None);
        let manifest = FsManifestStore.read(dir.path()).unwrap();
        assert_eq!(
            manifest.dev_dependencies.get("@vue/cli-plugin-babel"),
            Some(&"^1.0.0".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_all_skips_up_to_date_plugins() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"devDependencies": {"@vue/cli-plugin-babel": "^1.0.0"}}"#,
        );
        let root = dir.path().join("node_modules").join("@vue/cli-plugin-babel");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("package.json"),
            r#"{"name": "@vue/cli-plugin-babel", "version": "1.0.0"}"#,
        )
        .unwrap();
        // A failing package manager proves nothing gets updated.
        let mut f = fixture(dir.path(), Arc::new(FailingPackageManager), false);
        f.host.list().await.unwrap();

        let updated = f.host.update_all().await.unwrap();
        assert!(updated.is_empty());
    }

    #[tokio::test]
    async fn test_run_invoke_advances_to_diff() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let mut f = fixture(dir.path(), Arc::new(OkPackageManager), false);
        f.host.list().await.unwrap();

        let state = f.host.run_invoke("vue-cli-plugin-foo").await.unwrap();
        assert_eq!(state.step, Some(InstallationStep::Diff));
    }

    #[tokio::test]
    async fn test_resolve_asset() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let root = dir.path().join("node_modules").join("vue-cli-plugin-foo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("index.css"), "body {}").unwrap();
        let f = fixture(dir.path(), Arc::new(OkPackageManager), false);

        assert!(f.host.resolve_asset("vue-cli-plugin-foo", "index.css").is_ok());

        let missing = f.host.resolve_asset("vue-cli-plugin-foo", "missing.css");
        match missing {
            Err(HostError::AssetNotFound { message, .. }) => {
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }

        let unresolved = f.host.resolve_asset("vue-cli-plugin-none", "x.css");
        match unresolved {
            Err(HostError::AssetNotFound { message, .. }) => {
                assert!(message.contains("could not be resolved"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }

        assert!(f.host.resolve_asset(".", "package.json").is_ok());
    }

    #[tokio::test]
    async fn test_logo_encodes_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        let root = dir.path().join("node_modules").join("vue-cli-plugin-foo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("logo.png"), [137, 80, 78, 71]).unwrap();
        let f = fixture(dir.path(), Arc::new(OkPackageManager), false);

        let logo = f.host.logo("vue-cli-plugin-foo").unwrap();
        assert!(logo.starts_with("data:image/png;base64,"));

        // Cached: the file going away does not evict the entry.
        std::fs::remove_file(root.join("logo.png")).unwrap();
        assert_eq!(f.host.logo("vue-cli-plugin-foo").unwrap(), logo);

        assert!(f.host.logo("vue-cli-plugin-none").is_none());
    }
}
