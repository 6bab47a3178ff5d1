//! Collaborator contracts consumed by the host, with default implementations.
//!
//! Every external concern — manifest IO, the package manager, progress,
//! notifications, pub/sub, prompts, projects, IPC — is a trait here, so the
//! host can be wired with real services in the application and in-memory
//! doubles in tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::IpcCallback;
use crate::config::DEFAULT_REGISTRY_URL;
use crate::error::{HostError, Result};
use crate::plugin::Project;
use crate::registry::{HttpRegistryClient, RegistryClient};

/// Progress channel shared by install, uninstall, and invoke operations.
pub const PLUGIN_INSTALL_CHANNEL: &str = "plugin-installation";

/// Progress channel shared by update and bulk-update operations.
pub const PLUGIN_UPDATE_CHANNEL: &str = "plugin-update";

/// Pub/sub channel published before action callbacks run.
pub const PLUGIN_ACTION_CALLED: &str = "plugin-action-called";

/// Pub/sub channel published after all action callbacks settle.
pub const PLUGIN_ACTION_RESOLVED: &str = "plugin-action-resolved";

/// Pub/sub channel published when a view is opened or re-opened.
pub const VIEW_OPEN: &str = "view-open";

// === Manifest IO ===

/// A project or package manifest.
///
/// Unknown fields are retained so a read-modify-write cycle does not strip
/// them from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(
        rename = "devDependencies",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

/// Reads and writes package manifests.
pub trait ManifestStore: Send + Sync {
    fn read(&self, dir: &Path) -> Result<PackageManifest>;
    fn write(&self, dir: &Path, manifest: &PackageManifest) -> Result<()>;
}

/// Manifest store over `package.json` files on disk.
#[derive(Debug, Default)]
pub struct FsManifestStore;

impl ManifestStore for FsManifestStore {
    fn read(&self, dir: &Path) -> Result<PackageManifest> {
        let content = std::fs::read_to_string(dir.join("package.json"))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, dir: &Path, manifest: &PackageManifest) -> Result<()> {
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(dir.join("package.json"), content)?;
        Ok(())
    }
}

// === Package manager ===

/// Drives package install/uninstall/update operations.
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn install(&self, cwd: &Path, id: &str) -> Result<()>;
    async fn uninstall(&self, cwd: &Path, id: &str) -> Result<()>;
    async fn update(&self, cwd: &Path, id: &str) -> Result<()>;
}

/// Package manager shelling out to a command such as `npm`.
pub struct CommandPackageManager {
    command: String,
    registry: Option<String>,
}

impl CommandPackageManager {
    /// Create a package manager wrapper for a command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            registry: None,
        }
    }

    /// Pass a registry flag to every invocation.
    pub fn with_registry(mut self, url: impl Into<String>) -> Self {
        self.registry = Some(url.into());
        self
    }

    async fn run(&self, cwd: &Path, id: &str, args: &[&str]) -> Result<()> {
        let mut command = tokio::process::Command::new(&self.command);
        command
            .args(args)
            .arg(id)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(registry) = &self.registry {
            command.arg("--registry").arg(registry);
        }

        let output = command.output().await.map_err(|e| HostError::PackageManager {
            id: id.to_string(),
            message: format!("failed to spawn {}: {}", self.command, e),
        })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: "package_manager", "{}", line);
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(HostError::PackageManager {
                id: id.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl PackageManager for CommandPackageManager {
    async fn install(&self, cwd: &Path, id: &str) -> Result<()> {
        self.run(cwd, id, &["install", "--save-dev", "--loglevel", "error"])
            .await
    }

    async fn uninstall(&self, cwd: &Path, id: &str) -> Result<()> {
        self.run(cwd, id, &["uninstall", "--loglevel", "error"]).await
    }

    async fn update(&self, cwd: &Path, id: &str) -> Result<()> {
        self.run(cwd, id, &["update", "--loglevel", "error"]).await
    }
}

// === Progress ===

/// Progress state reported on a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressState {
    /// A status update, optionally carrying a detail string.
    pub fn status(status: impl Into<String>, info: Option<String>) -> Self {
        Self {
            status: status.into(),
            info,
            error: None,
        }
    }

    /// A failure report.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            info: None,
            error: Some(message.into()),
        }
    }
}

/// Sink for per-channel progress reports. Serializing concurrent operations
/// per channel id is this collaborator's concern, not the host's.
pub trait ProgressSink: Send + Sync {
    fn start(&self, channel: &str);
    fn set(&self, channel: &str, state: ProgressState);
    fn finish(&self, channel: &str);
}

/// In-memory progress sink recording every report.
#[derive(Default)]
pub struct MemoryProgressSink {
    events: RwLock<Vec<(String, ProgressState)>>,
}

impl MemoryProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports seen so far, in order.
    pub fn events(&self) -> Vec<(String, ProgressState)> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for MemoryProgressSink {
    fn start(&self, channel: &str) {
        self.set(channel, ProgressState::status("start", None));
    }

    fn set(&self, channel: &str, state: ProgressState) {
        if let Ok(mut events) = self.events.write() {
            events.push((channel.to_string(), state));
        }
    }

    fn finish(&self, channel: &str) {
        self.set(channel, ProgressState::status("done", None));
    }
}

// === Notifications ===

/// Fire-and-forget user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str, icon: &str);
}

/// Notifier that logs through tracing.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str, icon: &str) {
        tracing::info!(icon, "{}: {}", title, message);
    }
}

// === Pub/sub ===

/// Publishes events to UI subscribers.
pub trait Publisher: Send + Sync {
    fn publish(&self, channel: &str, payload: Value);
}

/// In-memory publisher recording every event.
#[derive(Default)]
pub struct MemoryPublisher {
    events: RwLock<Vec<(String, Value)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published events, in order.
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events published on one channel.
    pub fn events_on(&self, channel: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, channel: &str, payload: Value) {
        if let Ok(mut events) = self.events.write() {
            events.push((channel.to_string(), payload));
        }
    }
}

// === Prompts ===

/// Collects prompts contributed by a plugin and the user's answers.
pub trait PromptSink: Send + Sync {
    fn reset(&self);
    fn add(&self, prompt: Value);
    fn list(&self) -> Vec<Value>;
    fn answers(&self) -> Value;
}

/// In-memory prompt sink.
#[derive(Default)]
pub struct MemoryPromptSink {
    prompts: RwLock<Vec<Value>>,
    answers: RwLock<Value>,
}

impl MemoryPromptSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record answers, as a prompt UI would.
    pub fn set_answers(&self, answers: Value) {
        if let Ok(mut slot) = self.answers.write() {
            *slot = answers;
        }
    }
}

impl PromptSink for MemoryPromptSink {
    fn reset(&self) {
        if let Ok(mut prompts) = self.prompts.write() {
            prompts.clear();
        }
        self.set_answers(Value::Null);
    }

    fn add(&self, prompt: Value) {
        if let Ok(mut prompts) = self.prompts.write() {
            prompts.push(prompt);
        }
    }

    fn list(&self) -> Vec<Value> {
        self.prompts.read().map(|p| p.clone()).unwrap_or_default()
    }

    fn answers(&self) -> Value {
        self.answers
            .read()
            .map(|a| a.clone())
            .unwrap_or(Value::Null)
    }
}

// === Projects ===

/// Looks up the currently open project.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn current(&self) -> Option<Project>;
}

/// In-memory project store.
#[derive(Default)]
pub struct MemoryProjectStore {
    project: RwLock<Option<Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, project: Project) {
        if let Ok(mut slot) = self.project.write() {
            *slot = Some(project);
        }
    }

    pub fn close(&self) {
        if let Ok(mut slot) = self.project.write() {
            *slot = None;
        }
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn current(&self) -> Option<Project> {
        self.project.read().ok().and_then(|p| p.clone())
    }
}

// === Generator invocation ===

/// Runs a plugin's generator with collected prompt answers.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, cwd: &Path, id: &str, answers: Value) -> Result<()>;
}

/// Invoker that does nothing; applications supply a real one.
#[derive(Debug, Default)]
pub struct NoopInvoker;

#[async_trait]
impl Invoker for NoopInvoker {
    async fn invoke(&self, _cwd: &Path, id: &str, _answers: Value) -> Result<()> {
        tracing::debug!(plugin = id, "no invoker configured, skipping generator");
        Ok(())
    }
}

// === IPC ===

/// Inter-process handler bus.
pub trait IpcBus: Send + Sync {
    /// Register a handler, returning an id usable for deregistration.
    fn on(&self, handler: IpcCallback) -> u64;
    /// Deregister a handler.
    fn off(&self, id: u64);
}

/// In-memory IPC bus.
#[derive(Default)]
pub struct MemoryIpcBus {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<u64, IpcCallback>>,
}

impl MemoryIpcBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to every registered handler.
    pub fn send(&self, payload: Value) {
        let handlers: Vec<IpcCallback> = self
            .handlers
            .read()
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    /// Check if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IpcBus for MemoryIpcBus {
    fn on(&self, handler: IpcCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(id, handler);
        }
        id
    }

    fn off(&self, id: u64) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.remove(&id);
        }
    }
}

// === Data watchers & suggestions ===

/// Active data-watch subscriptions, cleared on reset.
pub trait DataWatchers: Send + Sync {
    fn clear(&self);
}

/// Pending suggestions, cleared on reset.
pub trait Suggestions: Send + Sync {
    fn clear(&self);
}

/// In-memory watcher set counting clears.
#[derive(Default)]
pub struct MemoryDataWatchers {
    clears: AtomicUsize,
}

impl MemoryDataWatchers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::Relaxed)
    }
}

impl DataWatchers for MemoryDataWatchers {
    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-memory suggestion list counting clears.
#[derive(Default)]
pub struct MemorySuggestions {
    clears: AtomicUsize,
}

impl MemorySuggestions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::Relaxed)
    }
}

impl Suggestions for MemorySuggestions {
    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }
}

// === Locales ===

/// Loads locale resources contributed by a plugin folder.
pub trait LocaleLoader: Send + Sync {
    fn load_folder(&self, dir: &Path) -> Result<()>;
}

/// Locale loader merging `locales/*.json` files into a shared map.
#[derive(Default)]
pub struct FsLocaleLoader {
    locales: RwLock<HashMap<String, Value>>,
}

impl FsLocaleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merged locale data keyed by language.
    pub fn locales(&self) -> HashMap<String, Value> {
        self.locales.read().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LocaleLoader for FsLocaleLoader {
    fn load_folder(&self, dir: &Path) -> Result<()> {
        let locales_dir = dir.join("locales");
        for entry in std::fs::read_dir(&locales_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let data: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
            if let Ok(mut locales) = self.locales.write() {
                match (locales.get_mut(lang), data) {
                    (Some(Value::Object(existing)), Value::Object(incoming)) => {
                        for (key, value) in incoming {
                            existing.insert(key, value);
                        }
                    }
                    (_, data) => {
                        locales.insert(lang.to_string(), data);
                    }
                }
            }
        }
        Ok(())
    }
}

// === Service bundle ===

/// The collaborator set a host is wired with.
#[derive(Clone)]
pub struct HostServices {
    pub manifests: Arc<dyn ManifestStore>,
    pub package_manager: Arc<dyn PackageManager>,
    pub registry: Arc<dyn RegistryClient>,
    pub progress: Arc<dyn ProgressSink>,
    pub notifier: Arc<dyn Notifier>,
    pub publisher: Arc<dyn Publisher>,
    pub prompts: Arc<dyn PromptSink>,
    pub projects: Arc<dyn ProjectStore>,
    pub invoker: Arc<dyn Invoker>,
    pub ipc: Arc<dyn IpcBus>,
    pub watchers: Arc<dyn DataWatchers>,
    pub suggestions: Arc<dyn Suggestions>,
    pub locales: Arc<dyn LocaleLoader>,
}

impl Default for HostServices {
    fn default() -> Self {
        Self {
            manifests: Arc::new(FsManifestStore),
            package_manager: Arc::new(CommandPackageManager::new("npm")),
            registry: Arc::new(HttpRegistryClient::new(DEFAULT_REGISTRY_URL)),
            progress: Arc::new(MemoryProgressSink::new()),
            notifier: Arc::new(TracingNotifier),
            publisher: Arc::new(MemoryPublisher::new()),
            prompts: Arc::new(MemoryPromptSink::new()),
            projects: Arc::new(MemoryProjectStore::new()),
            invoker: Arc::new(NoopInvoker),
            ipc: Arc::new(MemoryIpcBus::new()),
            watchers: Arc::new(MemoryDataWatchers::new()),
            suggestions: Arc::new(MemorySuggestions::new()),
            locales: Arc::new(FsLocaleLoader::new()),
        }
    }
}
