//! Plugin module resolution and loading.
//!
//! Contributed UI modules are dynamic libraries exporting a plain-Rust
//! register function; built-in and test modules can be registered statically.
//! Loading distinguishes a module that is genuinely absent from one that
//! resolved but failed to load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use libloading::Library;
use serde_json::Value;

use crate::api::Api;
use crate::error::HostError;

/// Fixed identifier of the host's own built-in module.
pub const BUILTIN_MODULE_ID: &str = "built-in";

/// Entry symbol a plugin UI module exports.
pub const UI_REGISTER_SYMBOL: &[u8] = b"ui_plugin_register";

/// Signature of the register entry a UI module exports.
pub type UiRegisterFn = for<'a, 'b> fn(&'a mut Api<'b>);

/// A loaded UI module: a callable that registers against the API surface.
pub trait UiModule: Send + Sync {
    fn register(&self, api: &mut Api<'_>);
}

/// Adapter turning a plain function or closure into a [`UiModule`].
pub struct FnModule<F>(pub F);

impl<F> UiModule for FnModule<F>
where
    F: for<'a, 'b> Fn(&'a mut Api<'b>) + Send + Sync,
{
    fn register(&self, api: &mut Api<'_>) {
        (self.0)(api)
    }
}

/// Outcome of a UI module load.
///
/// `Absent` (no module contributed) is an ordinary state; `Failed` means a
/// module resolved but could not be loaded.
pub enum ModuleLoad {
    Loaded(Arc<dyn UiModule>),
    Absent,
    Failed(HostError),
}

/// Outcome of a prompts module load.
pub enum PromptsLoad {
    Loaded(Vec<Value>),
    Absent,
    Failed(HostError),
}

/// Module resolution and loading, injectable for tests.
pub trait ModuleLoader: Send + Sync {
    /// Resolve the installed root folder of a plugin, if present on disk.
    fn resolve_root(&self, id: &str) -> Option<PathBuf>;

    /// Load the UI module `<id>/<file_tag>`.
    fn load_ui(&self, id: &str, file_tag: &str) -> ModuleLoad;

    /// Load the prompts contributed by a plugin.
    fn load_prompts(&self, id: &str) -> PromptsLoad;
}

type PromptsFactory = Arc<dyn Fn() -> Vec<Value> + Send + Sync>;

/// Default loader backed by dynamic libraries, with a static side table for
/// compiled-in modules (the built-in module, tests).
pub struct DylibLoader {
    project_dir: PathBuf,
    modules_dir: PathBuf,
    statics: RwLock<HashMap<(String, String), Arc<dyn UiModule>>>,
    static_prompts: RwLock<HashMap<String, PromptsFactory>>,
}

/// Find the module binary, trying platform filename variants.
/// Handles lib-prefixed names and dash/underscore library names.
fn find_module_binary(dir: &Path, tag: &str) -> PathBuf {
    let ext = if cfg!(target_os = "macos") {
        "dylib"
    } else if cfg!(target_os = "windows") {
        "dll"
    } else {
        "so"
    };

    let variants = [
        format!("{}.{}", tag, ext),
        format!("lib{}.{}", tag, ext),
        format!("lib{}.{}", tag.replace('-', "_"), ext),
    ];

    for variant in &variants {
        let path = dir.join(variant);
        if path.exists() {
            return path;
        }
    }

    dir.join(&variants[0])
}

struct DylibModule {
    entry: UiRegisterFn,
    // Keeps the module code mapped for as long as `entry` may run.
    _library: Library,
}

impl UiModule for DylibModule {
    fn register(&self, api: &mut Api<'_>) {
        (self.entry)(api)
    }
}

impl DylibLoader {
    /// Create a loader resolving plugin ids under `modules_dir`, with `.`
    /// mapping to the project directory.
    pub fn new(project_dir: impl Into<PathBuf>, modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            modules_dir: modules_dir.into(),
            statics: RwLock::new(HashMap::new()),
            static_prompts: RwLock::new(HashMap::new()),
        }
    }

    /// Register a compiled-in module under `(id, file_tag)`.
    pub fn register_static(
        &self,
        id: impl Into<String>,
        file_tag: impl Into<String>,
        module: Arc<dyn UiModule>,
    ) {
        if let Ok(mut statics) = self.statics.write() {
            statics.insert((id.into(), file_tag.into()), module);
        }
    }

    /// Register a compiled-in prompts factory for a plugin.
    pub fn register_prompts<F>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Vec<Value> + Send + Sync + 'static,
    {
        if let Ok(mut prompts) = self.static_prompts.write() {
            prompts.insert(id.into(), Arc::new(factory));
        }
    }

    /// Folder a plugin id resolves to: the project directory for `.`, the
    /// path itself for path-like ids, else the installed module root.
    pub fn folder_for(&self, id: &str) -> Option<PathBuf> {
        if id == "." {
            return Some(self.project_dir.clone());
        }
        let as_path = Path::new(id);
        if as_path.is_absolute() && as_path.is_dir() {
            return Some(as_path.to_path_buf());
        }
        self.resolve_root(id)
    }
}

impl ModuleLoader for DylibLoader {
    fn resolve_root(&self, id: &str) -> Option<PathBuf> {
        let dir = self.modules_dir.join(id);
        dir.is_dir().then_some(dir)
    }

    fn load_ui(&self, id: &str, file_tag: &str) -> ModuleLoad {
        if let Ok(statics) = self.statics.read() {
            if let Some(module) = statics.get(&(id.to_string(), file_tag.to_string())) {
                return ModuleLoad::Loaded(module.clone());
            }
        }

        let Some(root) = self.folder_for(id) else {
            return ModuleLoad::Absent;
        };
        let binary = find_module_binary(&root, file_tag);
        if !binary.exists() {
            return ModuleLoad::Absent;
        }

        // Safety: the module is trusted code installed by the user; it runs
        // with full host privileges by design.
        let library = match unsafe { Library::new(&binary) } {
            Ok(library) => library,
            Err(e) => {
                return ModuleLoad::Failed(HostError::ModuleLoad {
                    id: id.to_string(),
                    file: file_tag.to_string(),
                    message: e.to_string(),
                })
            }
        };
        let entry = match unsafe { library.get::<UiRegisterFn>(UI_REGISTER_SYMBOL) } {
            Ok(symbol) => *symbol,
            Err(e) => {
                return ModuleLoad::Failed(HostError::ModuleLoad {
                    id: id.to_string(),
                    file: file_tag.to_string(),
                    message: format!("missing register symbol: {}", e),
                })
            }
        };

        ModuleLoad::Loaded(Arc::new(DylibModule {
            entry,
            _library: library,
        }))
    }

    fn load_prompts(&self, id: &str) -> PromptsLoad {
        if let Ok(prompts) = self.static_prompts.read() {
            if let Some(factory) = prompts.get(id) {
                return PromptsLoad::Loaded(factory());
            }
        }

        let Some(root) = self.folder_for(id) else {
            return PromptsLoad::Absent;
        };
        let path = root.join("prompts.json");
        if !path.exists() {
            return PromptsLoad::Absent;
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => return PromptsLoad::Failed(e.into()),
        };
        match serde_json::from_str::<Vec<Value>>(&content) {
            Ok(prompts) => PromptsLoad::Loaded(prompts),
            Err(e) => PromptsLoad::Failed(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PluginApi;
    use serde_json::json;

    fn noop_module(api: &mut Api<'_>) {
        let _ = api.plugin_id();
    }

    #[test]
    fn test_static_module_loads() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DylibLoader::new(dir.path(), dir.path().join("node_modules"));
        loader.register_static("plugin-a", "ui", Arc::new(FnModule(noop_module)));

        match loader.load_ui("plugin-a", "ui") {
            ModuleLoad::Loaded(module) => {
                let surface = PluginApi::new();
                let mut api = surface.scoped("plugin-a");
                module.register(&mut api);
            }
            _ => panic!("expected loaded module"),
        }
    }

    #[test]
    fn test_missing_module_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DylibLoader::new(dir.path(), dir.path().join("node_modules"));
        assert!(matches!(loader.load_ui("no-such", "ui"), ModuleLoad::Absent));
    }

    #[test]
    fn test_resolve_root() {
        let dir = tempfile::tempdir().unwrap();
        let modules = dir.path().join("node_modules");
        std::fs::create_dir_all(modules.join("vue-cli-plugin-foo")).unwrap();
        let loader = DylibLoader::new(dir.path(), &modules);

        assert!(loader.resolve_root("vue-cli-plugin-foo").is_some());
        assert!(loader.resolve_root("vue-cli-plugin-bar").is_none());
        assert_eq!(loader.folder_for(".").unwrap(), dir.path());
    }

    #[test]
    fn test_prompts_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("node_modules").join("vue-cli-plugin-foo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("prompts.json"),
            r#"[{"name": "useRouter", "type": "confirm"}]"#,
        )
        .unwrap();
        let loader = DylibLoader::new(dir.path(), dir.path().join("node_modules"));

        match loader.load_prompts("vue-cli-plugin-foo") {
            PromptsLoad::Loaded(prompts) => {
                assert_eq!(prompts.len(), 1);
                assert_eq!(prompts[0]["name"], json!("useRouter"));
            }
            _ => panic!("expected prompts"),
        }
    }

    #[test]
    fn test_broken_prompts_file_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("node_modules").join("vue-cli-plugin-foo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("prompts.json"), "not json").unwrap();
        let loader = DylibLoader::new(dir.path(), dir.path().join("node_modules"));

        assert!(matches!(
            loader.load_prompts("vue-cli-plugin-foo"),
            PromptsLoad::Failed(_)
        ));
    }

    #[test]
    fn test_static_prompts_factory() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DylibLoader::new(dir.path(), dir.path().join("node_modules"));
        loader.register_prompts("plugin-a", || vec![json!({"name": "lintOn"})]);

        match loader.load_prompts("plugin-a") {
            PromptsLoad::Loaded(prompts) => assert_eq!(prompts[0]["name"], json!("lintOn")),
            _ => panic!("expected prompts"),
        }
    }
}
