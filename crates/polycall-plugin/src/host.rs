//! Host-side entry point to every installed loader.
//!
//! The [`LoaderHost`] owns a [`PluginManager`] named `"loader"` with one
//! plugin per guest language. Each loader plugin in turn owns a manager,
//! named after the loader tag, with one plugin per loaded script handle.
//! Functions exported by handles are indexed host-wide by name.
//!
//! Teardown runs loaders in reverse registration order: each loader first
//! unloads all of its handles and then shuts its runtime down.

use crate::installed::InstalledLoader;
use crate::error::{PluginError, PluginResult};
use crate::loader::{handle_name, Loader};
use crate::manager::{PluginManager, PluginManagerInterface};
use crate::path::LibraryPath;
use crate::plugin::Plugin;
use polycall_reflect::{Function, Value, LOG_TARGET};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Name of the manager holding loaders.
pub const LOADER_MANAGER: &str = "loader";

/// Environment variable overriding the loader library path.
pub const LIBRARY_PATH_ENV: &str = "POLYCALL_LIBRARY_PATH";

/// Default loader library path.
pub const DEFAULT_LIBRARY_PATH: &str = "/usr/local/lib/polycall";

/// Loader host configuration.
#[derive(Debug, Clone)]
pub struct LoaderHostConfig {
    /// Environment variable overriding the library path.
    pub library_path_env: String,

    /// Library path used when the variable is unset or empty.
    pub default_library_path: PathBuf,
}

impl Default for LoaderHostConfig {
    fn default() -> Self {
        Self {
            library_path_env: LIBRARY_PATH_ENV.to_string(),
            default_library_path: PathBuf::from(DEFAULT_LIBRARY_PATH),
        }
    }
}

/// Payload of a loader plugin.
struct LoaderEntry {
    loader: Box<dyn Loader>,
    handles: PluginManager,
    sequence: u64,
}

impl LoaderEntry {
    fn shutdown(&mut self) -> PluginResult<()> {
        let tag = self.loader.tag().to_string();
        let mut first_error = None;

        for name in self.handles.names() {
            if let Err(e) = self.handles.remove(&name) {
                first_error.get_or_insert(e);
                continue;
            }
            if let Err(e) = self.loader.unload(&name) {
                error!(target: LOG_TARGET, loader = %tag, "Failed to unload '{}': {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.handles.destroy() {
            first_error.get_or_insert(e);
        }

        if let Err(e) = self.loader.destroy() {
            error!(target: LOG_TARGET, loader = %tag, "Failed to destroy loader: {}", e);
            first_error.get_or_insert(e);
        }

        info!(target: LOG_TARGET, loader = %tag, "Loader destroyed");
        first_error.map_or(Ok(()), Err)
    }
}

/// Payload of a script handle plugin.
struct LoadedHandle {
    functions: HashMap<String, Arc<Function>>,
}

/// Shuts loaders down newest first.
struct LoaderShutdown;

impl PluginManagerInterface for LoaderShutdown {
    fn destroy(&self, manager: &mut PluginManager) -> Option<PluginResult<()>> {
        let mut order = Vec::new();
        let loaders = manager.iterate(|_, plugin| match plugin.payload::<LoaderEntry>() {
            Some(entry) => {
                order.push((entry.sequence, plugin.name().to_string()));
                true
            }
            None => false,
        });
        if loaders < manager.len() {
            warn!(
                target: LOG_TARGET,
                "Loader manager holds {} plugins that are not loaders",
                manager.len() - loaders
            );
        }
        order.sort_by(|a, b| b.0.cmp(&a.0));

        let mut first_error = None;

        for (_, name) in order {
            match manager.remove(&name) {
                Ok(Some(mut plugin)) => {
                    if let Some(entry) = plugin.payload_mut::<LoaderEntry>() {
                        if let Err(e) = entry.shutdown() {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        Some(first_error.map_or(Ok(()), Err))
    }
}

/// Registry of loaders and the functions they export.
pub struct LoaderHost {
    manager: PluginManager,
    index: HashMap<String, (String, String)>,
    next_sequence: u64,
}

impl LoaderHost {
    /// Create a host and initialize its loader manager.
    pub fn new(config: LoaderHostConfig) -> PluginResult<Self> {
        let mut manager = PluginManager::new();
        manager.initialize(
            LOADER_MANAGER,
            &config.library_path_env,
            &config.default_library_path,
            Some(Arc::new(LoaderShutdown)),
            None,
        )?;

        Ok(Self {
            manager,
            index: HashMap::new(),
            next_sequence: 0,
        })
    }

    /// The loader library path.
    pub fn library_path(&self) -> Option<&LibraryPath> {
        self.manager.library_path()
    }

    /// The underlying loader manager.
    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    /// Loaders installed under the library path.
    pub fn discover(&self) -> PluginResult<Vec<InstalledLoader>> {
        let path = self
            .library_path()
            .ok_or_else(|| PluginError::InvalidState("loader host is destroyed".to_string()))?;
        path.installed_loaders()
    }

    /// Register a loader under its tag.
    ///
    /// The loader gets its own handle manager whose library path is
    /// `<TAG>_LOADER_PATH` or `<library path>/<tag>`, and that path is added
    /// to the loader's execution paths.
    pub fn register_loader(&mut self, mut loader: Box<dyn Loader>) -> PluginResult<()> {
        let tag = loader.tag().to_string();

        if self.manager.contains(&tag) {
            error!(target: LOG_TARGET, "Loader '{}' is already registered", tag);
            return Err(PluginError::AlreadyExists(tag));
        }

        let default_path = self
            .library_path()
            .ok_or_else(|| PluginError::InvalidState("loader host is destroyed".to_string()))?
            .join(&tag);

        let mut handles = PluginManager::new();
        handles.initialize(
            &tag,
            &format!("{}_LOADER_PATH", tag.to_ascii_uppercase()),
            default_path,
            None,
            None,
        )?;

        if let Some(path) = handles.library_path() {
            loader.execution_path(path.as_path())?;
        }

        let entry = LoaderEntry {
            loader,
            handles,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        self.manager.register(Plugin::new(tag.clone(), entry)?)?;
        info!(target: LOG_TARGET, "Registered loader: {}", tag);
        Ok(())
    }

    /// Tags of all registered loaders.
    pub fn loader_tags(&self) -> Vec<String> {
        self.manager.names()
    }

    pub fn has_loader(&self, tag: &str) -> bool {
        self.manager.contains(tag)
    }

    fn entry_mut(&mut self, tag: &str) -> PluginResult<&mut LoaderEntry> {
        self.manager
            .get_mut(tag)
            .and_then(|plugin| plugin.payload_mut::<LoaderEntry>())
            .ok_or_else(|| PluginError::NotFound(format!("loader '{}'", tag)))
    }

    fn entry(&self, tag: &str) -> Option<&LoaderEntry> {
        self.manager
            .get(tag)
            .and_then(|plugin| plugin.payload::<LoaderEntry>())
    }

    /// Add an execution path to a loader.
    pub fn execution_path(&mut self, tag: &str, path: &Path) -> PluginResult<()> {
        self.entry_mut(tag)?.loader.execution_path(path)
    }

    /// Load guest source held in memory.
    ///
    /// Returns the names of the exported functions.
    pub fn load_from_memory(
        &mut self,
        tag: &str,
        handle: &str,
        source: &str,
    ) -> PluginResult<Vec<String>> {
        self.load_with(tag, handle, |loader| loader.load_from_memory(handle, source))
    }

    /// Load a guest script from disk.
    ///
    /// Relative paths that do not exist are looked up in the loader's
    /// library path.
    pub fn load_from_file(&mut self, tag: &str, path: &Path) -> PluginResult<Vec<String>> {
        let resolved = if path.is_relative() && !path.exists() {
            self.entry(tag)
                .and_then(|entry| entry.handles.library_path())
                .and_then(|library_path| library_path.locate(path))
                .unwrap_or_else(|| path.to_path_buf())
        } else {
            path.to_path_buf()
        };

        let handle = handle_name(&resolved);
        self.load_with(tag, &handle, |loader| loader.load_from_file(&resolved))
    }

    fn load_with<F>(&mut self, tag: &str, handle: &str, load: F) -> PluginResult<Vec<String>>
    where
        F: FnOnce(&mut dyn Loader) -> PluginResult<Vec<Function>>,
    {
        let entry = self
            .manager
            .get_mut(tag)
            .and_then(|plugin| plugin.payload_mut::<LoaderEntry>())
            .ok_or_else(|| PluginError::NotFound(format!("loader '{}'", tag)))?;

        if entry.handles.contains(handle) {
            error!(target: LOG_TARGET, loader = tag, "Handle '{}' is already loaded", handle);
            return Err(PluginError::AlreadyExists(handle.to_string()));
        }

        let functions = load(entry.loader.as_mut())?;

        let mut table = HashMap::with_capacity(functions.len());
        let mut duplicate = None;
        for func in functions {
            let name = func.name().to_string();
            if self.index.contains_key(&name) || table.contains_key(&name) {
                duplicate = Some(name);
                break;
            }
            table.insert(name, Arc::new(func));
        }

        if let Some(name) = duplicate {
            error!(
                target: LOG_TARGET,
                loader = tag,
                "Function '{}' from handle '{}' is already defined", name, handle
            );
            drop(table);
            entry.loader.unload(handle)?;
            return Err(PluginError::AlreadyExists(name));
        }

        let mut names: Vec<String> = table.keys().cloned().collect();
        names.sort();

        entry
            .handles
            .register(Plugin::new(handle, LoadedHandle { functions: table })?)?;

        for name in &names {
            self.index
                .insert(name.clone(), (tag.to_string(), handle.to_string()));
        }

        info!(
            target: LOG_TARGET,
            loader = tag,
            "Loaded handle '{}' exporting {} functions",
            handle,
            names.len()
        );
        Ok(names)
    }

    /// Handles loaded by a loader.
    pub fn handles(&self, tag: &str) -> Vec<String> {
        self.entry(tag)
            .map(|entry| entry.handles.names())
            .unwrap_or_default()
    }

    /// Look a function up by name.
    pub fn function(&self, name: &str) -> Option<Arc<Function>> {
        let (tag, handle) = self.index.get(name)?;
        self.entry(tag)?
            .handles
            .get(handle)?
            .payload::<LoadedHandle>()?
            .functions
            .get(name)
            .cloned()
    }

    /// Names of every exported function.
    pub fn functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.keys().cloned().collect();
        names.sort();
        names
    }

    /// Call a function by name.
    pub fn call(&self, name: &str, args: Vec<Value>) -> PluginResult<Value> {
        let func = self
            .function(name)
            .ok_or_else(|| PluginError::NotFound(format!("function '{}'", name)))?;

        debug!(target: LOG_TARGET, "Calling {} with {} arguments", name, args.len());
        Ok(func.call(args)?)
    }

    /// Unload a script handle and drop its functions.
    ///
    /// Returns `false` if the handle was not loaded.
    pub fn clear_handle(&mut self, tag: &str, handle: &str) -> PluginResult<bool> {
        let entry = self
            .manager
            .get_mut(tag)
            .and_then(|plugin| plugin.payload_mut::<LoaderEntry>())
            .ok_or_else(|| PluginError::NotFound(format!("loader '{}'", tag)))?;

        let Some(plugin) = entry.handles.remove(handle)? else {
            return Ok(false);
        };

        if let Some(loaded) = plugin.payload::<LoadedHandle>() {
            for name in loaded.functions.keys() {
                self.index.remove(name);
            }
        }
        drop(plugin);

        entry.loader.unload(handle)?;
        info!(target: LOG_TARGET, loader = tag, "Cleared handle '{}'", handle);
        Ok(true)
    }

    /// Destroy every loader, newest first.
    pub fn destroy(&mut self) -> PluginResult<()> {
        self.index.clear();
        self.manager.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polycall_reflect::{FunctionInterface, Opaque, ReflectResult};
    use std::sync::Mutex;

    struct EchoInterface;

    impl FunctionInterface for EchoInterface {
        fn invoke(&self, _func: &Function, mut args: Vec<Value>) -> ReflectResult<Value> {
            Ok(if args.is_empty() { Value::Null } else { args.remove(0) })
        }
    }

    /// Source is a whitespace separated list of function names.
    struct ListLoader {
        tag: String,
        events: Arc<Mutex<Vec<String>>>,
        interface: Arc<EchoInterface>,
    }

    impl ListLoader {
        fn new(tag: &str, events: Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                tag: tag.to_string(),
                events,
                interface: Arc::new(EchoInterface),
            })
        }
    }

    impl Loader for ListLoader {
        fn tag(&self) -> &str {
            &self.tag
        }

        fn load_from_memory(&mut self, name: &str, source: &str) -> PluginResult<Vec<Function>> {
            self.events.lock().unwrap().push(format!("load {}:{}", self.tag, name));
            source
                .split_whitespace()
                .map(|f| {
                    Function::create(
                        f,
                        1,
                        Opaque::new(&self.tag, f.to_string()),
                        Some(self.interface.clone()),
                    )
                    .map_err(PluginError::from)
                })
                .collect()
        }

        fn unload(&mut self, name: &str) -> PluginResult<()> {
            self.events.lock().unwrap().push(format!("unload {}:{}", self.tag, name));
            Ok(())
        }

        fn destroy(&mut self) -> PluginResult<()> {
            self.events.lock().unwrap().push(format!("destroy {}", self.tag));
            Ok(())
        }
    }

    fn host() -> LoaderHost {
        LoaderHost::new(LoaderHostConfig {
            library_path_env: String::new(),
            default_library_path: PathBuf::from("/usr/local/lib/polycall"),
        })
        .unwrap()
    }

    #[test]
    fn test_load_and_call() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register_loader(ListLoader::new("list", events.clone())).unwrap();

        let names = host.load_from_memory("list", "script", "echo other").unwrap();
        assert_eq!(names, vec!["echo", "other"]);
        assert_eq!(host.functions(), vec!["echo", "other"]);
        assert_eq!(host.handles("list"), vec!["script"]);

        let result = host.call("echo", vec![Value::long(7)]).unwrap();
        assert_eq!(result, Value::long(7));

        assert!(matches!(
            host.call("missing", vec![]),
            Err(PluginError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_loader_and_handle() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register_loader(ListLoader::new("list", events.clone())).unwrap();

        assert!(matches!(
            host.register_loader(ListLoader::new("list", events.clone())),
            Err(PluginError::AlreadyExists(_))
        ));

        host.load_from_memory("list", "a", "f").unwrap();
        assert!(matches!(
            host.load_from_memory("list", "a", "g"),
            Err(PluginError::AlreadyExists(_))
        ));

        // Function names are unique across handles
        assert!(matches!(
            host.load_from_memory("list", "b", "f"),
            Err(PluginError::AlreadyExists(name)) if name == "f"
        ));
        assert_eq!(host.handles("list"), vec!["a"]);
        assert!(events.lock().unwrap().contains(&"unload list:b".to_string()));
    }

    #[test]
    fn test_unknown_loader() {
        let mut host = host();
        assert!(matches!(
            host.load_from_memory("nope", "a", "f"),
            Err(PluginError::NotFound(_))
        ));
    }

    #[test]
    fn test_clear_handle() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register_loader(ListLoader::new("list", events.clone())).unwrap();
        host.load_from_memory("list", "a", "f g").unwrap();

        assert!(host.clear_handle("list", "a").unwrap());
        assert!(host.function("f").is_none());
        assert!(host.functions().is_empty());
        assert!(!host.clear_handle("list", "a").unwrap());

        // The name can be reused once cleared
        host.load_from_memory("list", "a", "f").unwrap();
        assert!(host.function("f").is_some());
    }

    #[test]
    fn test_destroy_newest_loader_first() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register_loader(ListLoader::new("first", events.clone())).unwrap();
        host.register_loader(ListLoader::new("second", events.clone())).unwrap();
        host.load_from_memory("first", "a", "f").unwrap();

        host.destroy().unwrap();

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "load first:a".to_string(),
                "destroy second".to_string(),
                "unload first:a".to_string(),
                "destroy first".to_string(),
            ]
        );
        assert!(host.loader_tags().is_empty());
        assert!(matches!(host.destroy(), Err(PluginError::InvalidState(_))));
    }

    #[test]
    fn test_loader_handles_use_sub_path() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register_loader(ListLoader::new("list", events)).unwrap();

        let entry = host.entry("list").unwrap();
        assert_eq!(entry.handles.name(), Some("list"));
        assert!(entry.handles.library_path().is_some());
    }
}
