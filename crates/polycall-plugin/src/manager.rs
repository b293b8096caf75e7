//! Named plugin registry with pluggable teardown.
//!
//! The same manager type hosts every kind of plugin: the loader manager
//! holds one plugin per guest language, and each loader can hold its own
//! manager for the scripts it has loaded.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --initialize--> Initialized --destroy--> Destroyed
//!                                    ^                       |
//!                                    +------initialize-------+
//! ```
//!
//! `initialize` only creates the resources that are missing, so calling it
//! again is harmless. `destroy` releases everything and leaves the manager
//! ready to be initialized again.
//!
//! The manager has no internal locking. All mutation goes through `&mut self`.

use crate::error::{PluginError, PluginResult};
use crate::path::LibraryPath;
use crate::plugin::Plugin;
use polycall_reflect::{Opaque, LOG_TARGET};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lifecycle hooks supplied by whoever creates a manager.
pub trait PluginManagerInterface: Send + Sync {
    /// Release one plugin during the default teardown sweep.
    ///
    /// The plugin has already left the registry when this runs and is
    /// dropped right after.
    fn teardown(&self, manager: &PluginManager, plugin: &mut Plugin) -> PluginResult<()> {
        let _ = (manager, plugin);
        Ok(())
    }

    /// Replace the default teardown sweep with a custom algorithm, for
    /// example a dependency-ordered shutdown.
    ///
    /// Return `None` to use the default sweep. Plugins still registered when
    /// a custom algorithm returns are dropped without their teardown hook.
    fn destroy(&self, manager: &mut PluginManager) -> Option<PluginResult<()>> {
        let _ = manager;
        None
    }
}

/// Manager lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Initialized,
    Destroyed,
}

/// Registry of plugins keyed by name.
#[derive(Default)]
pub struct PluginManager {
    name: Option<String>,
    library_path: Option<LibraryPath>,
    plugins: Option<HashMap<String, Plugin>>,
    interface: Option<Arc<dyn PluginManagerInterface>>,
    imp: Option<Opaque>,
    destroyed: bool,
}

impl PluginManager {
    /// Create an uninitialized manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the manager.
    ///
    /// The plugin set, the library path and the interface/impl pair are each
    /// created only when absent. The library path comes from `env_var`, or
    /// `default_path` when the variable is unset or empty, and does not
    /// change afterwards. If the path cannot be resolved the manager is torn
    /// down again.
    pub fn initialize(
        &mut self,
        name: &str,
        env_var: &str,
        default_path: impl AsRef<Path>,
        interface: Option<Arc<dyn PluginManagerInterface>>,
        imp: Option<Opaque>,
    ) -> PluginResult<()> {
        if self.name.is_none() {
            self.name = Some(name.to_string());
        }

        if self.interface.is_none() {
            self.interface = interface;
        }

        if self.imp.is_none() {
            self.imp = imp;
        }

        if self.plugins.is_none() {
            self.plugins = Some(HashMap::new());
        }

        if self.library_path.is_none() {
            match LibraryPath::from_env(env_var, default_path) {
                Ok(path) => self.library_path = Some(path),
                Err(e) => {
                    error!(
                        target: LOG_TARGET,
                        manager = name,
                        "Invalid plugin manager library path initialization: {}", e
                    );
                    if let Err(teardown) = self.destroy() {
                        error!(target: LOG_TARGET, manager = name, "{}", teardown);
                    }
                    return Err(e);
                }
            }
        }

        self.destroyed = false;

        info!(
            target: LOG_TARGET,
            manager = name,
            "Plugin manager initialized with library path {}",
            self.library_path
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default()
        );

        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        if self.plugins.is_some() {
            ManagerState::Initialized
        } else if self.destroyed {
            ManagerState::Destroyed
        } else {
            ManagerState::Uninitialized
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == ManagerState::Initialized
    }

    /// Kind of plugins this manager holds, e.g. `"loader"`.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn library_path(&self) -> Option<&LibraryPath> {
        self.library_path.as_ref()
    }

    /// Handle supplied by the creator of the manager.
    pub fn imp(&self) -> Option<&Opaque> {
        self.imp.as_ref()
    }

    fn plugins_mut(&mut self) -> PluginResult<&mut HashMap<String, Plugin>> {
        let name = self.name.clone().unwrap_or_default();
        self.plugins
            .as_mut()
            .ok_or_else(|| PluginError::InvalidState(format!("manager '{}' is not initialized", name)))
    }

    /// Register a plugin under its name.
    ///
    /// Fails with [`PluginError::AlreadyExists`] if the name is taken; the
    /// registry is left unchanged and the rejected plugin is dropped.
    pub fn register(&mut self, plugin: Plugin) -> PluginResult<()> {
        let manager = self.name.clone().unwrap_or_default();
        let plugins = self.plugins_mut()?;
        let name = plugin.name().to_string();

        if plugins.contains_key(&name) {
            error!(
                target: LOG_TARGET,
                manager = %manager,
                "Plugin '{}' is already registered", name
            );
            return Err(PluginError::AlreadyExists(name));
        }

        plugins.insert(name.clone(), plugin);
        debug!(target: LOG_TARGET, manager = %manager, "Registered plugin: {}", name);
        Ok(())
    }

    /// Get a plugin by name.
    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.as_ref()?.get(name)
    }

    /// Get a plugin by name for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Plugin> {
        self.plugins.as_mut()?.get_mut(name)
    }

    /// Check if a plugin is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all registered plugins.
    pub fn names(&self) -> Vec<String> {
        self.plugins
            .as_ref()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Visit every registered plugin exactly once, in no particular order.
    ///
    /// The visitor's return value is advisory: iteration always covers the
    /// whole registry. Returns how many visits returned `true`, so callers
    /// can apply their own stop or match policy.
    pub fn iterate<F>(&self, mut visitor: F) -> usize
    where
        F: FnMut(&PluginManager, &Plugin) -> bool,
    {
        let Some(plugins) = self.plugins.as_ref() else {
            return 0;
        };

        plugins
            .values()
            .filter(|plugin| visitor(self, plugin))
            .count()
    }

    /// Remove a plugin from the registry and hand it back.
    ///
    /// Removing an absent plugin is a no-op returning `Ok(None)`. No teardown
    /// hook runs: the caller owns the returned plugin.
    pub fn remove(&mut self, name: &str) -> PluginResult<Option<Plugin>> {
        let plugin = self.plugins_mut()?.remove(name);
        if plugin.is_some() {
            debug!(target: LOG_TARGET, "Removed plugin: {}", name);
        }
        Ok(plugin)
    }

    /// Tear the manager down.
    ///
    /// Runs the interface's custom destroy algorithm when it has one,
    /// otherwise sweeps every plugin through the interface's teardown hook.
    /// Afterwards the plugin set, library path, interface and impl are
    /// released. The first teardown error is returned, but the manager is
    /// released regardless.
    ///
    /// Destroying a manager that is not initialized changes nothing and
    /// returns [`PluginError::InvalidState`].
    pub fn destroy(&mut self) -> PluginResult<()> {
        if self.plugins.is_none() {
            return Err(PluginError::InvalidState(match self.state() {
                ManagerState::Destroyed => "plugin manager already destroyed".to_string(),
                _ => "plugin manager is not initialized".to_string(),
            }));
        }

        let result = match self.interface.clone() {
            Some(interface) => match interface.destroy(self) {
                Some(result) => result,
                None => self.sweep(Some(interface.as_ref())),
            },
            None => self.sweep(None),
        };

        if let Some(name) = &self.name {
            info!(target: LOG_TARGET, manager = %name, "Plugin manager destroyed");
        }

        self.plugins = None;
        self.library_path = None;
        self.interface = None;
        self.imp = None;
        self.name = None;
        self.destroyed = true;

        result
    }

    fn sweep(&mut self, interface: Option<&dyn PluginManagerInterface>) -> PluginResult<()> {
        let Some(plugins) = self.plugins.as_mut().map(std::mem::take) else {
            return Ok(());
        };

        let mut first_error = None;

        for (name, mut plugin) in plugins {
            if let Some(interface) = interface {
                if let Err(e) = interface.teardown(self, &mut plugin) {
                    error!(target: LOG_TARGET, "Failed to tear down plugin '{}': {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
            drop(plugin);
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        if self.plugins.is_some() {
            if let Err(e) = self.destroy() {
                error!(target: LOG_TARGET, "Plugin manager teardown on drop failed: {}", e);
            }
        }
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("name", &self.name)
            .field("library_path", &self.library_path)
            .field("plugins", &self.names())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
