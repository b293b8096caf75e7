//! The contract every guest-language loader implements.

use crate::error::PluginResult;
use polycall_reflect::Function;
use std::path::Path;

/// A guest-language loader.
///
/// A loader turns guest source into [`Function`]s whose
/// [`FunctionInterface`](polycall_reflect::FunctionInterface) dispatches back
/// into the guest runtime. Only `tag` and `load_from_memory` are required.
pub trait Loader: Send {
    /// Tag identifying the guest language, e.g. `py` or `node`.
    fn tag(&self) -> &str;

    /// Add a directory scripts are resolved against.
    fn execution_path(&mut self, path: &Path) -> PluginResult<()> {
        let _ = path;
        Ok(())
    }

    /// Load guest source held in memory as the handle `name`.
    fn load_from_memory(&mut self, name: &str, source: &str) -> PluginResult<Vec<Function>>;

    /// Load a guest script from disk.
    ///
    /// The default reads the file and loads it from memory, using the file
    /// stem as the handle name.
    fn load_from_file(&mut self, path: &Path) -> PluginResult<Vec<Function>> {
        let source = std::fs::read_to_string(path)?;
        let name = handle_name(path);
        self.load_from_memory(&name, &source)
    }

    /// Release loader-side state of a handle that is being cleared.
    fn unload(&mut self, name: &str) -> PluginResult<()> {
        let _ = name;
        Ok(())
    }

    /// Shut the guest runtime down.
    ///
    /// Functions created by this loader may still be held by callers. After
    /// destroy their interface must refuse to invoke with `NotInvocable` and
    /// its destroy hook must not touch the guest runtime.
    fn destroy(&mut self) -> PluginResult<()> {
        Ok(())
    }
}

/// Handle name used for a script file: its stem, or the whole path when it
/// has none.
pub fn handle_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_name() {
        assert_eq!(handle_name(Path::new("/scripts/sum.toml")), "sum");
        assert_eq!(handle_name(Path::new("script")), "script");
    }
}
