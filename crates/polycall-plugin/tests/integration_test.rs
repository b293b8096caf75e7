//! Integration tests for polycall-plugin.
//!
//! These tests cover:
//! - Loading scripts from disk through the loader host
//! - Relative script lookup in a loader's library path
//! - Loader discovery from manifests
//! - Function lifetime across handle clearing and host teardown

use polycall_plugin::{
    InstalledLoader, Loader, LoaderHost, LoaderHostConfig, PluginError, PluginResult,
};
use polycall_reflect::{
    Function, FunctionInterface, Opaque, ReflectError, ReflectResult, Type, Value,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ==============================================================================
// Test Fixture Helpers
// ==============================================================================

/// Counts destroy hooks and returns the number of arguments from invoke.
///
/// Stops invoking and counting once its loader is destroyed.
struct CountingInterface {
    destroyed: AtomicUsize,
    loader_alive: AtomicBool,
}

impl Default for CountingInterface {
    fn default() -> Self {
        Self {
            destroyed: AtomicUsize::new(0),
            loader_alive: AtomicBool::new(true),
        }
    }
}

impl FunctionInterface for CountingInterface {
    fn invoke(&self, func: &Function, args: Vec<Value>) -> ReflectResult<Value> {
        if !self.loader_alive.load(Ordering::SeqCst) {
            return Err(ReflectError::NotInvocable(func.name().to_string()));
        }
        Ok(Value::long(args.len() as i64))
    }

    fn destroy(&self, _func: &Function) {
        if self.loader_alive.load(Ordering::SeqCst) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Guest source: one `name arity` pair per line.
struct LineLoader {
    interface: Arc<CountingInterface>,
}

impl Loader for LineLoader {
    fn tag(&self) -> &str {
        "line"
    }

    fn load_from_memory(&mut self, name: &str, source: &str) -> PluginResult<Vec<Function>> {
        source
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| -> PluginResult<Function> {
                let mut parts = line.split_whitespace();
                let fname = parts.next().unwrap_or_default();
                let arity = parts
                    .next()
                    .and_then(|a| a.parse().ok())
                    .ok_or_else(|| PluginError::Load(format!("{}: bad line '{}'", name, line)))?;

                let mut func = Function::create(
                    fname,
                    arity,
                    Opaque::new("line", fname.to_string()),
                    Some(self.interface.clone()),
                )?;
                for i in 0..arity {
                    func.signature_mut()
                        .set(i, format!("arg{}", i), Some(Type::Long))?;
                }
                Ok(func)
            })
            .collect()
    }

    fn destroy(&mut self) -> PluginResult<()> {
        self.interface.loader_alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn host_in(dir: &Path) -> LoaderHost {
    LoaderHost::new(LoaderHostConfig {
        library_path_env: String::new(),
        default_library_path: dir.to_path_buf(),
    })
    .unwrap()
}

fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ==============================================================================
// Loading
// ==============================================================================

#[test]
fn test_load_script_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let interface = Arc::new(CountingInterface::default());
    let mut host = host_in(temp_dir.path());
    host.register_loader(Box::new(LineLoader {
        interface: interface.clone(),
    }))
    .unwrap();

    let script = write_script(temp_dir.path(), "math.txt", "add 2\nneg 1\n");
    let names = host.load_from_file("line", &script).unwrap();

    assert_eq!(names, vec!["add", "neg"]);
    assert_eq!(host.handles("line"), vec!["math"]);

    let add = host.function("add").unwrap();
    assert_eq!(add.args_count(), 2);
    assert_eq!(add.signature().to_string(), "(arg0: Long, arg1: Long) -> <dynamic>");

    let result = host
        .call("add", vec![Value::long(1), Value::long(2)])
        .unwrap();
    assert_eq!(result, Value::long(2));
}

#[test]
fn test_relative_script_uses_loader_library_path() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = host_in(temp_dir.path());
    host.register_loader(Box::new(LineLoader {
        interface: Arc::default(),
    }))
    .unwrap();

    write_script(&temp_dir.path().join("line"), "strings.txt", "upper 1\n");

    let names = host.load_from_file("line", Path::new("strings.txt")).unwrap();
    assert_eq!(names, vec!["upper"]);
}

#[test]
fn test_missing_script_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = host_in(temp_dir.path());
    host.register_loader(Box::new(LineLoader {
        interface: Arc::default(),
    }))
    .unwrap();

    let result = host.load_from_file("line", Path::new("missing.txt"));
    assert!(matches!(result, Err(PluginError::Io(_))));
    assert!(host.handles("line").is_empty());
}

#[test]
fn test_load_error_leaves_host_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = host_in(temp_dir.path());
    host.register_loader(Box::new(LineLoader {
        interface: Arc::default(),
    }))
    .unwrap();

    let result = host.load_from_memory("line", "broken", "add two");
    assert!(matches!(result, Err(PluginError::Load(_))));
    assert!(host.functions().is_empty());
    assert!(host.handles("line").is_empty());
}

// ==============================================================================
// Lifetime
// ==============================================================================

#[test]
fn test_clear_handle_destroys_functions() {
    let temp_dir = TempDir::new().unwrap();
    let interface = Arc::new(CountingInterface::default());
    let mut host = host_in(temp_dir.path());
    host.register_loader(Box::new(LineLoader {
        interface: interface.clone(),
    }))
    .unwrap();

    host.load_from_memory("line", "a", "f 0\ng 0").unwrap();
    assert!(host.clear_handle("line", "a").unwrap());

    assert_eq!(interface.destroyed.load(Ordering::SeqCst), 2);
    assert!(matches!(host.call("f", vec![]), Err(PluginError::NotFound(_))));
}

#[test]
fn test_held_function_survives_clear_handle() {
    let temp_dir = TempDir::new().unwrap();
    let interface = Arc::new(CountingInterface::default());
    let mut host = host_in(temp_dir.path());
    host.register_loader(Box::new(LineLoader {
        interface: interface.clone(),
    }))
    .unwrap();

    host.load_from_memory("line", "a", "f 1").unwrap();
    let f = host.function("f").unwrap();
    assert!(host.clear_handle("line", "a").unwrap());

    // The loader is still alive, so the held function keeps working
    assert_eq!(f.call(vec![Value::null()]).unwrap(), Value::long(1));
    assert_eq!(interface.destroyed.load(Ordering::SeqCst), 0);

    drop(f);
    assert_eq!(interface.destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_held_function_is_not_invocable_after_destroy() {
    let temp_dir = TempDir::new().unwrap();
    let interface = Arc::new(CountingInterface::default());
    let mut host = host_in(temp_dir.path());
    host.register_loader(Box::new(LineLoader {
        interface: interface.clone(),
    }))
    .unwrap();

    host.load_from_memory("line", "a", "f 1").unwrap();
    let f = host.function("f").unwrap();
    let as_value = Value::function(f.clone());

    host.destroy().unwrap();
    assert_eq!(interface.destroyed.load(Ordering::SeqCst), 0);

    assert!(matches!(
        as_value.as_function().unwrap().call(vec![Value::null()]),
        Err(ReflectError::NotInvocable(_))
    ));

    // The destroy hook does no loader work once the loader is gone
    drop(as_value);
    drop(f);
    assert_eq!(interface.destroyed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_drop_destroys_loaders() {
    let temp_dir = TempDir::new().unwrap();
    let interface = Arc::new(CountingInterface::default());
    {
        let mut host = host_in(temp_dir.path());
        host.register_loader(Box::new(LineLoader {
            interface: interface.clone(),
        }))
        .unwrap();
        host.load_from_memory("line", "a", "f 0\ng 0\nh 0").unwrap();
    }

    assert_eq!(interface.destroyed.load(Ordering::SeqCst), 3);
}

// ==============================================================================
// Discovery
// ==============================================================================

#[test]
fn test_discover_installed_loaders() {
    let temp_dir = TempDir::new().unwrap();
    let loader_dir = temp_dir.path().join("line");
    write_script(
        &loader_dir,
        "manifest.toml",
        r#"
[loader]
tag = "line"
name = "Line Loader"
version = "1.2.0"
extensions = ["txt"]
"#,
    );
    write_script(&temp_dir.path().join("broken"), "manifest.toml", "[loader]\n");
    write_script(
        &temp_dir.path().join("misplaced"),
        "manifest.toml",
        "[loader]\ntag = \"other\"\nname = \"Other\"\nversion = \"0.1.0\"\n",
    );

    let host = host_in(temp_dir.path());
    let loaders = host.discover().unwrap();

    assert_eq!(loaders.len(), 1);
    assert_eq!(loaders[0].tag(), "line");
    assert_eq!(loaders[0].version(), "1.2.0");
    assert!(loaders[0].accepts(Path::new("math.txt")));
    assert!(!loaders[0].has_library());

    let single = InstalledLoader::read(&loader_dir).unwrap();
    assert_eq!(single.tag(), "line");
    assert_eq!(single.dir(), loader_dir);
}

#[test]
fn test_library_path_from_environment() {
    let temp_dir = TempDir::new().unwrap();
    std::env::set_var("POLYCALL_TEST_LIBRARY_PATH", temp_dir.path());

    let host = LoaderHost::new(LoaderHostConfig {
        library_path_env: "POLYCALL_TEST_LIBRARY_PATH".to_string(),
        default_library_path: PathBuf::from("/nonexistent"),
    })
    .unwrap();

    assert_eq!(host.library_path().unwrap().as_path(), temp_dir.path());
    std::env::remove_var("POLYCALL_TEST_LIBRARY_PATH");
}
