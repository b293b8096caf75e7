//! # loader-mock
//!
//! A mock loader for testing and development.
//!
//! The guest "language" is a TOML description of functions with a fixed set
//! of built-in bodies. No real interpreter is embedded, but calls go through
//! the same [`FunctionInterface`] seam a real loader uses, and asynchronous
//! bodies are scheduled on the loader's own tokio runtime, which plays the
//! part of a foreign event loop.
//!
//! ```toml
//! [[function]]
//! name = "sum"
//! params = [{ name = "a", type = "Long" }, { name = "b", type = "Long" }]
//! returns = "Long"
//! body = "sum"
//!
//! [[function]]
//! name = "later"
//! params = [{ name = "value" }]
//! body = "sleep"
//! delay_ms = 50
//! ```

use polycall_plugin::loader::handle_name;
use polycall_plugin::{Loader, PluginError, PluginResult};
use polycall_reflect::{
    CreatePolicy, Exception, Function, FunctionInterface, Future, Opaque, ReflectError,
    ReflectResult, Type, Value, LOG_TARGET,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};

/// Tag of the mock loader.
pub const TAG: &str = "mock";

/// Exception label used by the `fail` and `throw` bodies.
pub const MOCK_ERROR: &str = "MockError";

/// Built-in function bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    /// Return the first argument, or null.
    Echo,
    /// Sum every argument as a long, wrapping on overflow.
    Sum,
    /// Concatenate every argument as a string.
    Concat,
    /// Return an exception value.
    Fail,
    /// Resolve a future with the first argument after `delay_ms`.
    Sleep,
    /// Reject a future after `delay_ms`.
    Throw,
}

/// A parameter declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamDecl {
    pub name: String,

    /// Declared type; arguments are cast to it before the body runs.
    #[serde(rename = "type", default)]
    pub ty: Option<Type>,
}

/// A function declaration, kept as the function's impl handle.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDecl {
    pub name: String,

    #[serde(default)]
    pub params: Vec<ParamDecl>,

    /// Declared return type of synchronous bodies.
    #[serde(default)]
    pub returns: Option<Type>,

    pub body: Body,

    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default, rename = "function")]
    functions: Vec<FunctionDecl>,
}

/// Function interface shared by every function of one mock loader.
///
/// Functions can outlive the loader through `Arc<Function>` clones, so the
/// interface refuses to invoke once the loader is destroyed.
struct MockInterface {
    runtime: Handle,
    alive: AtomicBool,
}

impl MockInterface {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }


    fn decl<'a>(func: &'a Function) -> ReflectResult<&'a FunctionDecl> {
        func.imp()
            .downcast_ref::<FunctionDecl>()
            .ok_or_else(|| ReflectError::NotInvocable(func.name().to_string()))
    }

    /// Settle a future on the loader runtime after `delay_ms`.
    fn schedule(&self, delay_ms: u64, outcome: Result<Value, Value>) -> Value {
        let (future, resolver) = Future::pending();

        self.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            match outcome {
                Ok(value) => resolver.resolve(value),
                Err(reason) => resolver.reject(reason),
            }
        });

        Value::future(future)
    }
}

fn first(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or_default()
}

fn mock_exception(func: &Function) -> Value {
    Value::exception(
        Exception::new(format!("{} failed", func.name()), MOCK_ERROR).with_code(1),
    )
}

impl FunctionInterface for MockInterface {
    fn create(&self, func: &mut Function) -> ReflectResult<()> {
        let decl = Self::decl(func)?.clone();

        for (index, param) in decl.params.iter().enumerate() {
            if func.signature().position(&param.name).is_some() {
                return Err(ReflectError::InterfaceCreate {
                    name: decl.name.clone(),
                    reason: format!("duplicate parameter '{}'", param.name),
                });
            }
            func.signature_mut()
                .set(index, param.name.clone(), param.ty)?;
        }
        func.signature_mut().set_return(decl.returns);

        Ok(())
    }

    fn invoke(&self, func: &Function, args: Vec<Value>) -> ReflectResult<Value> {
        if !self.is_alive() {
            return Err(ReflectError::NotInvocable(format!(
                "{} (mock loader destroyed)",
                func.name()
            )));
        }

        let decl = Self::decl(func)?;

        let expected = func.args_count();
        if args.len() != expected {
            return Err(ReflectError::Invocation(format!(
                "{} expects {} arguments, got {}",
                func.name(),
                expected,
                args.len()
            )));
        }

        let args = func
            .signature()
            .iter()
            .zip(args)
            .map(|(param, arg)| match param.ty {
                Some(ty) => arg.cast(ty).map_err(ReflectError::from),
                None => Ok(arg),
            })
            .collect::<ReflectResult<Vec<_>>>()?;

        debug!(target: LOG_TARGET, loader = TAG, "Invoking {} ({:?})", func.name(), decl.body);

        let result = match decl.body {
            Body::Echo => first(args),
            Body::Sum => {
                let mut total = 0i64;
                for arg in args {
                    total = total.wrapping_add(arg.cast(Type::Long)?.to_long()?);
                }
                Value::long(total)
            }
            Body::Concat => {
                let mut out = String::new();
                for arg in args {
                    out.push_str(&arg.cast(Type::String)?.into_string()?);
                }
                Value::string(out)
            }
            Body::Fail => return Ok(mock_exception(func)),
            Body::Sleep => return Ok(self.schedule(decl.delay_ms, Ok(first(args)))),
            Body::Throw => return Ok(self.schedule(decl.delay_ms, Err(mock_exception(func)))),
        };

        match func.signature().return_type() {
            Some(ty) => Ok(result.cast(ty)?),
            None => Ok(result),
        }
    }

    fn destroy(&self, func: &Function) {
        if self.is_alive() {
            debug!(target: LOG_TARGET, loader = TAG, "Destroying function {}", func.name());
        }
    }
}

/// The mock loader.
pub struct MockLoader {
    runtime: Option<Runtime>,
    interface: Arc<MockInterface>,
    policy: CreatePolicy,
    paths: Vec<PathBuf>,
    handles: HashMap<String, Vec<String>>,
}

impl MockLoader {
    /// Create a mock loader with the lenient create policy.
    pub fn new() -> PluginResult<Self> {
        Self::with_policy(CreatePolicy::default())
    }

    /// Create a mock loader that builds functions with `policy`.
    pub fn with_policy(policy: CreatePolicy) -> PluginResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("polycall-mock")
            .enable_time()
            .build()?;

        let interface = Arc::new(MockInterface {
            runtime: runtime.handle().clone(),
            alive: AtomicBool::new(true),
        });

        Ok(Self {
            runtime: Some(runtime),
            interface,
            policy,
            paths: Vec::new(),
            handles: HashMap::new(),
        })
    }

    /// Execution paths scripts are resolved against.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Names of the loaded handles.
    pub fn handles(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.keys().cloned().collect();
        names.sort();
        names
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }

        self.paths
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| path.to_path_buf())
    }
}

impl Loader for MockLoader {
    fn tag(&self) -> &str {
        TAG
    }

    fn execution_path(&mut self, path: &Path) -> PluginResult<()> {
        if !self.paths.iter().any(|p| p == path) {
            debug!(target: LOG_TARGET, loader = TAG, "Execution path added: {:?}", path);
            self.paths.push(path.to_path_buf());
        }
        Ok(())
    }

    fn load_from_memory(&mut self, name: &str, source: &str) -> PluginResult<Vec<Function>> {
        if self.runtime.is_none() {
            return Err(PluginError::InvalidState("mock loader is destroyed".to_string()));
        }

        let script: Script =
            toml::from_str(source).map_err(|e| PluginError::Load(format!("{}: {}", name, e)))?;

        let mut seen = HashSet::new();
        let mut functions = Vec::with_capacity(script.functions.len());

        for decl in script.functions {
            if !seen.insert(decl.name.clone()) {
                return Err(PluginError::Load(format!(
                    "{}: function '{}' is declared twice",
                    name, decl.name
                )));
            }

            let func = Function::create_with_policy(
                decl.name.clone(),
                decl.params.len(),
                Opaque::new(TAG, decl),
                Some(self.interface.clone()),
                self.policy,
            )?;
            functions.push(func);
        }

        let names = functions.iter().map(|f| f.name().to_string()).collect();
        self.handles.insert(name.to_string(), names);

        info!(
            target: LOG_TARGET,
            loader = TAG,
            "Loaded {} functions from '{}'",
            functions.len(),
            name
        );
        Ok(functions)
    }

    fn load_from_file(&mut self, path: &Path) -> PluginResult<Vec<Function>> {
        let resolved = self.resolve(path);
        let source = std::fs::read_to_string(&resolved)?;
        self.load_from_memory(&handle_name(&resolved), &source)
    }

    fn unload(&mut self, name: &str) -> PluginResult<()> {
        if self.handles.remove(name).is_none() {
            warn!(target: LOG_TARGET, loader = TAG, "Unloading unknown handle '{}'", name);
        }
        Ok(())
    }

    fn destroy(&mut self) -> PluginResult<()> {
        let runtime = self
            .runtime
            .take()
            .ok_or_else(|| PluginError::InvalidState("mock loader already destroyed".to_string()))?;

        self.interface.alive.store(false, Ordering::Release);

        // Pending futures are dropped with their tasks and reject as abandoned
        runtime.shutdown_background();
        self.handles.clear();

        info!(target: LOG_TARGET, loader = TAG, "Mock loader runtime shut down");
        Ok(())
    }
}

impl Drop for MockLoader {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            self.interface.alive.store(false, Ordering::Release);
            runtime.shutdown_background();
        }
    }
}
