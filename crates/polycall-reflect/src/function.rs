//! Guest callables behind a uniform interface.
//!
//! A [`Function`] pairs an opaque guest callable with a [`Signature`] and the
//! [`FunctionInterface`] of the loader that created it. The interface is the
//! only dispatch seam between the core and a guest runtime: the core never
//! looks inside the callable handle.

use crate::error::{ReflectError, ReflectResult};
use crate::signature::Signature;
use crate::value::{Opaque, Value};
use crate::LOG_TARGET;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Hooks a loader provides for the functions it creates.
///
/// One instance exists per loader kind and is shared by every function that
/// loader produces. Every hook is optional; the defaults describe a loader
/// that does nothing on create/destroy and cannot invoke.
pub trait FunctionInterface: Send + Sync {
    /// Called once right after construction. May fill in the signature.
    fn create(&self, func: &mut Function) -> ReflectResult<()> {
        let _ = func;
        Ok(())
    }

    /// Run the guest callable.
    ///
    /// Implementations may block, schedule the call on a foreign event loop,
    /// or return a [`Value::Future`] that settles later.
    fn invoke(&self, func: &Function, args: Vec<Value>) -> ReflectResult<Value> {
        let _ = args;
        Err(ReflectError::NotInvocable(func.name().to_string()))
    }

    /// Called once when the function is destroyed, before its signature and
    /// name are released.
    fn destroy(&self, func: &Function) {
        let _ = func;
    }
}

/// What to do when a loader's create hook fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatePolicy {
    /// Log the failure and keep the function.
    #[default]
    Lenient,
    /// Destroy the function and report the failure.
    Strict,
}

/// A callable exposed by a loader.
pub struct Function {
    name: String,
    signature: Signature,
    imp: Opaque,
    interface: Option<Arc<dyn FunctionInterface>>,
}

impl Function {
    /// Create a function using the lenient create policy.
    pub fn create(
        name: impl Into<String>,
        args_count: usize,
        imp: Opaque,
        interface: Option<Arc<dyn FunctionInterface>>,
    ) -> ReflectResult<Self> {
        Self::create_with_policy(name, args_count, imp, interface, CreatePolicy::default())
    }

    /// Create a function.
    ///
    /// The signature gets `args_count` untyped slots, then the interface's
    /// create hook runs. Under [`CreatePolicy::Strict`] a failing hook
    /// destroys the function (running the destroy hook) and returns
    /// [`ReflectError::InterfaceCreate`].
    pub fn create_with_policy(
        name: impl Into<String>,
        args_count: usize,
        imp: Opaque,
        interface: Option<Arc<dyn FunctionInterface>>,
        policy: CreatePolicy,
    ) -> ReflectResult<Self> {
        let name = name.into();

        if name.is_empty() {
            error!(target: LOG_TARGET, "Invalid function name allocation <empty>");
            return Err(ReflectError::EmptyName);
        }

        let mut func = Self {
            name,
            signature: Signature::new(args_count),
            imp,
            interface,
        };

        if let Some(interface) = func.interface.clone() {
            if let Err(e) = interface.create(&mut func) {
                error!(
                    target: LOG_TARGET,
                    function = %func.name,
                    "Invalid function create callback: {}", e
                );

                if policy == CreatePolicy::Strict {
                    return Err(ReflectError::InterfaceCreate {
                        name: func.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(func)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn signature_mut(&mut self) -> &mut Signature {
        &mut self.signature
    }

    /// Number of parameters.
    pub fn args_count(&self) -> usize {
        self.signature.len()
    }

    /// The loader-owned callable handle.
    pub fn imp(&self) -> &Opaque {
        &self.imp
    }

    /// Whether an interface is attached.
    pub fn has_interface(&self) -> bool {
        self.interface.is_some()
    }

    /// Invoke the function through its interface.
    pub fn call(&self, args: Vec<Value>) -> ReflectResult<Value> {
        match &self.interface {
            Some(interface) => interface.invoke(self, args),
            None => Err(ReflectError::NotInvocable(self.name.clone())),
        }
    }

    /// Log the function and its signature at debug level.
    pub fn print(&self) {
        debug!(
            target: LOG_TARGET,
            "Function <{}> Impl ({:?}) Interface ({})",
            self.name,
            self.imp,
            if self.interface.is_some() { "set" } else { "none" }
        );

        self.signature.print();
    }

    /// Destroy the function now instead of at the end of its scope.
    pub fn destroy(self) {}

    fn release(&mut self) {
        if let Some(interface) = self.interface.take() {
            interface.destroy(self);
        }
    }
}

impl Drop for Function {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("imp", &self.imp)
            .field("interface", &self.interface.is_some())
            .finish()
    }
}
