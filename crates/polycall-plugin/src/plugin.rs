//! Named plugin units.
//!
//! A plugin is nothing more than a name and a payload. What the payload is
//! depends on the manager holding it: a loader for the loader manager, a
//! loaded script handle for a loader's own manager, and so on.

use crate::error::{PluginError, PluginResult};
use std::any::Any;
use std::fmt;

/// A named unit owned by a [`PluginManager`](crate::PluginManager) once
/// registered.
pub struct Plugin {
    name: String,
    payload: Box<dyn Any + Send>,
}

impl Plugin {
    /// Create a plugin wrapping `payload`.
    pub fn new<T: Any + Send>(name: impl Into<String>, payload: T) -> PluginResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PluginError::EmptyName);
        }

        Ok(Self {
            name,
            payload: Box::new(payload),
        })
    }

    /// Get the plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the payload if it has type `T`.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Mutably borrow the payload if it has type `T`.
    pub fn payload_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.payload.downcast_mut::<T>()
    }

    /// Take the payload out, or get the plugin back if it has another type.
    pub fn into_payload<T: Any>(self) -> Result<T, Plugin> {
        let Plugin { name, payload } = self;
        match payload.downcast::<T>() {
            Ok(payload) => Ok(*payload),
            Err(payload) => Err(Plugin { name, payload }),
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
