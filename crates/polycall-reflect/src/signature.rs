//! Function signatures.
//!
//! A signature has a fixed number of parameter slots decided when the
//! function is created. Names and types start out unset, which is the normal
//! state for dynamically typed guest languages.

use crate::error::{ReflectError, ReflectResult};
use crate::types::Type;
use crate::LOG_TARGET;
use std::fmt;
use tracing::debug;

/// A single parameter slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name, if the guest exposes one.
    pub name: Option<String>,

    /// Declared type, `None` when dynamic.
    pub ty: Option<Type>,
}

/// Ordered parameter list plus a return type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Parameter>,
    ret: Option<Type>,
}

impl Signature {
    /// Create a signature with `count` untyped, unnamed parameters.
    pub fn new(count: usize) -> Self {
        Self {
            params: vec![Parameter::default(); count],
            ret: None,
        }
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Get the parameter at `index`.
    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    /// Set the name and type of the parameter at `index`.
    pub fn set(
        &mut self,
        index: usize,
        name: impl Into<String>,
        ty: Option<Type>,
    ) -> ReflectResult<()> {
        let len = self.params.len();
        let param = self
            .params
            .get_mut(index)
            .ok_or(ReflectError::IndexOutOfRange { index, len })?;

        param.name = Some(name.into());
        param.ty = ty;
        Ok(())
    }

    /// Set the return type.
    pub fn set_return(&mut self, ty: Option<Type>) {
        self.ret = ty;
    }

    pub fn return_type(&self) -> Option<Type> {
        self.ret
    }

    /// Find a parameter position by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.params
            .iter()
            .position(|p| p.name.as_deref() == Some(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Log the signature at debug level.
    pub fn print(&self) {
        debug!(target: LOG_TARGET, "Signature {}", self);
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match &param.name {
                Some(name) => f.write_str(name)?,
                None => write!(f, "_{}", index)?,
            }
            match param.ty {
                Some(ty) => write!(f, ": {}", ty)?,
                None => f.write_str(": <dynamic>")?,
            }
        }
        f.write_str(") -> ")?;
        match self.ret {
            Some(ty) => write!(f, "{}", ty),
            None => f.write_str("<dynamic>"),
        }
    }
}
