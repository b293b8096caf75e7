//! Error types for values, signatures and functions.

use crate::types::Type;
use crate::value::Value;
use thiserror::Error;

/// Errors that can occur while building or using reflected objects.
#[derive(Error, Debug)]
pub enum ReflectError {
    /// A function was created with an empty name.
    #[error("Function name must not be empty")]
    EmptyName,

    /// A typed accessor was used on a value of another tag.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Type, found: Type },

    /// The (source, target) pair has no defined conversion.
    #[error("Invalid cast from {from} to {to}")]
    InvalidCast { from: Type, to: Type },

    /// A signature slot outside of the declared arity was addressed.
    #[error("Parameter index {index} out of range (arity {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The function has no interface or its interface cannot invoke.
    #[error("Function is not invocable: {0}")]
    NotInvocable(String),

    /// The loader's create hook rejected the function.
    #[error("Function ({name}) create callback failed: {reason}")]
    InterfaceCreate { name: String, reason: String },

    /// The guest runtime failed while running a call.
    #[error("Invocation error: {0}")]
    Invocation(String),
}

/// Result type for reflection operations.
pub type ReflectResult<T> = std::result::Result<T, ReflectError>;

/// A failed cast.
///
/// The value that was being cast travels back with the error so the caller
/// decides its fate.
#[derive(Error, Debug)]
#[error("Invalid cast from {from} to {to}")]
pub struct CastError {
    from: Type,
    to: Type,
    value: Box<Value>,
}

impl CastError {
    pub(crate) fn new(value: Value, to: Type) -> Self {
        Self {
            from: value.ty(),
            to,
            value: Box::new(value),
        }
    }

    /// Tag of the value that failed to cast.
    pub fn from_type(&self) -> Type {
        self.from
    }

    /// Requested target tag.
    pub fn to_type(&self) -> Type {
        self.to
    }

    /// Borrow the original value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Recover the original, unmodified value.
    pub fn into_value(self) -> Value {
        *self.value
    }
}

impl From<CastError> for ReflectError {
    fn from(err: CastError) -> Self {
        ReflectError::InvalidCast {
            from: err.from,
            to: err.to,
        }
    }
}
