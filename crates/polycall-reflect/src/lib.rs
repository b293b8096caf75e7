//! # polycall-reflect
//!
//! Language-agnostic reflection layer for the polycall runtime.
//!
//! This crate provides:
//! - [`Value`]: the tagged container for every datum crossing a language
//!   boundary, with a deterministic casting matrix
//! - [`Signature`]: parameter names/types and a return type
//! - [`Function`]: an opaque guest callable behind a loader-supplied
//!   [`FunctionInterface`]
//! - [`Future`]: the cross-thread handoff for asynchronous foreign calls
//!
//! ## Threading
//!
//! Values, signatures and functions carry no internal locking. Mutation
//! requires exclusive access (`&mut`), so sharing one object between threads
//! needs external synchronization. [`Future`] is the only type designed to be
//! settled on one thread and observed on another.

mod cast;
pub mod error;
pub mod function;
pub mod future;
pub mod signature;
pub mod types;
pub mod value;

pub use error::{CastError, ReflectError, ReflectResult};
pub use function::{CreatePolicy, Function, FunctionInterface};
pub use future::{Future, Resolver, Settlement};
pub use signature::{Parameter, Signature};
pub use types::Type;
pub use value::{Exception, Opaque, Value};

/// Subsystem tag used as the `tracing` target of every diagnostic emitted by
/// the polycall crates.
pub const LOG_TARGET: &str = "polycall";
