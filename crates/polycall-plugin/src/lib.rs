//! # polycall-plugin
//!
//! Plugin management for the polycall runtime.
//!
//! This crate provides the generic [`PluginManager`] used to hold every kind
//! of extension, and the [`LoaderHost`] built on top of it:
//!
//! - A manager holds named [`Plugin`]s and drives their teardown through an
//!   optional [`PluginManagerInterface`]
//! - Each manager resolves a [`LibraryPath`] from an environment variable or
//!   a default
//! - Guest languages plug in through the [`Loader`] trait
//! - Installed loaders live in `<library path>/<tag>` with a `manifest.toml`
//!   and are listed with [`LibraryPath::installed_loaders`]
//!
//! ## Loading scripts
//!
//! ```text
//! LoaderHost ("loader" manager)
//!   +-- py plugin    -> Loader + "py" manager
//!   |                     +-- script handle -> exported Functions
//!   +-- mock plugin  -> Loader + "mock" manager
//! ```

pub mod error;
pub mod host;
pub mod installed;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod path;
pub mod plugin;

pub use error::{PluginError, PluginResult};
pub use host::{LoaderHost, LoaderHostConfig};
pub use installed::InstalledLoader;
pub use loader::Loader;
pub use manager::{ManagerState, PluginManager, PluginManagerInterface};
pub use manifest::{LoaderManifest, LoaderMetadata};
pub use path::{LibraryPath, PathSource};
pub use plugin::Plugin;
