//! Loader manifest parsing.
//!
//! Each installed loader has a `manifest.toml` file that describes its tag,
//! its library and the script extensions it handles.

use crate::error::{PluginError, PluginResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Loader manifest structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderManifest {
    /// Loader metadata.
    pub loader: LoaderMetadata,

    /// Loader-specific configuration key-value pairs.
    #[serde(default)]
    pub config: HashMap<String, toml::Value>,
}

/// Loader metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderMetadata {
    /// Tag identifying the guest language, e.g. `py` or `node`.
    pub tag: String,

    /// Human-readable name.
    pub name: String,

    /// Version string (semver).
    pub version: String,

    /// Loader description.
    #[serde(default)]
    pub description: Option<String>,

    /// Library file, relative to the manifest directory.
    #[serde(default)]
    pub library: Option<String>,

    /// Script file extensions handled by the loader.
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl LoaderManifest {
    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> PluginResult<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Validate the manifest.
    fn validate(&self) -> PluginResult<()> {
        if self.loader.tag.is_empty() {
            return Err(PluginError::InvalidManifest(
                "Loader tag cannot be empty".to_string(),
            ));
        }

        if self.loader.name.is_empty() {
            return Err(PluginError::InvalidManifest(
                "Loader name cannot be empty".to_string(),
            ));
        }

        if self.loader.version.is_empty() {
            return Err(PluginError::InvalidManifest(
                "Loader version cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the loader tag.
    pub fn tag(&self) -> &str {
        &self.loader.tag
    }

    /// Path of the loader library inside `dir`.
    ///
    /// Defaults to the platform library name for `<tag>_loader`.
    pub fn library_path(&self, dir: &Path) -> PathBuf {
        match &self.loader.library {
            Some(library) => dir.join(library),
            None => dir.join(format!(
                "{}{}_loader{}",
                std::env::consts::DLL_PREFIX,
                self.loader.tag,
                std::env::consts::DLL_SUFFIX
            )),
        }
    }

    /// Check if the loader handles scripts with this extension.
    pub fn handles_extension(&self, extension: &str) -> bool {
        self.loader
            .extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}

impl FromStr for LoaderManifest {
    type Err = PluginError;

    fn from_str(content: &str) -> PluginResult<Self> {
        let manifest: LoaderManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }
}
