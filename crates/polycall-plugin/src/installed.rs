//! Loaders installed under a library path.
//!
//! An installed loader lives in `<library path>/<tag>/manifest.toml`. The
//! directory name must equal the manifest tag, so a tag maps to exactly one
//! directory and the same directory doubles as the loader's script path.

use crate::error::{PluginError, PluginResult};
use crate::manifest::LoaderManifest;
use crate::path::LibraryPath;
use polycall_reflect::LOG_TARGET;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manifest file name inside a loader directory.
pub const MANIFEST_FILE: &str = "manifest.toml";

/// A loader found under a library path.
#[derive(Debug, Clone)]
pub struct InstalledLoader {
    dir: PathBuf,
    manifest: LoaderManifest,
}

impl InstalledLoader {
    /// Read the loader installed in `dir`.
    pub fn read(dir: &Path) -> PluginResult<Self> {
        let manifest = LoaderManifest::from_file(&dir.join(MANIFEST_FILE))?;

        let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if dir_name != manifest.tag() {
            return Err(PluginError::InvalidManifest(format!(
                "loader '{}' is installed in directory '{}'",
                manifest.tag(),
                dir.display()
            )));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    pub fn tag(&self) -> &str {
        self.manifest.tag()
    }

    pub fn version(&self) -> &str {
        &self.manifest.loader.version
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &LoaderManifest {
        &self.manifest
    }

    /// Path of the loader's native library.
    pub fn library(&self) -> PathBuf {
        self.manifest.library_path(&self.dir)
    }

    pub fn has_library(&self) -> bool {
        self.library().is_file()
    }

    /// Whether the loader claims `script` by its extension.
    pub fn accepts(&self, script: &Path) -> bool {
        script
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.manifest.handles_extension(e))
    }
}

impl LibraryPath {
    /// The loader installed for `tag`, if any.
    pub fn installed_loader(&self, tag: &str) -> PluginResult<Option<InstalledLoader>> {
        let dir = self.join(tag);
        if !dir.join(MANIFEST_FILE).is_file() {
            return Ok(None);
        }
        InstalledLoader::read(&dir).map(Some)
    }

    /// Every loader installed under this path, sorted by tag.
    ///
    /// Directories without a manifest are ignored. Broken manifests are
    /// logged and skipped.
    pub fn installed_loaders(&self) -> PluginResult<Vec<InstalledLoader>> {
        if !self.as_path().is_dir() {
            debug!(target: LOG_TARGET, "No loader directory at {}", self);
            return Ok(Vec::new());
        }

        let mut loaders = Vec::new();

        for entry in std::fs::read_dir(self.as_path())?.flatten() {
            let dir = entry.path();
            if !dir.join(MANIFEST_FILE).is_file() {
                continue;
            }

            match InstalledLoader::read(&dir) {
                Ok(loader) => {
                    debug!(
                        target: LOG_TARGET,
                        "Installed loader: {} v{} at {:?}",
                        loader.tag(),
                        loader.version(),
                        dir
                    );
                    loaders.push(loader);
                }
                Err(e) => warn!(target: LOG_TARGET, "Skipping loader at {:?}: {}", dir, e),
            }
        }

        loaders.sort_by(|a, b| a.tag().cmp(b.tag()));
        info!(target: LOG_TARGET, "Found {} installed loaders in {}", loaders.len(), self);
        Ok(loaders)
    }
}
