//! Library search path resolution.
//!
//! A manager resolves its library path once, from an environment variable
//! override or a default, and keeps it for its whole lifetime.

use crate::error::{PluginError, PluginResult};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a library path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource {
    Environment,
    Default,
}

/// Directory loaders are searched in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPath {
    path: PathBuf,
    source: PathSource,
}

impl LibraryPath {
    /// Resolve from the environment variable `env_var`, falling back to
    /// `default`. The first non-empty value wins.
    pub fn from_env(env_var: &str, default: impl AsRef<Path>) -> PluginResult<Self> {
        let value = if env_var.is_empty() {
            None
        } else {
            std::env::var_os(env_var)
        };

        Self::resolve(value, default)
    }

    /// Resolve from an already-read override value.
    pub fn resolve(env_value: Option<OsString>, default: impl AsRef<Path>) -> PluginResult<Self> {
        if let Some(value) = env_value.filter(|v| !v.is_empty()) {
            return Ok(Self {
                path: PathBuf::from(value),
                source: PathSource::Environment,
            });
        }

        let default = default.as_ref();
        if default.as_os_str().is_empty() {
            return Err(PluginError::LibraryPath(
                "no environment override and no default path".to_string(),
            ));
        }

        Ok(Self {
            path: default.to_path_buf(),
            source: PathSource::Default,
        })
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> PathSource {
        self.source
    }

    /// Path of `name` inside the library directory.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// Find an existing file or directory named `name` in the library
    /// directory.
    pub fn locate(&self, name: impl AsRef<Path>) -> Option<PathBuf> {
        let candidate = self.join(name);
        candidate.exists().then_some(candidate)
    }
}

impl fmt::Display for LibraryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_environment_override_wins() {
        let path = LibraryPath::resolve(Some(OsString::from("/opt/loaders")), "/usr/lib").unwrap();
        assert_eq!(path.as_path(), Path::new("/opt/loaders"));
        assert_eq!(path.source(), PathSource::Environment);
    }

    #[test]
    fn test_empty_override_falls_back() {
        let path = LibraryPath::resolve(Some(OsString::new()), "/usr/lib").unwrap();
        assert_eq!(path.as_path(), Path::new("/usr/lib"));
        assert_eq!(path.source(), PathSource::Default);

        let path = LibraryPath::resolve(None, "/usr/lib").unwrap();
        assert_eq!(path.source(), PathSource::Default);
    }

    #[test]
    fn test_nothing_to_resolve() {
        assert!(matches!(
            LibraryPath::resolve(None, ""),
            Err(PluginError::LibraryPath(_))
        ));
    }

    #[test]
    fn test_locate() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("libmock_loader.so"), b"").unwrap();

        let path = LibraryPath::resolve(None, temp_dir.path()).unwrap();
        assert!(path.locate("libmock_loader.so").is_some());
        assert!(path.locate("libpy_loader.so").is_none());
    }
}
