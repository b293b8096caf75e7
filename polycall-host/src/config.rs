//! Configuration file loading and management
//!
//! This module handles loading and parsing the host configuration from
//! `$XDG_CONFIG_HOME/polycall/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use polycall_plugin::host::{DEFAULT_LIBRARY_PATH, LIBRARY_PATH_ENV};
use polycall_plugin::LoaderHostConfig;
use polycall_reflect::CreatePolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Host process configuration
    #[serde(default)]
    pub host: HostConfig,
    /// Loader configuration
    #[serde(default)]
    pub loaders: LoadersConfig,
    /// Scripts to load at startup, keyed by loader tag
    #[serde(default)]
    pub scripts: HashMap<String, ScriptsConfig>,
}

/// Host process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadersConfig {
    /// Environment variable overriding the loader library path
    /// Default: "POLYCALL_LIBRARY_PATH"
    pub library_path_env: String,
    /// Library path used when the variable is unset
    /// Default: "/usr/local/lib/polycall"
    pub default_library_path: PathBuf,
    /// What happens when a loader's create hook fails
    /// Default: lenient
    #[serde(default)]
    pub create_policy: CreatePolicy,
}

/// Scripts for one loader
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScriptsConfig {
    /// Script files, absolute or relative to the loader library path
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            loaders: LoadersConfig::default(),
            scripts: HashMap::new(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for LoadersConfig {
    fn default() -> Self {
        Self {
            library_path_env: LIBRARY_PATH_ENV.to_string(),
            default_library_path: PathBuf::from(DEFAULT_LIBRARY_PATH),
            create_policy: CreatePolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/polycall/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "polycall", "polycall")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> String {
        r#"# polycall Host Configuration

[host]
# Log level: trace, debug, info, warn, error
# RUST_LOG takes precedence when set
# Default: "info"
log_level = "info"

[loaders]
# Environment variable overriding the loader library path
# Default: "POLYCALL_LIBRARY_PATH"
library_path_env = "POLYCALL_LIBRARY_PATH"

# Library path used when the variable is unset or empty
# Each loader resolves scripts in <library path>/<tag>
# Default: "/usr/local/lib/polycall"
default_library_path = "/usr/local/lib/polycall"

# What happens when a loader fails to set up a function:
# - lenient: log the failure and keep the function
# - strict: reject the function
# Default: "lenient"
create_policy = "lenient"

# Scripts to load at startup, keyed by loader tag
# [scripts.mock]
# files = ["math.toml"]
"#
        .to_string()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.host.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.host.log_level,
                valid_log_levels.join(", ")
            );
        }

        if self.loaders.library_path_env.is_empty() {
            anyhow::bail!("loaders.library_path_env must not be empty");
        }

        if self.loaders.default_library_path.as_os_str().is_empty() {
            anyhow::bail!("loaders.default_library_path must not be empty");
        }

        for (tag, scripts) in &self.scripts {
            if scripts.files.iter().any(|f| f.as_os_str().is_empty()) {
                anyhow::bail!("scripts.{}: file paths must not be empty", tag);
            }
        }

        Ok(())
    }

    /// Loader host settings derived from this configuration
    pub fn host_config(&self) -> LoaderHostConfig {
        LoaderHostConfig {
            library_path_env: self.loaders.library_path_env.clone(),
            default_library_path: self.loaders.default_library_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host.log_level, "info");
        assert_eq!(config.loaders.library_path_env, "POLYCALL_LIBRARY_PATH");
        assert_eq!(
            config.loaders.default_library_path,
            PathBuf::from("/usr/local/lib/polycall")
        );
        assert_eq!(config.loaders.create_policy, CreatePolicy::Lenient);
        assert!(config.scripts.is_empty());
    }

    #[test]
    fn test_default_content_parses() {
        let config: Config = toml::from_str(&Config::default_config_content()).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[host]
log_level = "debug"

[loaders]
library_path_env = "MY_LOADERS"
default_library_path = "/opt/polycall"
create_policy = "strict"

[scripts.mock]
files = ["math.toml", "/abs/strings.toml"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(config_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.host.log_level, "debug");
        assert_eq!(config.loaders.create_policy, CreatePolicy::Strict);
        assert_eq!(config.scripts["mock"].files.len(), 2);

        let host = config.host_config();
        assert_eq!(host.library_path_env, "MY_LOADERS");
        assert_eq!(host.default_library_path, PathBuf::from("/opt/polycall"));
    }

    #[test]
    fn test_load_minimal_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[host]\nlog_level = \"warn\"\n").unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.host.log_level, "warn");
        assert_eq!(config.loaders, LoadersConfig::default());
        assert!(config.scripts.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/polycall/config.toml").is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.host.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_env_var() {
        let mut config = Config::default();
        config.loaders.library_path_env = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_script_path() {
        let mut config = Config::default();
        config.scripts.insert(
            "mock".to_string(),
            ScriptsConfig {
                files: vec![PathBuf::new()],
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_create_policy_is_rejected() {
        let result: Result<Config, _> = toml::from_str(
            "[loaders]\nlibrary_path_env = \"X\"\ndefault_library_path = \"/x\"\ncreate_policy = \"maybe\"\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_full_config_roundtrip() {
        let mut config = Config::default();
        config.host.log_level = "trace".to_string();
        config.scripts.insert(
            "mock".to_string(),
            ScriptsConfig {
                files: vec![PathBuf::from("a.toml")],
            },
        );

        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }
}
