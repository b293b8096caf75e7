//! Loader host startup.
//!
//! Builds the [`LoaderHost`], registers the loaders compiled into this
//! binary and loads the scripts listed in the configuration.

use crate::config::Config;
use anyhow::{Context, Result};
use loader_mock::MockLoader;
use polycall_plugin::LoaderHost;
use tracing::{info, warn};

/// Start a loader host from `config`.
pub fn bootstrap(config: &Config) -> Result<LoaderHost> {
    let mut host =
        LoaderHost::new(config.host_config()).context("Failed to initialize loader host")?;

    let mock = MockLoader::with_policy(config.loaders.create_policy)
        .context("Failed to start mock loader")?;
    host.register_loader(Box::new(mock))?;

    let installed = host.discover().context("Failed to scan loader directory")?;
    for loader in &installed {
        if !host.has_loader(loader.tag()) {
            warn!(
                "Loader '{}' v{} is installed at {} but not built into this host",
                loader.tag(),
                loader.version(),
                loader.dir().display()
            );
        }
    }

    info!("Registered loaders: {:?}", host.loader_tags());

    let mut tags: Vec<&String> = config.scripts.keys().collect();
    tags.sort();

    for tag in tags {
        let installed_loader = installed.iter().find(|l| l.tag() == tag);
        for file in &config.scripts[tag].files {
            if let Some(loader) = installed_loader.filter(|l| !l.accepts(file)) {
                warn!(
                    "Script {} does not match the extensions of loader '{}'",
                    file.display(),
                    loader.tag()
                );
            }

            let names = host
                .load_from_file(tag, file)
                .with_context(|| format!("Failed to load {} script {}", tag, file.display()))?;
            info!("Loaded {} from {}: {:?}", tag, file.display(), names);
        }
    }

    Ok(host)
}
