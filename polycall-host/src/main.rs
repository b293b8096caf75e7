//! # polycall
//!
//! The polycall host.
//!
//! The host is responsible for:
//! - Initializing the loader manager and its library path
//! - Registering the loaders built into this binary
//! - Loading the guest scripts listed in the configuration
//! - Calling a guest function with JSON arguments and printing the result
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 polycall host                │
//! │                                              │
//! │  ┌────────────────────────────────────────┐  │
//! │  │         LoaderHost ("loader")          │  │
//! │  │  ┌──────────────┐   ┌──────────────┐   │  │
//! │  │  │ mock loader  │   │   ...        │   │  │
//! │  │  │  handles ──► │   │              │   │  │
//! │  │  │  functions   │   │              │   │  │
//! │  │  └──────────────┘   └──────────────┘   │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! The host reads configuration from `$XDG_CONFIG_HOME/polycall/config.toml`,
//! or from the path given with `--config`.
//!
//! ## Running
//!
//! ```bash
//! # List loaded functions
//! cargo run --bin polycall
//!
//! # Call a function
//! cargo run --bin polycall -- sum 1 41
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin polycall -- sum 1 41
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use polycall_host::bootstrap::bootstrap;
use polycall_host::call::{call, parse_arg, render};
use polycall_host::cli::Args;
use polycall_host::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, load_error) = match &args.config {
        Some(path) => (Config::load(path)?, None),
        None => match Config::load_default() {
            Ok(cfg) => (cfg, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };

    // Logs go to stderr so results on stdout stay machine readable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting polycall v{}", env!("CARGO_PKG_VERSION"));

    if let Some(e) = load_error {
        warn!("Failed to load config, using defaults: {:#}", e);
    }

    let mut host = bootstrap(&config)?;

    let outcome = match &args.function {
        None => {
            for name in host.functions() {
                if let Some(function) = host.function(&name) {
                    println!("{}{}", name, function.signature());
                }
            }
            Ok(())
        }
        Some(name) => {
            let values = args.args.iter().map(String::as_str).map(parse_arg).collect();
            match call(&host, name, values).await {
                Ok(result) => render(&result).map(|out| println!("{}", out)),
                Err(e) => Err(e),
            }
        }
    };

    host.destroy().context("Failed to shut down loaders")?;
    info!("polycall shutdown complete");

    outcome
}
