//! Command line arguments.
//!
//! ```text
//! polycall [--config <path>] [<function> [<arg>...]]
//! ```
//!
//! Without a function the host lists every loaded function.

use clap::Parser;
use std::path::PathBuf;

/// Call guest functions through polycall loaders
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "polycall", version)]
#[command(about = "Call guest functions through polycall loaders", long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Function to call; lists loaded functions when omitted
    pub function: Option<String>,

    /// Function arguments, parsed as JSON with a string fallback
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
