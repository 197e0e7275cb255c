//! Configuration for the python-debug-attach MCP server

use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;

use crate::controller::{ControllerOptions, DEFAULT_DEBOUNCE};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "python-debug-attach")]
#[command(about = "MCP server wiring Python debug attach targets to debugger sessions")]
#[command(version)]
pub struct Args {
    /// Python interpreter used for launch sessions (name on PATH or absolute path)
    #[arg(long, default_value = "python3")]
    pub python_path: String,

    /// Quiet window for remote debug commands, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub debounce_ms: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path (defaults to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone)]
pub struct Config {
    /// Interpreter passed as pythonPath in launch configurations
    pub python_path: String,
    /// Debounce window for the command dispatch path
    pub debounce: Duration,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        Self {
            python_path: args.python_path.clone(),
            debounce: Duration::from_millis(args.debounce_ms),
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            debounce: self.debounce,
            python_path: self.python_path.clone(),
        }
    }

    /// Find the configured interpreter: explicit path, then PATH
    pub fn find_python(&self) -> Result<PathBuf, String> {
        let configured = PathBuf::from(&self.python_path);
        if configured.components().count() > 1 {
            if configured.exists() {
                return Ok(configured);
            }
            return Err(format!("Configured python path does not exist: {}", configured.display()));
        }

        which(&self.python_path).map_err(|_| {
            format!("{} not found on PATH", self.python_path)
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            python_path: "python3".to_string(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Find an executable on PATH (simple which implementation)
fn which(name: &str) -> Result<PathBuf, ()> {
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(())
}
