//! Command line arguments

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::runtime::RuntimeConfig;

/// Embedded script runtime
#[derive(Debug, Parser)]
#[command(name = "corten-script", version, about = "Run scripts against the embedded script runtime")]
pub struct Cli {
    /// Script file to execute; top-level awaits are supported
    pub file: Option<PathBuf>,

    /// Evaluate an expression and print its value
    #[arg(short = 'e', long = "eval", value_name = "EXPR")]
    pub eval: Option<String>,

    /// Print the evaluated value as JSON
    #[arg(long, requires = "eval")]
    pub json: bool,

    /// Print bytecode before execution
    #[arg(long)]
    pub print_bytecode: bool,

    /// Allocations between automatic collections
    #[arg(long, value_name = "N")]
    pub gc_threshold: Option<usize>,

    /// Delay between polls of generator-backed tasks
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub poll_interval_ms: u64,

    /// Log filter, overriding RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Runtime configuration selected by the flags
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::default()
            .with_print_bytecode(self.print_bytecode)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms));
        if let Some(threshold) = self.gc_threshold {
            config = config.with_gc_threshold(threshold);
        }
        config
    }

    /// Whether neither a file nor an expression was given
    pub fn is_interactive(&self) -> bool {
        self.file.is_none() && self.eval.is_none()
    }
}
