//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::bus::DEFAULT_CAPACITY;

/// Where displays are enumerated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DisplayBackendKind {
    /// `xrandr --listmonitors`
    Xrandr,
    /// Fixed layout from `--display`
    Virtual,
}

/// CLI argument parsing structure
#[derive(Debug, Parser)]
#[command(name = "stage-sync")]
#[command(about = "Stage timer control server keeping every display surface in sync")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "4810")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// File holding the persisted state keys
    #[arg(long, default_value = "stage-sync-state.json")]
    pub state_file: PathBuf,

    /// Keep all state in memory
    #[arg(long)]
    pub no_persist: bool,

    /// Display enumeration backend
    #[arg(long, value_enum, default_value = "xrandr")]
    pub displays: DisplayBackendKind,

    /// Virtual display as `[*]NAME=WxH+X+Y`, repeatable; `*` marks the primary
    #[arg(long = "display", value_name = "SPEC")]
    pub display_specs: Vec<String>,

    /// Command started once per attached surface; geometry and feed URL are
    /// passed in STAGE_SYNC_* environment variables
    #[arg(long)]
    pub renderer: Option<String>,

    /// Milliseconds between surface creations when duplicating
    #[arg(long, default_value = "250")]
    pub stagger_ms: u64,

    /// Seconds between display re-enumerations
    #[arg(long, default_value = "5")]
    pub display_poll_secs: u64,

    /// Updates buffered per subscriber before it is resynchronized
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub bus_capacity: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL surfaces use to reach the server
    pub fn feed_base(&self) -> String {
        format!("http://{}", self.address())
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn display_poll(&self) -> Duration {
        Duration::from_secs(self.display_poll_secs.max(1))
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}
