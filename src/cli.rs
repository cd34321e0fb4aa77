/// CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::config::{parse_duration, parse_interval_override, ConfigError, SamplerConfig};
use crate::core::MetricCategory;
use crate::utils::app_config::ServerSettings;

// Build timestamp injected at compile time
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "ez-monitor")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/ez-monitor/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sampler and serve the dashboard (default)
    Serve(ServeArgs),

    /// Take one snapshot and print it as JSON
    Once {
        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,

        #[command(flatten)]
        sampler: SamplerArgs,
    },

    /// Configuration file management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve(ServeArgs::default())
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Allow cross-origin requests
    #[arg(long)]
    pub cors: bool,

    #[command(flatten)]
    pub sampler: SamplerArgs,
}

impl ServeArgs {
    pub fn apply(&self, server: &mut ServerSettings) {
        if let Some(host) = &self.host {
            server.host = host.clone();
        }
        if let Some(port) = self.port {
            server.port = port;
        }
        if self.cors {
            server.cors = true;
        }
    }
}

/// Sampler overrides shared by `serve` and `once`
#[derive(Args, Debug, Default, Clone)]
pub struct SamplerArgs {
    /// Base tick interval, e.g. "1s" or "500ms"
    #[arg(long, value_parser = parse_duration)]
    pub tick: Option<Duration>,

    /// Per-category interval, e.g. "gpu=5s" (repeatable)
    #[arg(short, long = "interval", value_parser = parse_interval_override)]
    pub intervals: Vec<(MetricCategory, Duration)>,

    /// Per-source timeout
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Number of processes in the top-processes list
    #[arg(long)]
    pub top: Option<usize>,
}

impl SamplerArgs {
    /// Layer command-line overrides on top of the file configuration
    pub fn apply(&self, config: &mut SamplerConfig) -> Result<(), ConfigError> {
        if let Some(tick) = self.tick {
            config.base_interval = tick;
        }
        if let Some(timeout) = self.timeout {
            config.source_timeout = timeout;
        }
        if let Some(top) = self.top {
            config.top_processes = top;
        }
        for (category, interval) in &self.intervals {
            config.set_interval(*category, *interval);
        }
        config.validate()
    }
}
