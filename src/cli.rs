//! CLI arguments and subcommands for procrate-exporter.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_config_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Periodic output format
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormatArg {
    Json,
    Text,
    None,
}

impl OutputFormatArg {
    pub fn as_config_str(&self) -> &'static str {
        match self {
            OutputFormatArg::Json => "json",
            OutputFormatArg::Text => "text",
            OutputFormatArg::None => "none",
        }
    }
}

/// Format for the `test` subcommand
#[derive(Debug, Clone, ValueEnum)]
pub enum ReportFormat {
    Json,
    Text,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "procrate-exporter",
    about = "Per-role process CPU rate monitor and Prometheus exporter",
    long_about = "Per-role process CPU rate monitor and Prometheus exporter.\n\n\
                  Samples the processes filling each configured role, computes sliding-window, \
                  lifetime and instantaneous CPU rates, tracks restarts and publishes the latest \
                  report per role as JSON, Prometheus text and /metrics.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Seconds between process samples
    #[arg(long)]
    pub sample_interval: Option<u64>,

    /// Seconds between periodic report flushes
    #[arg(long)]
    pub report_interval: Option<u64>,

    /// Number of interval rates kept in the sliding window
    #[arg(long)]
    pub window_size: Option<usize>,

    /// Periodic output format
    #[arg(long, value_enum)]
    pub output_format: Option<OutputFormatArg>,

    /// Write periodic snapshots to this file instead of stdout
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Prefix for text-format and /metrics metric names
    #[arg(long)]
    pub metric_prefix: Option<String>,

    /// Parallel /proc scanning threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Disable the HTTP server
    #[arg(long)]
    pub disable_http: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Serve HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// TLS certificate (PEM)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,

    /// Path to JSON test data file (replays recorded frames instead of /proc)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and system requirements
    Check {
        /// Check /proc filesystem
        #[arg(long)]
        proc: bool,

        /// Check that every configured role matches a running process
        #[arg(long)]
        roles: bool,

        /// Check all system requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Sample processes and print the computed reports
    Test {
        /// Number of sampling iterations (at least 2 for rates)
        #[arg(short = 'n', long, default_value_t = 3)]
        iterations: usize,

        /// Seconds between iterations (defaults to sample_interval)
        #[arg(long)]
        interval: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: ReportFormat,
    },

    /// List configured roles and the processes currently filling them
    Roles {
        /// Show matching rules
        #[arg(long)]
        verbose: bool,
    },

    /// Generate synthetic test data JSON file
    GenerateTestdata {
        /// Output file path
        #[arg(short = 'o', long, default_value = "testdata.json")]
        output: PathBuf,

        /// Number of frames (sampling ticks)
        #[arg(long, default_value_t = 60)]
        frames: usize,

        /// Seconds between frames
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
}
