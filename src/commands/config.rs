//! Config file generation command implementation.

use std::fs;
use std::path::PathBuf;

use procrate_exporter::config::Config;

use crate::cli::ConfigFormat;

/// Generates configuration files
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("procrate-exporter.yaml"));

    let content = render_config(&config, format, commented)?;

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

pub fn render_config(
    config: &Config,
    format: ConfigFormat,
    commented: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => {
            let content = serde_yaml::to_string(config)?;
            if commented {
                add_config_comments(content)
            } else {
                content
            }
        }
    })
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# procrate-exporter Configuration
# ===============================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                   # HTTP port
#
# Sampling and Reporting
# ----------------------
# sample_interval_secs: 10     # Seconds between process samples
# report_interval_secs: 30     # Seconds between periodic flushes (>= sample interval)
# window_size: 10              # Interval rates kept in the sliding window
# histogram_buckets: [0.1, 0.25, 0.5, 0.75, 1.0]  # Rate bucket upper bounds
# channel_capacity: 64         # Reports buffered between monitor and scheduler
# parallelism: null            # /proc scanning threads (null = auto)
#
# Roles
# -----
# roles:
#   - role: manager
#     matches: []              # Exact process names (comm or exe basename)
#     cmdline_matches: ["-p manager"]  # Substrings of the command line
#
# Output
# ------
# output_format: "json"        # json, text or none
# output_file: null            # Write snapshots to a file (null = stdout)
# metric_prefix: "procrate"    # Prefix for text and /metrics metric names
#
# Feature Flags
# -------------
# enable_http: true            # Serve /metrics, /report, /health, /doc
# enable_health: true          # Enable /health endpoint
#
# TLS
# ---
# enable_tls: false
# tls_cert_path: null          # PEM certificate
# tls_key_path: null           # PEM private key
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
