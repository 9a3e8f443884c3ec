//! Configuration management.
//!
//! The effective configuration is merged from defaults, an optional config
//! file (YAML, JSON or TOML) and CLI overrides, then validated before the
//! exporter starts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::histogram::{HistogramBuckets, DEFAULT_BUCKETS};
use crate::process::RoleRule;
use crate::rate::DEFAULT_WINDOW_SIZE;
use crate::report::DEFAULT_METRIC_PREFIX;
use crate::scheduler::OutputFormat;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Default config file locations, searched in order.
pub const DEFAULT_CONFIG_PATHS: [&str; 6] = [
    "/etc/procrate/procrate-exporter.yaml",
    "/etc/procrate/procrate-exporter.yml",
    "/etc/procrate/procrate-exporter.json",
    "./procrate-exporter.yaml",
    "./procrate-exporter.yml",
    "./procrate-exporter.json",
];

/// Enhanced configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Sampling and reporting
    #[serde(alias = "sample-interval-secs")]
    pub sample_interval_secs: Option<u64>,
    #[serde(alias = "report-interval-secs")]
    pub report_interval_secs: Option<u64>,
    #[serde(alias = "window-size")]
    pub window_size: Option<usize>,
    #[serde(alias = "histogram-buckets")]
    pub histogram_buckets: Option<Vec<f64>>,
    #[serde(alias = "channel-capacity")]
    pub channel_capacity: Option<usize>,
    pub parallelism: Option<usize>,

    // Output
    /// "json" | "text" | "none"
    #[serde(alias = "output-format")]
    pub output_format: Option<String>,
    /// Write snapshots to this file instead of stdout
    #[serde(alias = "output-file")]
    pub output_file: Option<PathBuf>,
    #[serde(alias = "metric-prefix")]
    pub metric_prefix: Option<String>,

    // Feature flags
    pub enable_http: Option<bool>,
    pub enable_health: Option<bool>,

    // TLS
    pub enable_tls: Option<bool>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,

    // Logging
    pub log_level: Option<String>,

    // Monitored roles (array of tables, must stay last for TOML output)
    pub roles: Option<Vec<RoleRule>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            sample_interval_secs: Some(DEFAULT_SAMPLE_INTERVAL_SECS),
            report_interval_secs: Some(DEFAULT_REPORT_INTERVAL_SECS),
            window_size: Some(DEFAULT_WINDOW_SIZE),
            histogram_buckets: Some(DEFAULT_BUCKETS.to_vec()),
            channel_capacity: Some(DEFAULT_CHANNEL_CAPACITY),
            parallelism: None,
            roles: Some(default_roles()),
            output_format: Some("json".into()),
            output_file: None,
            metric_prefix: Some(DEFAULT_METRIC_PREFIX.into()),
            enable_http: Some(true),
            enable_health: Some(true),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
            log_level: Some("info".into()),
        }
    }
}

/// Zeek cluster layout used when no roles are configured.
fn default_roles() -> Vec<RoleRule> {
    ["manager", "logger", "proxy", "worker"]
        .iter()
        .map(|role| RoleRule {
            role: role.to_string(),
            matches: Vec::new(),
            cmdline_matches: vec![format!("-p {role}")],
        })
        .collect()
}

impl Config {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(
            self.sample_interval_secs
                .unwrap_or(DEFAULT_SAMPLE_INTERVAL_SECS),
        )
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(
            self.report_interval_secs
                .unwrap_or(DEFAULT_REPORT_INTERVAL_SECS),
        )
    }

    pub fn window_size(&self) -> usize {
        self.window_size.unwrap_or(DEFAULT_WINDOW_SIZE)
    }

    pub fn buckets(&self) -> HistogramBuckets {
        match &self.histogram_buckets {
            Some(b) => HistogramBuckets::new(b),
            None => HistogramBuckets::default(),
        }
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
            .max(1)
    }

    pub fn role_rules(&self) -> Vec<RoleRule> {
        self.roles.clone().unwrap_or_default()
    }

    pub fn role_names(&self) -> Vec<String> {
        self.role_rules().into_iter().map(|r| r.role).collect()
    }

    /// Flush format, `None` when periodic output is disabled.
    pub fn output_format(&self) -> Option<OutputFormat> {
        match self.output_format.as_deref().unwrap_or("json") {
            "text" => Some(OutputFormat::Text),
            "none" => None,
            _ => Some(OutputFormat::Json),
        }
    }

    pub fn metric_prefix(&self) -> &str {
        self.metric_prefix.as_deref().unwrap_or(DEFAULT_METRIC_PREFIX)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let sample = cfg
        .sample_interval_secs
        .unwrap_or(DEFAULT_SAMPLE_INTERVAL_SECS);
    let report = cfg
        .report_interval_secs
        .unwrap_or(DEFAULT_REPORT_INTERVAL_SECS);

    if sample == 0 || report == 0 {
        return Err("sample_interval_secs and report_interval_secs must be greater than 0".into());
    }
    if report < sample {
        return Err(format!(
            "report_interval_secs ({}) must be >= sample_interval_secs ({})",
            report, sample
        )
        .into());
    }

    if cfg.window_size() == 0 {
        return Err("window_size must be at least 1".into());
    }

    if let Some(buckets) = &cfg.histogram_buckets {
        if buckets.is_empty() {
            return Err("histogram_buckets must not be empty".into());
        }
        if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err("histogram_buckets must be finite and greater than 0".into());
        }
        if buckets.windows(2).any(|w| w[1] <= w[0]) {
            return Err("histogram_buckets must be strictly ascending".into());
        }
    }

    // Role rules
    let roles = cfg.roles.as_deref().unwrap_or(&[]);
    if roles.is_empty() {
        return Err("at least one role must be configured".into());
    }
    let mut seen = HashSet::new();
    for rule in roles {
        if rule.role.trim().is_empty() {
            return Err("role names must not be empty".into());
        }
        if rule.matches.is_empty() && rule.cmdline_matches.is_empty() {
            return Err(format!(
                "role '{}' needs at least one entry in matches or cmdline_matches",
                rule.role
            )
            .into());
        }
        if !seen.insert(rule.role.as_str()) {
            return Err(format!("role '{}' is configured more than once", rule.role).into());
        }
    }

    if let Some(format) = cfg.output_format.as_deref() {
        match format {
            "json" | "text" | "none" => {}
            other => {
                return Err(format!(
                    "Invalid output_format '{}', expected 'json', 'text' or 'none'",
                    other
                )
                .into());
            }
        }
    }

    if !is_valid_metric_prefix(cfg.metric_prefix()) {
        return Err(format!(
            "Invalid metric_prefix '{}': must match [a-zA-Z_:][a-zA-Z0-9_:]*",
            cfg.metric_prefix()
        )
        .into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if !LOG_LEVELS.contains(&level) {
            return Err(format!(
                "Invalid log_level '{}', expected one of {}",
                level,
                LOG_LEVELS.join(", ")
            )
            .into());
        }
    }

    if cfg.enable_tls.unwrap_or(false) && (cfg.tls_cert_path.is_none() || cfg.tls_key_path.is_none())
    {
        return Err("enable_tls requires both tls_cert_path and tls_key_path".into());
    }

    Ok(())
}

fn is_valid_metric_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Configuration loading with multiple format support.
///
/// Without an explicit path the default locations are searched; when none
/// exists the built-in defaults are returned.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            Some(p) => PathBuf::from(p),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            config
        }
        Some("toml") => {
            let config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            config
        }
        _ => {
            // Default to YAML
            let config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            config
        }
    };

    Ok(fill_defaults(config))
}

/// Fills fields missing from a config file with the built-in defaults.
fn fill_defaults(cfg: Config) -> Config {
    let d = Config::default();
    Config {
        port: cfg.port.or(d.port),
        bind: cfg.bind.or(d.bind),
        sample_interval_secs: cfg.sample_interval_secs.or(d.sample_interval_secs),
        report_interval_secs: cfg.report_interval_secs.or(d.report_interval_secs),
        window_size: cfg.window_size.or(d.window_size),
        histogram_buckets: cfg.histogram_buckets.or(d.histogram_buckets),
        channel_capacity: cfg.channel_capacity.or(d.channel_capacity),
        parallelism: cfg.parallelism.or(d.parallelism),
        roles: cfg.roles.or(d.roles),
        output_format: cfg.output_format.or(d.output_format),
        output_file: cfg.output_file.or(d.output_file),
        metric_prefix: cfg.metric_prefix.or(d.metric_prefix),
        enable_http: cfg.enable_http.or(d.enable_http),
        enable_health: cfg.enable_health.or(d.enable_health),
        enable_tls: cfg.enable_tls.or(d.enable_tls),
        tls_cert_path: cfg.tls_cert_path.or(d.tls_cert_path),
        tls_key_path: cfg.tls_key_path.or(d.tls_key_path),
        log_level: cfg.log_level.or(d.log_level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = Config::default();
        assert!(validate_effective_config(&cfg).is_ok());
        assert_eq!(cfg.role_names(), vec!["manager", "logger", "proxy", "worker"]);
        assert_eq!(cfg.output_format(), Some(OutputFormat::Json));
        assert_eq!(cfg.buckets().len(), 6);
    }

    #[test]
    fn test_report_interval_must_cover_sample_interval() {
        let cfg = Config {
            sample_interval_secs: Some(30),
            report_interval_secs: Some(10),
            ..Config::default()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("report_interval_secs"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let cfg = Config {
            sample_interval_secs: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_bucket_validation() {
        for buckets in [vec![], vec![0.5, 0.25], vec![0.0, 1.0], vec![0.5, f64::NAN]] {
            let cfg = Config {
                histogram_buckets: Some(buckets.clone()),
                ..Config::default()
            };
            assert!(
                validate_effective_config(&cfg).is_err(),
                "buckets {:?} should be rejected",
                buckets
            );
        }
    }

    #[test]
    fn test_role_validation() {
        let no_roles = Config {
            roles: Some(vec![]),
            ..Config::default()
        };
        assert!(validate_effective_config(&no_roles).is_err());

        let rule = RoleRule {
            role: "worker".into(),
            matches: vec!["zeek".into()],
            cmdline_matches: vec![],
        };
        let duplicate = Config {
            roles: Some(vec![rule.clone(), rule.clone()]),
            ..Config::default()
        };
        assert!(validate_effective_config(&duplicate).is_err());

        let no_matchers = Config {
            roles: Some(vec![RoleRule {
                role: "logger".into(),
                matches: vec![],
                cmdline_matches: vec![],
            }]),
            ..Config::default()
        };
        assert!(validate_effective_config(&no_matchers).is_err());
    }

    #[test]
    fn test_output_and_prefix_validation() {
        let bad_format = Config {
            output_format: Some("xml".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&bad_format).is_err());

        let bad_level = Config {
            log_level: Some("verbose".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&bad_level).is_err());

        let bad_prefix = Config {
            metric_prefix: Some("9lives".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&bad_prefix).is_err());

        let none = Config {
            output_format: Some("none".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&none).is_ok());
        assert_eq!(none.output_format(), None);
    }

    #[test]
    fn test_tls_requires_paths() {
        let cfg = Config {
            enable_tls: Some(true),
            tls_cert_path: Some(PathBuf::from("/tmp/cert.pem")),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_load_config_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("procrate.yaml");
        fs::write(
            &yaml,
            "sample_interval_secs: 5\nmetric_prefix: bro\nroles:\n  - role: worker-1\n    cmdline_matches: [\"-p worker-1\"]\n",
        )
        .unwrap();
        let cfg = load_config(Some(&yaml)).unwrap();
        assert_eq!(cfg.sample_interval_secs, Some(5));
        assert_eq!(cfg.metric_prefix(), "bro");
        assert_eq!(cfg.role_names(), vec!["worker-1"]);
        // unspecified fields fall back to defaults
        assert_eq!(cfg.report_interval_secs, Some(DEFAULT_REPORT_INTERVAL_SECS));
        assert_eq!(cfg.port, Some(DEFAULT_PORT));
        assert!(validate_effective_config(&cfg).is_ok());

        let json = dir.path().join("procrate.json");
        fs::write(&json, r#"{"window_size": 3, "output_format": "text"}"#).unwrap();
        let cfg = load_config(Some(&json)).unwrap();
        assert_eq!(cfg.window_size(), 3);
        assert_eq!(cfg.output_format(), Some(OutputFormat::Text));

        let toml_path = dir.path().join("procrate.toml");
        fs::write(
            &toml_path,
            "port = 9300\n\n[[roles]]\nrole = \"logger\"\nmatches = [\"zeek\"]\n",
        )
        .unwrap();
        let cfg = load_config(Some(&toml_path)).unwrap();
        assert_eq!(cfg.port, Some(9300));
        assert_eq!(cfg.role_rules()[0].matches, vec!["zeek"]);
    }

    #[test]
    fn test_load_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("missing.yaml"))).is_err());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(load_config(Some(&broken)).is_err());
    }

    #[test]
    fn test_is_valid_metric_prefix() {
        assert!(is_valid_metric_prefix("bro"));
        assert!(is_valid_metric_prefix("zeek_cluster:"));
        assert!(!is_valid_metric_prefix(""));
        assert!(!is_valid_metric_prefix("has-dash"));
    }
}
