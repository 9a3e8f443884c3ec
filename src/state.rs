//! Application state shared by the HTTP handlers.

use prometheus::Registry;
use std::sync::{Arc, Mutex};

use procrate_exporter::config::Config;
use procrate_exporter::health_stats::HealthStats;
use procrate_exporter::metrics::{ExporterMetrics, RoleMetrics};
use procrate_exporter::store::ReportStore;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub registry: Registry,
    /// Held by a scrape from `reset()` through `gather()` on the shared gauges.
    pub scrape_lock: Mutex<()>,
    pub metrics: RoleMetrics,
    pub exporter: ExporterMetrics,
    pub store: Arc<ReportStore>,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<ReportStore>,
        health_stats: Arc<HealthStats>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();
        let prefix = config.metric_prefix().to_string();
        let metrics = RoleMetrics::new(&registry, &prefix)?;
        let exporter = ExporterMetrics::new(&registry, &prefix)?;

        Ok(Self {
            registry,
            scrape_lock: Mutex::new(()),
            metrics,
            exporter,
            store,
            config,
            health_stats,
        })
    }
}
