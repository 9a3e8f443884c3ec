//! Concurrent store of the latest report per role.
//!
//! Writers are expected to be serialized by the caller (the reporting
//! scheduler is the only one calling `insert`); any number of readers may run
//! alongside. Every read holds the read guard for the whole traversal, so a
//! reader sees either the previous or the next report for a role, never a
//! mix of both.

use ahash::AHashMap as HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::report::{IntervalReport, WireReport};

/// Errors returned by the store's read paths.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no report available for role '{role}'")]
    NotFound { role: String },

    #[error("zero summaries currently available")]
    Empty,

    #[error("failed to serialize reports: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Role -> most recent `IntervalReport`.
#[derive(Default)]
pub struct ReportStore {
    reports: RwLock<HashMap<String, IntervalReport>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    // The map only ever holds complete reports, so a panic in another
    // holder cannot leave it half-updated.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, IntervalReport>> {
        self.reports.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, IntervalReport>> {
        self.reports.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the entry for `report.role`.
    pub fn insert(&self, report: IntervalReport) {
        self.write().insert(report.role.clone(), report);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Exact lookup; `None` when the role never reported.
    pub fn find_by_role(&self, role: &str) -> Option<IntervalReport> {
        self.read().get(role).cloned()
    }

    /// Serializes one role's report with undefined rates mapped to -1.
    pub fn role_to_json(&self, role: &str) -> Result<Vec<u8>, StoreError> {
        let guard = self.read();
        let report = guard.get(role).ok_or_else(|| StoreError::NotFound {
            role: role.to_string(),
        })?;
        Ok(serde_json::to_vec(&report.to_wire())?)
    }

    /// Serializes every report as a JSON array. Order follows the map's
    /// iteration order and is not stable between calls.
    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        let guard = self.read();
        let wire: Vec<WireReport> = guard.values().map(IntervalReport::to_wire).collect();
        Ok(serde_json::to_vec(&wire)?)
    }

    /// All reports as stored; `StoreError::Empty` when nothing arrived yet.
    pub fn all(&self) -> Result<Vec<IntervalReport>, StoreError> {
        let guard = self.read();
        if guard.is_empty() {
            return Err(StoreError::Empty);
        }
        Ok(guard.values().cloned().collect())
    }

    /// Text exposition of every report, roles sorted by name.
    pub fn to_text(&self, prefix: &str) -> String {
        let guard = self.read();
        let mut reports: Vec<&IntervalReport> = guard.values().collect();
        reports.sort_by(|a, b| a.role.cmp(&b.role));
        reports.iter().map(|r| r.to_exposition(prefix)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn report(role: &str, pid: u32, current_rate: Option<f64>) -> IntervalReport {
        IntervalReport {
            role: role.to_string(),
            pid,
            first_seen: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            last_seen: Utc.timestamp_opt(1_700_000_030, 0).unwrap(),
            age: Duration::from_secs(30),
            window_rate: Some(0.3),
            standard_dev: Some(f64::NAN),
            lifetime_rate: None,
            current_rate,
            times_restarted: 0,
            virtual_memory_bytes: 4096,
            rss_bytes: 1024,
            rate_histogram: BTreeMap::new(),
        }
    }

    #[test]
    fn test_empty_store() {
        let store = ReportStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.find_by_role("alpha").is_none());
        assert!(matches!(store.all(), Err(StoreError::Empty)));
        assert_eq!(store.to_json().unwrap(), b"[]");
        assert_eq!(store.to_text("procrate"), "");
    }

    #[test]
    fn test_insert_then_find_returns_same_report() {
        let store = ReportStore::new();
        let mut beta = report("beta", 2, Some(0.7));
        beta.standard_dev = Some(0.05);
        beta.lifetime_rate = Some(0.6);
        beta.times_restarted = 3;
        beta.rate_histogram.insert("0-10%".to_string(), 4);
        store.insert(report("alpha", 1, None));
        store.insert(beta.clone());

        assert_eq!(store.find_by_role("beta"), Some(beta));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_find_keeps_undefined_rates_untouched() {
        let store = ReportStore::new();
        let alpha = report("alpha", 1, None);
        store.insert(alpha.clone());

        let mut found = store.find_by_role("alpha").unwrap();
        assert!(found.current_rate.is_none());
        assert!(found.lifetime_rate.is_none());
        assert_eq!(
            found.standard_dev.map(f64::to_bits),
            alpha.standard_dev.map(f64::to_bits)
        );
        found.standard_dev = None;
        let mut expected = alpha;
        expected.standard_dev = None;
        assert_eq!(found, expected);
    }

    #[test]
    fn test_insert_replaces_existing_role() {
        let store = ReportStore::new();
        store.insert(report("alpha", 1, Some(0.1)));
        store.insert(report("alpha", 9, Some(0.9)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.find_by_role("alpha").unwrap().pid, 9);
    }

    #[test]
    fn test_role_to_json_sanitizes_copy() {
        let store = ReportStore::new();
        store.insert(report("alpha", 1, None));

        let bytes = store.role_to_json("alpha").unwrap();
        let wire: WireReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(wire.current_rate, -1.0);
        assert_eq!(wire.standard_dev, -1.0);
        assert_eq!(wire.lifetime_rate, -1.0);
        assert_eq!(wire.window_rate, 0.3);

        let stored = store.find_by_role("alpha").unwrap();
        assert!(stored.current_rate.is_none());
        assert!(stored.standard_dev.unwrap().is_nan());
    }

    #[test]
    fn test_role_to_json_not_found() {
        let store = ReportStore::new();
        let err = store.role_to_json("ghost").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { ref role } if role == "ghost"));
        assert_eq!(err.to_string(), "no report available for role 'ghost'");
    }

    #[test]
    fn test_to_json_contains_every_role() {
        let store = ReportStore::new();
        store.insert(report("alpha", 1, Some(0.2)));
        store.insert(report("beta", 2, None));

        let wire: Vec<WireReport> = serde_json::from_slice(&store.to_json().unwrap()).unwrap();
        let mut roles: Vec<&str> = wire.iter().map(|w| w.role.as_str()).collect();
        roles.sort();
        assert_eq!(roles, vec!["alpha", "beta"]);
        assert!(wire.iter().all(|w| w.standard_dev == -1.0));
    }

    #[test]
    fn test_to_text_is_sorted_by_role() {
        let store = ReportStore::new();
        store.insert(report("worker", 2, None));
        store.insert(report("logger", 1, None));
        let text = store.to_text("bro");
        assert_eq!(text.lines().count(), 8);
        assert!(text.starts_with("bro_pid{role=\"logger\"} 1\n"));
    }
}
