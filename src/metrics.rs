//! Request counters persisted as JSON snapshots.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StorageResult;
use crate::storage::JsonStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainStats {
    pub requests: u64,
    pub errors: u64,
}

/// Counters accumulated since the collector was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    /// Request latencies in seconds.
    pub latencies: Vec<f64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub model_usage: BTreeMap<String, u64>,
    pub domain_stats: BTreeMap<String, DomainStats>,
    pub timestamp: DateTime<Utc>,
}

impl MetricsSnapshot {
    fn new() -> Self {
        Self {
            requests: 0,
            errors: 0,
            latencies: Vec::new(),
            cache_hits: 0,
            cache_misses: 0,
            model_usage: BTreeMap::new(),
            domain_stats: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Mean latency in seconds, 0 without requests.
    pub fn average_latency(&self) -> f64 {
        crate::reasoning::mean(&self.latencies)
    }
}

/// Collects per-request metrics for the decision maker.
#[derive(Debug)]
pub struct MetricsCollector {
    /// Snapshot directory, created on the first save.
    dir: Option<PathBuf>,
    current: MetricsSnapshot,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl MetricsCollector {
    /// Collector that writes snapshots into `store`.
    pub fn new(store: JsonStore) -> Self {
        Self::in_dir(store.root())
    }

    /// Collector that writes snapshots into `dir`. Nothing touches the
    /// filesystem until [`save`](Self::save).
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            current: MetricsSnapshot::new(),
        }
    }

    /// Collector without persistence; [`save`](Self::save) is a no-op.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            current: MetricsSnapshot::new(),
        }
    }

    pub fn record_request(
        &mut self,
        latency: Duration,
        model: &str,
        domain: &str,
        cache_hit: bool,
        error: bool,
    ) {
        let m = &mut self.current;
        m.requests += 1;
        m.latencies.push(latency.as_secs_f64());
        if error {
            m.errors += 1;
        }
        if cache_hit {
            m.cache_hits += 1;
        } else {
            m.cache_misses += 1;
        }
        *m.model_usage.entry(model.to_string()).or_insert(0) += 1;

        let stats = m.domain_stats.entry(domain.to_string()).or_default();
        stats.requests += 1;
        if error {
            stats.errors += 1;
        }
    }

    pub fn snapshot(&self) -> &MetricsSnapshot {
        &self.current
    }

    /// Write the current metrics to `metrics_<timestamp>.json`.
    ///
    /// Returns the document name, or `None` for an in-memory collector.
    pub fn save(&self) -> StorageResult<Option<String>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let store = JsonStore::open(dir)?;
        let name = format!("metrics_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
        store.save(&name, &self.current)?;
        info!(file = %name, requests = self.current.requests, "Metrics saved");
        Ok(Some(name))
    }
}
