//! Model weight snapshots with parent links, rollback and comparison.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{AppError, AppResult, StorageResult};
use crate::reasoning::{diff_maps, ContextMap, ValueChange};
use crate::storage::JsonStore;

const FILE_PREFIX: &str = "version_";
const FILE_SUFFIX: &str = ".json";

/// A saved set of model weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version_id: String,
    pub timestamp: DateTime<Utc>,
    pub weights: BTreeMap<String, f64>,
    pub performance_metrics: BTreeMap<String, f64>,
    pub metadata: ContextMap,
    pub parent_version: Option<String>,
}

/// One entry of [`VersionController::get_version_history`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version_id: String,
    pub timestamp: DateTime<Utc>,
    pub performance: BTreeMap<String, f64>,
    pub metadata: ContextMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericChange {
    pub from: f64,
    pub to: f64,
    pub diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub weight_changes: BTreeMap<String, NumericChange>,
    pub performance_changes: BTreeMap<String, NumericChange>,
    pub metadata_changes: BTreeMap<String, ValueChange>,
    /// Seconds from the first version to the second.
    pub time_difference: f64,
}

/// Tracks model versions persisted as `version_{id}.json` files.
#[derive(Debug)]
pub struct VersionController {
    store: JsonStore,
    versions: HashMap<String, ModelVersion>,
    current_version: Option<String>,
}

impl VersionController {
    /// Open the version directory and load every stored version.
    ///
    /// The newest version becomes current. Unreadable files are skipped.
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = JsonStore::open(dir)?;

        let mut loaded = Vec::new();
        for name in store.list(FILE_PREFIX, FILE_SUFFIX)? {
            match store.load::<ModelVersion>(&name) {
                Ok(version) => loaded.push(version),
                Err(e) => warn!(error = %e, file = %name, "Skipping unreadable version file"),
            }
        }
        loaded.sort_by_key(|v| v.timestamp);

        let current_version = loaded.last().map(|v| v.version_id.clone());
        let versions = loaded
            .into_iter()
            .map(|v| (v.version_id.clone(), v))
            .collect::<HashMap<_, _>>();

        info!(
            count = versions.len(),
            current = ?current_version,
            "Model versions loaded"
        );

        Ok(Self {
            store,
            versions,
            current_version,
        })
    }

    /// Snapshot `weights` as a child of the current version and make it current.
    pub fn create_version(
        &mut self,
        weights: BTreeMap<String, f64>,
        performance_metrics: BTreeMap<String, f64>,
        metadata: ContextMap,
    ) -> AppResult<String> {
        let timestamp = Utc::now();
        let version = ModelVersion {
            version_id: version_id(&weights, timestamp),
            timestamp,
            weights,
            performance_metrics,
            metadata,
            parent_version: self.current_version.clone(),
        };

        self.store.save(&file_name(&version.version_id), &version)?;

        let id = version.version_id.clone();
        info!(version_id = %id, parent = ?version.parent_version, "Model version created");
        self.versions.insert(id.clone(), version);
        self.current_version = Some(id.clone());
        Ok(id)
    }

    /// Make an existing version current.
    pub fn rollback(&mut self, version_id: &str) -> AppResult<&ModelVersion> {
        if !self.versions.contains_key(version_id) {
            return Err(AppError::not_found("Version", version_id));
        }

        info!(version_id = %version_id, "Rolled back model version");
        self.current_version = Some(version_id.to_string());
        self.versions
            .get(version_id)
            .ok_or_else(|| AppError::not_found("Version", version_id))
    }

    /// The current version followed by its ancestors.
    pub fn get_version_history(&self) -> Vec<VersionSummary> {
        let mut history = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = self.current_version.as_deref();

        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            let Some(version) = self.versions.get(id) else {
                break;
            };
            history.push(VersionSummary {
                version_id: version.version_id.clone(),
                timestamp: version.timestamp,
                performance: version.performance_metrics.clone(),
                metadata: version.metadata.clone(),
            });
            current = version.parent_version.as_deref();
        }
        history
    }

    /// Differences from `first_id` to `second_id`. Missing weights and metrics count as 0.
    pub fn compare_versions(&self, first_id: &str, second_id: &str) -> AppResult<VersionComparison> {
        let first = self
            .get_version(first_id)
            .ok_or_else(|| AppError::not_found("Version", first_id))?;
        let second = self
            .get_version(second_id)
            .ok_or_else(|| AppError::not_found("Version", second_id))?;

        Ok(VersionComparison {
            weight_changes: numeric_changes(&first.weights, &second.weights),
            performance_changes: numeric_changes(
                &first.performance_metrics,
                &second.performance_metrics,
            ),
            metadata_changes: diff_maps(&first.metadata, &second.metadata),
            time_difference: (second.timestamp - first.timestamp)
                .num_microseconds()
                .unwrap_or(0) as f64
                / 1_000_000.0,
        })
    }

    pub fn get_version(&self, version_id: &str) -> Option<&ModelVersion> {
        self.versions.get(version_id)
    }

    pub fn current_version(&self) -> Option<&ModelVersion> {
        self.current_version
            .as_deref()
            .and_then(|id| self.versions.get(id))
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

fn file_name(version_id: &str) -> String {
    format!("{FILE_PREFIX}{version_id}{FILE_SUFFIX}")
}

/// First 8 hex chars of SHA-256 over the sorted weights and the creation time.
fn version_id(weights: &BTreeMap<String, f64>, timestamp: DateTime<Utc>) -> String {
    let weights_json = serde_json::to_string(weights).unwrap_or_default();
    let content = format!(
        "{}:{}",
        weights_json,
        timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
    );
    let digest = hex::encode(Sha256::digest(content.as_bytes()));
    digest[..8].to_string()
}

fn numeric_changes(
    before: &BTreeMap<String, f64>,
    after: &BTreeMap<String, f64>,
) -> BTreeMap<String, NumericChange> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let from = before.get(key).copied().unwrap_or(0.0);
            let to = after.get(key).copied().unwrap_or(0.0);
            (from != to).then(|| {
                (
                    key.clone(),
                    NumericChange {
                        from,
                        to,
                        diff: to - from,
                    },
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn meta(value: serde_json::Value) -> ContextMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_version_links_parent() {
        let dir = TempDir::new().unwrap();
        let mut vc = VersionController::open(dir.path()).unwrap();
        assert!(vc.is_empty());

        let first = vc
            .create_version(weights(&[("a", 0.5)]), weights(&[("accuracy", 0.8)]), ContextMap::new())
            .unwrap();
        let second = vc
            .create_version(weights(&[("a", 0.6)]), weights(&[("accuracy", 0.9)]), ContextMap::new())
            .unwrap();

        assert_eq!(first.len(), 8);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
        assert_eq!(vc.current_version().unwrap().version_id, second);
        assert_eq!(vc.get_version(&second).unwrap().parent_version, Some(first.clone()));
        assert!(dir.path().join(format!("version_{first}.json")).is_file());
    }

    #[test]
    fn test_history_follows_parents() {
        let dir = TempDir::new().unwrap();
        let mut vc = VersionController::open(dir.path()).unwrap();
        let a = vc.create_version(weights(&[]), weights(&[]), ContextMap::new()).unwrap();
        let b = vc.create_version(weights(&[]), weights(&[]), ContextMap::new()).unwrap();
        let c = vc.create_version(weights(&[]), weights(&[]), ContextMap::new()).unwrap();

        let ids: Vec<_> = vc.get_version_history().into_iter().map(|v| v.version_id).collect();
        assert_eq!(ids, vec![c, b.clone(), a.clone()]);

        vc.rollback(&b).unwrap();
        let ids: Vec<_> = vc.get_version_history().into_iter().map(|v| v.version_id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn test_rollback_unknown_version() {
        let dir = TempDir::new().unwrap();
        let mut vc = VersionController::open(dir.path()).unwrap();
        let err = vc.rollback("deadbeef").unwrap_err();
        assert_eq!(err.to_string(), "Version not found: deadbeef");
    }

    #[test]
    fn test_compare_versions() {
        let dir = TempDir::new().unwrap();
        let mut vc = VersionController::open(dir.path()).unwrap();
        let a = vc
            .create_version(
                weights(&[("risk:1", 0.5), ("gone", 0.2)]),
                weights(&[("accuracy", 0.8)]),
                meta(json!({"note": "baseline"})),
            )
            .unwrap();
        let b = vc
            .create_version(
                weights(&[("risk:1", 0.75), ("new", 0.4)]),
                weights(&[("accuracy", 0.8)]),
                meta(json!({"note": "tuned"})),
            )
            .unwrap();

        let cmp = vc.compare_versions(&a, &b).unwrap();
        assert_eq!(cmp.weight_changes.len(), 3);
        assert_eq!(cmp.weight_changes["risk:1"].diff, 0.25);
        assert_eq!(cmp.weight_changes["gone"].to, 0.0);
        assert_eq!(cmp.weight_changes["new"].from, 0.0);
        assert!(cmp.performance_changes.is_empty());
        assert_eq!(
            cmp.metadata_changes["note"],
            ValueChange::Changed {
                from: json!("baseline"),
                to: json!("tuned")
            }
        );
        assert!(cmp.time_difference >= 0.0);

        assert!(vc.compare_versions(&a, "missing").is_err());
    }

    #[test]
    fn test_reload_picks_newest_as_current() {
        let dir = TempDir::new().unwrap();
        let (first, last) = {
            let mut vc = VersionController::open(dir.path()).unwrap();
            let first = vc.create_version(weights(&[("a", 1.0)]), weights(&[]), ContextMap::new()).unwrap();
            let last = vc.create_version(weights(&[("a", 2.0)]), weights(&[]), ContextMap::new()).unwrap();
            vc.rollback(&first).unwrap();
            (first, last)
        };

        let reloaded = VersionController::open(dir.path()).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.current_version().unwrap().version_id, last);
        assert!(reloaded.get_version(&first).is_some());
    }

    #[test]
    fn test_reload_skips_corrupt_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("version_bad.json"), "not json").unwrap();

        let vc = VersionController::open(dir.path()).unwrap();
        assert!(vc.is_empty());
        assert!(vc.current_version().is_none());
    }
}
