//! Model deployments per environment, with rollback to an earlier version.
//!
//! Each active deployment is a `{deployment_id}.json` document in the
//! deployment directory. Rolled-back deployments move to `archive/`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, StorageResult, ValidationError};
use crate::reasoning::ContextMap;
use crate::storage::JsonStore;

const FILE_SUFFIX: &str = ".json";
const ARCHIVE_DIR: &str = "archive";

/// A model version deployed to one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub model_id: String,
    pub version: String,
    pub environment: String,
    #[serde(default)]
    pub resources: ContextMap,
    #[serde(default)]
    pub metadata: ContextMap,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    Active,
    Archived,
}

/// Result of [`ModelDeployer::get_deployment_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub deployment_id: String,
    pub model_id: String,
    pub version: String,
    pub environment: String,
    pub resources: ContextMap,
    pub metadata: ContextMap,
    pub status: DeploymentState,
}

/// Tracks active deployments and archives the ones replaced by a rollback.
#[derive(Debug)]
pub struct ModelDeployer {
    store: JsonStore,
    archive: JsonStore,
    active: BTreeMap<String, DeploymentConfig>,
}

fn file_name(deployment_id: &str) -> String {
    format!("{deployment_id}{FILE_SUFFIX}")
}

/// Deployment ids double as file names, so their parts must stay inside the
/// deployment directory.
fn check_part(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::field(field, "cannot be empty"));
    }
    if value.contains(['/', '\\']) || value.contains("..") {
        return Err(ValidationError::field(
            field,
            "cannot contain path separators or '..'",
        ));
    }
    Ok(())
}

impl ModelDeployer {
    /// Open the deployment directory and load the active deployments in it.
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = JsonStore::open(dir)?;
        let archive = JsonStore::open(store.path_of(ARCHIVE_DIR))?;

        let mut active = BTreeMap::new();
        for name in store.list("", FILE_SUFFIX)? {
            match store.load::<DeploymentConfig>(&name) {
                Ok(config) => {
                    let id = name.trim_end_matches(FILE_SUFFIX).to_string();
                    active.insert(id, config);
                }
                Err(e) => warn!(error = %e, file = %name, "Skipping unreadable deployment file"),
            }
        }

        info!(count = active.len(), "Deployments loaded");
        Ok(Self {
            store,
            archive,
            active,
        })
    }

    /// Deploy `version` of `model_id` to `environment`.
    ///
    /// Returns the deployment id `{model_id}-{version}-{environment}`.
    /// Deploying the same triple again replaces the stored configuration.
    pub fn deploy_model(
        &mut self,
        model_id: &str,
        version: &str,
        environment: &str,
        resources: Option<ContextMap>,
        metadata: Option<ContextMap>,
    ) -> AppResult<String> {
        check_part("model_id", model_id)?;
        check_part("version", version)?;
        check_part("environment", environment)?;

        let deployment_id = format!("{model_id}-{version}-{environment}");
        let config = DeploymentConfig {
            model_id: model_id.to_string(),
            version: version.to_string(),
            environment: environment.to_string(),
            resources: resources.unwrap_or_default(),
            metadata: metadata.unwrap_or_default(),
            timestamp: Utc::now(),
        };

        self.store.save(&file_name(&deployment_id), &config)?;
        info!(deployment_id = %deployment_id, "Model deployed");
        self.active.insert(deployment_id.clone(), config);
        Ok(deployment_id)
    }

    /// Replace an active deployment with `target_version` of the same model.
    ///
    /// The new deployment keeps the resources and metadata, adding
    /// `rollback_from` and `rollback_timestamp`. The old deployment is
    /// archived. Returns the new deployment id.
    pub fn rollback_deployment(
        &mut self,
        deployment_id: &str,
        target_version: &str,
    ) -> AppResult<String> {
        let current = self
            .active
            .get(deployment_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Deployment", deployment_id))?;

        if current.version == target_version {
            return Err(ValidationError::field(
                "target_version",
                format!("{target_version} is already deployed"),
            )
            .into());
        }

        let mut metadata = current.metadata.clone();
        metadata.insert(
            "rollback_from".to_string(),
            Value::String(current.version.clone()),
        );
        metadata.insert(
            "rollback_timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        let new_id = self.deploy_model(
            &current.model_id,
            target_version,
            &current.environment,
            Some(current.resources.clone()),
            Some(metadata),
        )?;

        self.archive_deployment(deployment_id, &current)?;
        info!(from = %deployment_id, to = %new_id, "Deployment rolled back");
        Ok(new_id)
    }

    fn archive_deployment(&mut self, deployment_id: &str, config: &DeploymentConfig) -> AppResult<()> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        self.archive
            .save(&format!("{deployment_id}_{stamp}{FILE_SUFFIX}"), config)?;
        self.store.delete(&file_name(deployment_id))?;
        self.active.remove(deployment_id);
        Ok(())
    }

    /// Status of an active deployment.
    ///
    /// A deployment whose file was removed behind the deployer's back
    /// reports [`DeploymentState::Archived`].
    pub fn get_deployment_status(&self, deployment_id: &str) -> AppResult<DeploymentStatus> {
        let config = self
            .active
            .get(deployment_id)
            .ok_or_else(|| AppError::not_found("Deployment", deployment_id))?;

        let status = if self.store.exists(&file_name(deployment_id)) {
            DeploymentState::Active
        } else {
            DeploymentState::Archived
        };

        Ok(DeploymentStatus {
            deployment_id: deployment_id.to_string(),
            model_id: config.model_id.clone(),
            version: config.version.clone(),
            environment: config.environment.clone(),
            resources: config.resources.clone(),
            metadata: config.metadata.clone(),
            status,
        })
    }

    /// Ids of the active deployments, sorted.
    pub fn active_deployments(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    /// Names of the archived deployment files, sorted.
    pub fn archived_deployments(&self) -> StorageResult<Vec<String>> {
        self.archive.list("", FILE_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn map(value: Value) -> ContextMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_deploy_model_saves_config() {
        let dir = TempDir::new().unwrap();
        let mut deployer = ModelDeployer::open(dir.path()).unwrap();

        let id = deployer
            .deploy_model(
                "ranker",
                "v2",
                "prod",
                Some(map(json!({"replicas": 3}))),
                None,
            )
            .unwrap();

        assert_eq!(id, "ranker-v2-prod");
        assert!(dir.path().join("ranker-v2-prod.json").is_file());
        assert_eq!(deployer.active_deployments(), vec![id.clone()]);

        let status = deployer.get_deployment_status(&id).unwrap();
        assert_eq!(status.model_id, "ranker");
        assert_eq!(status.version, "v2");
        assert_eq!(status.environment, "prod");
        assert_eq!(status.resources["replicas"], 3);
        assert!(status.metadata.is_empty());
        assert_eq!(status.status, DeploymentState::Active);
    }

    #[test]
    fn test_rollback_archives_previous_deployment() {
        let dir = TempDir::new().unwrap();
        let mut deployer = ModelDeployer::open(dir.path()).unwrap();
        let id = deployer
            .deploy_model(
                "ranker",
                "v2",
                "prod",
                Some(map(json!({"replicas": 3}))),
                Some(map(json!({"owner": "ml"}))),
            )
            .unwrap();

        let new_id = deployer.rollback_deployment(&id, "v1").unwrap();

        assert_eq!(new_id, "ranker-v1-prod");
        assert_eq!(deployer.active_deployments(), vec![new_id.clone()]);
        assert!(!dir.path().join("ranker-v2-prod.json").exists());

        let status = deployer.get_deployment_status(&new_id).unwrap();
        assert_eq!(status.version, "v1");
        assert_eq!(status.resources["replicas"], 3);
        assert_eq!(status.metadata["owner"], "ml");
        assert_eq!(status.metadata["rollback_from"], "v2");
        assert!(status.metadata["rollback_timestamp"].is_string());

        let archived = deployer.archived_deployments().unwrap();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].starts_with("ranker-v2-prod_"));

        let err = deployer.get_deployment_status(&id).unwrap_err();
        assert_eq!(err.to_string(), "Deployment not found: ranker-v2-prod");
    }

    #[test]
    fn test_rollback_unknown_deployment() {
        let dir = TempDir::new().unwrap();
        let mut deployer = ModelDeployer::open(dir.path()).unwrap();
        let err = deployer.rollback_deployment("ghost-v1-prod", "v0").unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        assert!(deployer.archived_deployments().unwrap().is_empty());
    }

    #[test]
    fn test_rollback_to_same_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut deployer = ModelDeployer::open(dir.path()).unwrap();
        let id = deployer.deploy_model("ranker", "v1", "dev", None, None).unwrap();

        let err = deployer.rollback_deployment(&id, "v1").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            deployer.get_deployment_status(&id).unwrap().status,
            DeploymentState::Active
        );
    }

    #[test]
    fn test_removed_file_reports_archived() {
        let dir = TempDir::new().unwrap();
        let mut deployer = ModelDeployer::open(dir.path()).unwrap();
        let id = deployer.deploy_model("ranker", "v1", "dev", None, None).unwrap();

        std::fs::remove_file(dir.path().join("ranker-v1-dev.json")).unwrap();
        assert_eq!(
            deployer.get_deployment_status(&id).unwrap().status,
            DeploymentState::Archived
        );
    }

    #[test]
    fn test_reopen_loads_active_deployments() {
        let dir = TempDir::new().unwrap();
        {
            let mut deployer = ModelDeployer::open(dir.path()).unwrap();
            let id = deployer.deploy_model("ranker", "v2", "prod", None, None).unwrap();
            deployer.deploy_model("scorer", "v1", "dev", None, None).unwrap();
            deployer.rollback_deployment(&id, "v1").unwrap();
        }
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let deployer = ModelDeployer::open(dir.path()).unwrap();
        assert_eq!(
            deployer.active_deployments(),
            vec!["ranker-v1-prod".to_string(), "scorer-v1-dev".to_string()]
        );
    }

    #[test]
    fn test_deploy_rejects_path_like_parts() {
        let dir = TempDir::new().unwrap();
        let mut deployer = ModelDeployer::open(dir.path()).unwrap();

        for (model, version, env) in [
            ("../evil", "v1", "prod"),
            ("ranker", "v1/..", "prod"),
            ("ranker", "v1", "a\\b"),
            ("ranker", " ", "prod"),
        ] {
            let err = deployer.deploy_model(model, version, env, None, None).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{model} {version} {env}");
        }
        assert!(deployer.active_deployments().is_empty());
    }
}
