//! Topology state record
//!
//! Manages the `.stackforge/state.json` file which records every resource the
//! orchestrator has observed to exist. The record is a flat JSON object: a
//! `project_name` string plus one key per completed step whose value is that
//! step's descriptor.
//!
//! A resource name is present in the record if and only if the resource is
//! believed to exist in the cloud. The provisioning orchestrator saves after
//! every completed step; teardown saves after every removal and deletes the
//! file once the record is empty.

use crate::descriptor::ResourceDescriptor;
use crate::error::{CloudError, Result};
use crate::step::StepName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_DIR: &str = ".stackforge";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TEMP: &str = "state.json.tmp";

/// Mapping from step name to descriptor, tagged with the owning project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyState {
    pub project_name: String,

    #[serde(flatten)]
    resources: BTreeMap<StepName, ResourceDescriptor>,
}

impl TopologyState {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            resources: BTreeMap::new(),
        }
    }

    pub fn get(&self, step: StepName) -> Option<&ResourceDescriptor> {
        self.resources.get(&step)
    }

    pub fn contains(&self, step: StepName) -> bool {
        self.resources.contains_key(&step)
    }

    pub fn insert(&mut self, step: StepName, descriptor: ResourceDescriptor) {
        self.resources.insert(step, descriptor);
    }

    pub fn remove(&mut self, step: StepName) -> Option<ResourceDescriptor> {
        self.resources.remove(&step)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Present entries in step order
    pub fn iter(&self) -> impl Iterator<Item = (StepName, &ResourceDescriptor)> {
        self.resources.iter().map(|(step, d)| (*step, d))
    }

    /// Whether every step has an entry
    pub fn is_complete(&self) -> bool {
        StepName::ALL.iter().all(|step| self.contains(*step))
    }

    /// The values the request handlers need, once the backing steps exist
    pub fn outputs(&self) -> Option<TopologyOutputs> {
        Some(TopologyOutputs {
            cache_endpoint: self.get(StepName::Cache)?.get("endpoint")?.to_string(),
            data_bucket: self.get(StepName::DataBucket)?.get("bucket")?.to_string(),
            topic_arn: self
                .get(StepName::MessagingTopic)?
                .get("topic_arn")?
                .to_string(),
        })
    }
}

/// Endpoints consumed by the request handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyOutputs {
    pub cache_endpoint: String,
    pub data_bucket: String,
    pub topic_arn: String,
}

/// Durable storage for the topology record
///
/// Single writer: callers guarantee one orchestrator process at a time.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the record, or an empty state for `project_name` on first run
    async fn load(&self, project_name: &str) -> Result<TopologyState>;

    /// Overwrite the record as a whole
    async fn save(&self, state: &TopologyState) -> Result<()>;

    /// Remove the record entirely. Idempotent.
    async fn delete(&self) -> Result<()>;

    /// Like [`StateStore::load`], but fails when the record belongs to another project
    async fn load_project(&self, project_name: &str) -> Result<TopologyState> {
        let state = self.load(project_name).await?;
        if state.project_name != project_name {
            return Err(CloudError::InvalidConfig(format!(
                "state record belongs to project '{}', not '{}'",
                state.project_name, project_name
            )));
        }
        Ok(state)
    }
}

/// State store backed by a JSON file under the project root
pub struct FileStateStore {
    project_root: PathBuf,
}

impl FileStateStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Path of the state record
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TEMP)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, project_name: &str) -> Result<TopologyState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(TopologyState::new(project_name));
        }

        let content = fs::read_to_string(&path).await?;
        let state: TopologyState = serde_json::from_str(&content)
            .map_err(|e| CloudError::StateCorrupt(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Loaded state with {} resources", state.len());
        Ok(state)
    }

    async fn save(&self, state: &TopologyState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.temp_path();

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&temp, content).await?;

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }

        // rename is atomic on the same filesystem: readers see the old or the new record
        fs::rename(&temp, &path).await?;

        tracing::debug!("Saved state with {} resources", state.len());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        // the backup is a record too; leaving it would claim resources still exist
        for path in [self.state_path(), self.backup_path(), self.temp_path()] {
            if path.exists() {
                fs::remove_file(&path).await?;
                tracing::debug!("Removed state file: {}", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_state() -> TopologyState {
        let mut state = TopologyState::new("file-management");
        state.insert(
            StepName::Network,
            ResourceDescriptor::new()
                .with_attribute("vpc_id", "vpc-0abc")
                .with_attribute("private_subnet_id", "subnet-02"),
        );
        state.insert(
            StepName::DataBucket,
            ResourceDescriptor::new().with_attribute("bucket", "file-management-data"),
        );
        state
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let state = sample_state();
        store.save(&state).await.unwrap();

        let loaded = store.load("file-management").await.unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.contains(StepName::Network));
        assert!(!loaded.contains(StepName::Cache));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let state = store.load("file-management").await.unwrap();
        assert!(state.is_empty());
        assert_eq!(state.project_name, "file-management");
    }

    #[tokio::test]
    async fn test_record_layout_uses_step_names_as_keys() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());
        store.save(&sample_state()).await.unwrap();

        let raw = std::fs::read_to_string(store.state_path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(json["project_name"], "file-management");
        assert_eq!(json["network"]["vpc_id"], "vpc-0abc");
        assert_eq!(json["data-bucket"]["bucket"], "file-management-data");
    }

    #[tokio::test]
    async fn test_corrupt_state_is_reported() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());
        std::fs::create_dir_all(temp_dir.path().join(STATE_DIR)).unwrap();

        std::fs::write(store.state_path(), "{ not json").unwrap();
        let err = store.load("file-management").await.unwrap_err();
        assert!(matches!(err, CloudError::StateCorrupt(_)));

        std::fs::write(
            store.state_path(),
            r#"{"project_name": "file-management", "elasticache": {"cluster_id": "x"}}"#,
        )
        .unwrap();
        let err = store.load("file-management").await.unwrap_err();
        assert!(matches!(err, CloudError::StateCorrupt(_)));
    }

    #[tokio::test]
    async fn test_save_keeps_backup_of_previous_record() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let mut state = TopologyState::new("file-management");
        store.save(&state).await.unwrap();

        state.insert(
            StepName::MessagingTopic,
            ResourceDescriptor::new().with_attribute("topic_arn", "arn:aws:sns:x"),
        );
        store.save(&state).await.unwrap();

        let backup = std::fs::read_to_string(store.backup_path()).unwrap();
        assert!(!backup.contains("messaging-topic"));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        store.save(&sample_state()).await.unwrap();
        store.save(&sample_state()).await.unwrap();
        assert!(store.backup_path().exists());

        store.delete().await.unwrap();
        assert!(!store.state_path().exists());
        assert!(!store.backup_path().exists());
        assert!(!store.temp_path().exists());

        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_project_rejects_foreign_record() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());
        store.save(&sample_state()).await.unwrap();

        assert!(store.load_project("file-management").await.is_ok());
        let err = store.load_project("other-app").await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(msg) if msg.contains("other-app")));
    }

    #[test]
    fn test_outputs_require_backing_steps() {
        let mut state = sample_state();
        assert!(state.outputs().is_none());

        state.insert(
            StepName::Cache,
            ResourceDescriptor::new().with_attribute("endpoint", "redis.internal"),
        );
        state.insert(
            StepName::MessagingTopic,
            ResourceDescriptor::new().with_attribute("topic_arn", "arn:aws:sns:us-east-1:1:t"),
        );

        let outputs = state.outputs().unwrap();
        assert_eq!(outputs.cache_endpoint, "redis.internal");
        assert_eq!(outputs.data_bucket, "file-management-data");
        assert_eq!(outputs.topic_arn, "arn:aws:sns:us-east-1:1:t");
    }
}
