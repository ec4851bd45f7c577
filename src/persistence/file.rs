//! File-based datastore
//!
//! One JSON document per entity, grouped by kind under the storage
//! directory: `apis/`, `extracts/`, `transforms/`, `runs/`. Runs are
//! append-only.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use super::{paginate, Datastore};
use crate::domain::{ApiConfig, ExtractConfig, RunResult, TransformConfig};
use crate::error::{IntegrationError, IntegrationResult};

const KIND_APIS: &str = "apis";
const KIND_EXTRACTS: &str = "extracts";
const KIND_TRANSFORMS: &str = "transforms";
const KIND_RUNS: &str = "runs";

/// File-backed datastore rooted at a storage directory.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> IntegrationResult<Self> {
        let base_path = base_path.into();
        for kind in [KIND_APIS, KIND_EXTRACTS, KIND_TRANSFORMS, KIND_RUNS] {
            std::fs::create_dir_all(base_path.join(kind)).map_err(|e| {
                IntegrationError::Datastore(format!("failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    fn entity_path(&self, kind: &str, id: &str) -> PathBuf {
        // Ids may come from callers; keep them filesystem-safe
        let safe: String = id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(kind).join(format!("{}.json", safe))
    }

    async fn read_entity<T: DeserializeOwned>(
        &self,
        kind: &str,
        id: &str,
    ) -> IntegrationResult<Option<T>> {
        let path = self.entity_path(kind, id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| IntegrationError::Datastore(format!("failed to read {:?}: {}", path, e)))?;
        let entity = serde_json::from_str(&content)
            .map_err(|e| IntegrationError::Datastore(format!("corrupt entity {:?}: {}", path, e)))?;
        Ok(Some(entity))
    }

    async fn write_entity<T: Serialize>(
        &self,
        kind: &str,
        id: &str,
        entity: &T,
    ) -> IntegrationResult<()> {
        let path = self.entity_path(kind, id);
        let content = serde_json::to_string_pretty(entity)
            .map_err(|e| IntegrationError::Datastore(e.to_string()))?;
        fs::write(&path, content)
            .await
            .map_err(|e| IntegrationError::Datastore(format!("failed to write {:?}: {}", path, e)))
    }

    async fn remove_entity(&self, kind: &str, id: &str) -> IntegrationResult<bool> {
        let path = self.entity_path(kind, id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .await
            .map_err(|e| IntegrationError::Datastore(format!("failed to delete {:?}: {}", path, e)))?;
        Ok(true)
    }

    async fn load_all<T: DeserializeOwned>(&self, kind: &str) -> IntegrationResult<Vec<T>> {
        let dir = self.base_path.join(kind);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| IntegrationError::Datastore(format!("failed to list {:?}: {}", dir, e)))?;
        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IntegrationError::Datastore(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| IntegrationError::Datastore(e.to_string()))?;
            match serde_json::from_str(&content) {
                Ok(entity) => items.push(entity),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt entity file");
                }
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl Datastore for FileStore {
    async fn get_api_config(&self, id: &str) -> IntegrationResult<Option<ApiConfig>> {
        self.read_entity(KIND_APIS, id).await
    }

    async fn upsert_api_config(&self, id: &str, config: &ApiConfig) -> IntegrationResult<()> {
        self.write_entity(KIND_APIS, id, config).await
    }

    async fn delete_api_config(&self, id: &str) -> IntegrationResult<bool> {
        self.remove_entity(KIND_APIS, id).await
    }

    async fn list_api_configs(
        &self,
        limit: usize,
        offset: usize,
    ) -> IntegrationResult<(Vec<ApiConfig>, usize)> {
        let mut items: Vec<ApiConfig> = self.load_all(KIND_APIS).await?;
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(items, limit, offset))
    }

    async fn get_extract_config(&self, id: &str) -> IntegrationResult<Option<ExtractConfig>> {
        self.read_entity(KIND_EXTRACTS, id).await
    }

    async fn upsert_extract_config(
        &self,
        id: &str,
        config: &ExtractConfig,
    ) -> IntegrationResult<()> {
        self.write_entity(KIND_EXTRACTS, id, config).await
    }

    async fn delete_extract_config(&self, id: &str) -> IntegrationResult<bool> {
        self.remove_entity(KIND_EXTRACTS, id).await
    }

    async fn list_extract_configs(
        &self,
        limit: usize,
        offset: usize,
    ) -> IntegrationResult<(Vec<ExtractConfig>, usize)> {
        let mut items: Vec<ExtractConfig> = self.load_all(KIND_EXTRACTS).await?;
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(items, limit, offset))
    }

    async fn get_transform_config(&self, id: &str) -> IntegrationResult<Option<TransformConfig>> {
        self.read_entity(KIND_TRANSFORMS, id).await
    }

    async fn upsert_transform_config(
        &self,
        id: &str,
        config: &TransformConfig,
    ) -> IntegrationResult<()> {
        self.write_entity(KIND_TRANSFORMS, id, config).await
    }

    async fn delete_transform_config(&self, id: &str) -> IntegrationResult<bool> {
        self.remove_entity(KIND_TRANSFORMS, id).await
    }

    async fn list_transform_configs(
        &self,
        limit: usize,
        offset: usize,
    ) -> IntegrationResult<(Vec<TransformConfig>, usize)> {
        let mut items: Vec<TransformConfig> = self.load_all(KIND_TRANSFORMS).await?;
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(items, limit, offset))
    }

    async fn get_run(&self, id: &str) -> IntegrationResult<Option<RunResult>> {
        self.read_entity(KIND_RUNS, id).await
    }

    async fn create_run(&self, run: &RunResult) -> IntegrationResult<()> {
        let path = self.entity_path(KIND_RUNS, &run.id);
        if path.exists() {
            return Err(IntegrationError::Datastore(format!(
                "run {} already recorded",
                run.id
            )));
        }
        self.write_entity(KIND_RUNS, &run.id, run).await
    }

    async fn list_runs(
        &self,
        limit: usize,
        offset: usize,
        config_id: Option<&str>,
    ) -> IntegrationResult<(Vec<RunResult>, usize)> {
        let mut items: Vec<RunResult> = self
            .load_all::<RunResult>(KIND_RUNS)
            .await?
            .into_iter()
            .filter(|r| config_id.is_none_or(|id| r.config_id.as_deref() == Some(id)))
            .collect();
        items.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(paginate(items, limit, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let config = TransformConfig {
            id: "t1".into(),
            version: None,
            created_at: 1,
            updated_at: 1,
            instruction: "full name".into(),
            response_schema: serde_json::json!({"type": "object"}),
            response_mapping: Some("user.first".into()),
            confidence: Some(90),
            confidence_reasoning: None,
        };

        {
            let store = FileStore::new(dir.path()).unwrap();
            store.upsert_transform_config("t1", &config).await.unwrap();
        }

        let reopened = FileStore::new(dir.path()).unwrap();
        let loaded = reopened.get_transform_config("t1").await.unwrap().unwrap();
        assert_eq!(loaded.response_mapping.as_deref(), Some("user.first"));
    }

    #[tokio::test]
    async fn unsafe_ids_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let path = store.entity_path(KIND_APIS, "../../escape");
        assert!(path.starts_with(dir.path().join(KIND_APIS)));
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .contains("escape"));
    }
}
