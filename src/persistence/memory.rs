//! In-memory datastore

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{paginate, Datastore};
use crate::domain::{ApiConfig, ExtractConfig, RunResult, TransformConfig};
use crate::error::{IntegrationError, IntegrationResult};

/// In-memory datastore; state is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    apis: Arc<RwLock<HashMap<String, ApiConfig>>>,
    extracts: Arc<RwLock<HashMap<String, ExtractConfig>>>,
    transforms: Arc<RwLock<HashMap<String, TransformConfig>>>,
    runs: Arc<RwLock<Vec<RunResult>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn get_api_config(&self, id: &str) -> IntegrationResult<Option<ApiConfig>> {
        Ok(self.apis.read().await.get(id).cloned())
    }

    async fn upsert_api_config(&self, id: &str, config: &ApiConfig) -> IntegrationResult<()> {
        self.apis
            .write()
            .await
            .insert(id.to_string(), config.clone());
        Ok(())
    }

    async fn delete_api_config(&self, id: &str) -> IntegrationResult<bool> {
        Ok(self.apis.write().await.remove(id).is_some())
    }

    async fn list_api_configs(
        &self,
        limit: usize,
        offset: usize,
    ) -> IntegrationResult<(Vec<ApiConfig>, usize)> {
        let mut items: Vec<ApiConfig> = self.apis.read().await.values().cloned().collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(items, limit, offset))
    }

    async fn get_extract_config(&self, id: &str) -> IntegrationResult<Option<ExtractConfig>> {
        Ok(self.extracts.read().await.get(id).cloned())
    }

    async fn upsert_extract_config(
        &self,
        id: &str,
        config: &ExtractConfig,
    ) -> IntegrationResult<()> {
        self.extracts
            .write()
            .await
            .insert(id.to_string(), config.clone());
        Ok(())
    }

    async fn delete_extract_config(&self, id: &str) -> IntegrationResult<bool> {
        Ok(self.extracts.write().await.remove(id).is_some())
    }

    async fn list_extract_configs(
        &self,
        limit: usize,
        offset: usize,
    ) -> IntegrationResult<(Vec<ExtractConfig>, usize)> {
        let mut items: Vec<ExtractConfig> = self.extracts.read().await.values().cloned().collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(items, limit, offset))
    }

    async fn get_transform_config(&self, id: &str) -> IntegrationResult<Option<TransformConfig>> {
        Ok(self.transforms.read().await.get(id).cloned())
    }

    async fn upsert_transform_config(
        &self,
        id: &str,
        config: &TransformConfig,
    ) -> IntegrationResult<()> {
        self.transforms
            .write()
            .await
            .insert(id.to_string(), config.clone());
        Ok(())
    }

    async fn delete_transform_config(&self, id: &str) -> IntegrationResult<bool> {
        Ok(self.transforms.write().await.remove(id).is_some())
    }

    async fn list_transform_configs(
        &self,
        limit: usize,
        offset: usize,
    ) -> IntegrationResult<(Vec<TransformConfig>, usize)> {
        let mut items: Vec<TransformConfig> =
            self.transforms.read().await.values().cloned().collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(items, limit, offset))
    }

    async fn get_run(&self, id: &str) -> IntegrationResult<Option<RunResult>> {
        Ok(self.runs.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn create_run(&self, run: &RunResult) -> IntegrationResult<()> {
        let mut runs = self.runs.write().await;
        if runs.iter().any(|r| r.id == run.id) {
            return Err(IntegrationError::Datastore(format!(
                "run {} already recorded",
                run.id
            )));
        }
        runs.push(run.clone());
        Ok(())
    }

    async fn list_runs(
        &self,
        limit: usize,
        offset: usize,
        config_id: Option<&str>,
    ) -> IntegrationResult<(Vec<RunResult>, usize)> {
        let mut items: Vec<RunResult> = self
            .runs
            .read()
            .await
            .iter()
            .filter(|r| config_id.is_none_or(|id| r.config_id.as_deref() == Some(id)))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(paginate(items, limit, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthType, HttpMethod};

    fn config(id: &str, updated_at: u64) -> ApiConfig {
        ApiConfig {
            id: id.to_string(),
            version: None,
            created_at: updated_at,
            updated_at,
            url_host: "https://api.test".into(),
            url_path: None,
            method: HttpMethod::Get,
            headers: None,
            query_params: None,
            body: None,
            authentication: AuthType::None,
            pagination: None,
            data_path: None,
            instruction: "i".into(),
            documentation_url: None,
            response_schema: None,
            response_mapping: None,
        }
    }

    #[tokio::test]
    async fn upsert_get_delete_round_trip() {
        let store = MemoryStore::new();
        store.upsert_api_config("a", &config("a", 1)).await.unwrap();
        assert!(store.get_api_config("a").await.unwrap().is_some());
        assert!(store.delete_api_config("a").await.unwrap());
        assert!(!store.delete_api_config("a").await.unwrap());
        assert!(store.get_api_config("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_sorts_and_paginates() {
        let store = MemoryStore::new();
        for i in 0..5u64 {
            let id = format!("c{}", i);
            store.upsert_api_config(&id, &config(&id, i)).await.unwrap();
        }
        let (page, total) = store.list_api_configs(2, 1).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        // Sorted by updated_at descending, offset skips the newest
        assert_eq!(page[0].id, "c3");
        assert_eq!(page[1].id, "c2");
    }

    #[tokio::test]
    async fn runs_are_append_only() {
        let store = MemoryStore::new();
        let run = crate::domain::RunResult::begin().succeed(serde_json::json!({"ok": true}));
        store.create_run(&run).await.unwrap();
        assert!(store.create_run(&run).await.is_err());
        let (runs, total) = store.list_runs(10, 0, None).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(runs[0].id, run.id);
    }
}
