//! Redis-backed datastore
//!
//! Entities live under `stitch:{kind}:{id}` with a set of ids per kind
//! for listings. Per-key operations are single Redis commands, which
//! keeps them linearizable.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{paginate, Datastore};
use crate::config::RedisSettings;
use crate::domain::{ApiConfig, ExtractConfig, RunResult, TransformConfig};
use crate::error::{IntegrationError, IntegrationResult};

const KIND_APIS: &str = "apis";
const KIND_EXTRACTS: &str = "extracts";
const KIND_TRANSFORMS: &str = "transforms";
const KIND_RUNS: &str = "runs";

fn store_err(e: redis::RedisError) -> IntegrationError {
    IntegrationError::Datastore(e.to_string())
}

pub struct RedisStore {
    connection: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(settings: &RedisSettings) -> IntegrationResult<Self> {
        let url = settings.url();
        let client = redis::Client::open(url).map_err(store_err)?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(store_err)?;
        Ok(Self { connection })
    }

    fn entity_key(kind: &str, id: &str) -> String {
        format!("stitch:{}:{}", kind, id)
    }

    fn index_key(kind: &str) -> String {
        format!("stitch:{}", kind)
    }

    async fn read_entity<T: DeserializeOwned>(
        &self,
        kind: &str,
        id: &str,
    ) -> IntegrationResult<Option<T>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn
            .get(Self::entity_key(kind, id))
            .await
            .map_err(store_err)?;
        match raw {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| IntegrationError::Datastore(format!("corrupt entity {}: {}", id, e))),
        }
    }

    async fn write_entity<T: Serialize>(
        &self,
        kind: &str,
        id: &str,
        entity: &T,
    ) -> IntegrationResult<()> {
        let raw = serde_json::to_string(entity)
            .map_err(|e| IntegrationError::Datastore(e.to_string()))?;
        let mut conn = self.connection.clone();
        let _: () = conn
            .set(Self::entity_key(kind, id), raw)
            .await
            .map_err(store_err)?;
        let _: () = conn
            .sadd(Self::index_key(kind), id)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn remove_entity(&self, kind: &str, id: &str) -> IntegrationResult<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn
            .del(Self::entity_key(kind, id))
            .await
            .map_err(store_err)?;
        let _: () = conn
            .srem(Self::index_key(kind), id)
            .await
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    async fn load_all<T: DeserializeOwned>(&self, kind: &str) -> IntegrationResult<Vec<T>> {
        let mut conn = self.connection.clone();
        let ids: Vec<String> = conn.smembers(Self::index_key(kind)).await.map_err(store_err)?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.read_entity(kind, &id).await? {
                items.push(entity);
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl Datastore for RedisStore {
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
        if self.read_entity::<RunResult>(KIND_RUNS, &run.id).await?.is_some() {
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
