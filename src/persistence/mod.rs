//! Datastore port and backends
//!
//! The engine consumes a simple keyed config/run store. Backends:
//! in-memory (default), file (one JSON document per entity, grouped by
//! kind), and Redis. Semantics are identical across backends and
//! linearizable per key.

mod file;
mod memory;
mod redis_store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{ApiConfig, ExtractConfig, RunResult, TransformConfig};
use crate::error::IntegrationResult;

/// Port consumed by the engine and the API boundary.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get_api_config(&self, id: &str) -> IntegrationResult<Option<ApiConfig>>;
    async fn upsert_api_config(&self, id: &str, config: &ApiConfig) -> IntegrationResult<()>;
    async fn delete_api_config(&self, id: &str) -> IntegrationResult<bool>;
    async fn list_api_configs(
        &self,
        limit: usize,
        offset: usize,
    ) -> IntegrationResult<(Vec<ApiConfig>, usize)>;

    async fn get_extract_config(&self, id: &str) -> IntegrationResult<Option<ExtractConfig>>;
    async fn upsert_extract_config(
        &self,
        id: &str,
        config: &ExtractConfig,
    ) -> IntegrationResult<()>;
    async fn delete_extract_config(&self, id: &str) -> IntegrationResult<bool>;
    async fn list_extract_configs(
        &self,
        limit: usize,
        offset: usize,
    ) -> IntegrationResult<(Vec<ExtractConfig>, usize)>;

    async fn get_transform_config(&self, id: &str) -> IntegrationResult<Option<TransformConfig>>;
    async fn upsert_transform_config(
        &self,
        id: &str,
        config: &TransformConfig,
    ) -> IntegrationResult<()>;
    async fn delete_transform_config(&self, id: &str) -> IntegrationResult<bool>;
    async fn list_transform_configs(
        &self,
        limit: usize,
        offset: usize,
    ) -> IntegrationResult<(Vec<TransformConfig>, usize)>;

    async fn get_run(&self, id: &str) -> IntegrationResult<Option<RunResult>>;
    /// Runs are append-only; there is no update or upsert.
    async fn create_run(&self, run: &RunResult) -> IntegrationResult<()>;
    async fn list_runs(
        &self,
        limit: usize,
        offset: usize,
        config_id: Option<&str>,
    ) -> IntegrationResult<(Vec<RunResult>, usize)>;

    /// Cache lookup keyed by instruction + inferred data shape.
    async fn get_transform_config_for_request(
        &self,
        instruction: &str,
        data: &Value,
    ) -> IntegrationResult<Option<TransformConfig>> {
        let id = crate::synth::transform::transform_cache_id(instruction, data);
        self.get_transform_config(&id).await
    }
}

/// Apply `limit`/`offset` to a sorted listing, returning the page and
/// the total count before paging.
pub(crate) fn paginate<T>(mut items: Vec<T>, limit: usize, offset: usize) -> (Vec<T>, usize) {
    let total = items.len();
    let page: Vec<T> = items.drain(..).skip(offset).take(limit).collect();
    (page, total)
}
