//! GraphQL API surface
//!
//! Queries and mutations over the integration engine and the
//! datastore, served at `POST /graphql`. Scalars that carry untyped
//! JSON (payloads, schemas, run data) use the `Json` wrapper; entity
//! enums mirror the domain enums via remote derivation.

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql::{
    Context, EmptySubscription, Enum, InputObject, Json, Object, Result as GqlResult, Schema,
    SimpleObject,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use serde_json::Value;

use crate::domain::{
    ApiConfig, ApiInput, ExtractConfig, ExtractInput, PaginationConfig, RequestOptions, RunResult,
    TransformConfig, TransformInput,
};
use crate::engine::handler::IntegrationHandler;
use crate::persistence::Datastore;

// ============================================================================
// GRAPHQL TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(remote = "crate::domain::HttpMethod")]
pub enum GqlHttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(remote = "crate::domain::AuthType")]
pub enum GqlAuthType {
    None,
    Header,
    QueryParam,
    Oauth2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(remote = "crate::domain::PaginationType")]
pub enum GqlPaginationType {
    OffsetBased,
    PageBased,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(remote = "crate::domain::DecompressionMethod")]
pub enum GqlDecompressionMethod {
    Gzip,
    Deflate,
    Zip,
    Auto,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(remote = "crate::domain::FileType")]
pub enum GqlFileType {
    Csv,
    Json,
    Xml,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(remote = "crate::domain::CacheMode")]
pub enum GqlCacheMode {
    Enabled,
    Readonly,
    Writeonly,
    Disabled,
}

#[derive(Debug, Clone, InputObject)]
pub struct GqlPaginationInput {
    pub pagination_type: GqlPaginationType,
    #[graphql(default = 50)]
    pub page_size: u32,
}

impl From<GqlPaginationInput> for PaginationConfig {
    fn from(input: GqlPaginationInput) -> Self {
        PaginationConfig {
            pagination_type: input.pagination_type.into(),
            page_size: input.page_size,
        }
    }
}

/// Request input: a stored config id, or an inline endpoint
/// description (instruction required in that case).
#[derive(Debug, Clone, InputObject)]
pub struct GqlApiInput {
    pub id: Option<String>,
    pub instruction: Option<String>,
    pub url_host: Option<String>,
    pub url_path: Option<String>,
    pub method: Option<GqlHttpMethod>,
    pub headers: Option<Json<HashMap<String, String>>>,
    pub query_params: Option<Json<HashMap<String, String>>>,
    pub body: Option<String>,
    pub authentication: Option<GqlAuthType>,
    pub pagination: Option<GqlPaginationInput>,
    pub data_path: Option<String>,
    pub documentation_url: Option<String>,
    pub response_schema: Option<Json<Value>>,
    pub response_mapping: Option<String>,
}

impl GqlApiInput {
    fn into_domain(self) -> GqlResult<ApiInput> {
        if self.id.is_none() && self.instruction.as_deref().unwrap_or("").is_empty() {
            return Err("input requires either an id or an instruction".into());
        }
        Ok(ApiInput {
            id: self.id,
            instruction: self.instruction.unwrap_or_default(),
            url_host: self.url_host,
            url_path: self.url_path,
            method: self.method.map(Into::into),
            headers: self.headers.map(|j| j.0),
            query_params: self.query_params.map(|j| j.0),
            body: self.body,
            authentication: self.authentication.map(Into::into),
            pagination: self.pagination.map(Into::into),
            data_path: self.data_path,
            documentation_url: self.documentation_url,
            response_schema: self.response_schema.map(|j| j.0),
            response_mapping: self.response_mapping,
        })
    }
}

#[derive(Debug, Clone, InputObject)]
pub struct GqlExtractInput {
    pub id: Option<String>,
    pub instruction: Option<String>,
    pub url_host: Option<String>,
    pub url_path: Option<String>,
    pub method: Option<GqlHttpMethod>,
    pub headers: Option<Json<HashMap<String, String>>>,
    pub query_params: Option<Json<HashMap<String, String>>>,
    pub authentication: Option<GqlAuthType>,
    pub decompression_method: Option<GqlDecompressionMethod>,
    pub file_type: Option<GqlFileType>,
    pub data_path: Option<String>,
    pub documentation_url: Option<String>,
    /// Base64-encoded file contents uploaded directly
    pub file: Option<String>,
    pub response_schema: Option<Json<Value>>,
    pub response_mapping: Option<String>,
}

impl GqlExtractInput {
    fn into_domain(self) -> GqlResult<ExtractInput> {
        if self.id.is_none()
            && self.file.is_none()
            && self.instruction.as_deref().unwrap_or("").is_empty()
        {
            return Err("input requires an id, a file, or an instruction".into());
        }
        let file = match self.file {
            Some(encoded) => Some(decode_base64(&encoded)?),
            None => None,
        };
        Ok(ExtractInput {
            id: self.id,
            instruction: self.instruction.unwrap_or_default(),
            url_host: self.url_host,
            url_path: self.url_path,
            method: self.method.map(Into::into),
            headers: self.headers.map(|j| j.0),
            query_params: self.query_params.map(|j| j.0),
            authentication: self.authentication.map(Into::into),
            decompression_method: self.decompression_method.map(Into::into),
            file_type: self.file_type.map(Into::into),
            data_path: self.data_path,
            documentation_url: self.documentation_url,
            file,
            response_schema: self.response_schema.map(|j| j.0),
            response_mapping: self.response_mapping,
        })
    }
}

#[derive(Debug, Clone, InputObject)]
pub struct GqlTransformInput {
    pub id: Option<String>,
    pub instruction: Option<String>,
    pub response_schema: Option<Json<Value>>,
    pub response_mapping: Option<String>,
}

impl From<GqlTransformInput> for TransformInput {
    fn from(input: GqlTransformInput) -> Self {
        TransformInput {
            id: input.id,
            instruction: input.instruction.unwrap_or_default(),
            response_schema: input.response_schema.map(|j| j.0),
            response_mapping: input.response_mapping,
        }
    }
}

#[derive(Debug, Clone, InputObject)]
pub struct GqlRequestOptions {
    pub cache_mode: Option<GqlCacheMode>,
    /// Per-HTTP-call timeout in milliseconds
    pub timeout: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay: Option<u64>,
    pub webhook_url: Option<String>,
}

impl GqlRequestOptions {
    fn into_domain(self, base: RequestOptions) -> RequestOptions {
        RequestOptions {
            cache_mode: self.cache_mode.map(Into::into).unwrap_or(base.cache_mode),
            timeout_ms: self.timeout.unwrap_or(base.timeout_ms),
            retries: self.retries.unwrap_or(base.retries),
            retry_delay_ms: self.retry_delay.unwrap_or(base.retry_delay_ms),
            webhook_url: self.webhook_url.or(base.webhook_url),
        }
    }
}

/// GraphQL view of a run record. Timestamps are epoch milliseconds as
/// strings to avoid 32-bit Int truncation.
#[derive(Debug, Clone, SimpleObject)]
pub struct GqlRun {
    pub id: String,
    pub success: bool,
    pub data: Option<Json<Value>>,
    pub error: Option<String>,
    pub started_at: String,
    pub completed_at: String,
    pub config: Option<Json<Value>>,
    pub config_id: Option<String>,
}

impl From<RunResult> for GqlRun {
    fn from(run: RunResult) -> Self {
        Self {
            id: run.id,
            success: run.success,
            data: run.data.map(Json),
            error: run.error,
            started_at: run.started_at.to_string(),
            completed_at: run.completed_at.to_string(),
            config: run.config.map(Json),
            config_id: run.config_id,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlRunList {
    pub items: Vec<GqlRun>,
    pub total: usize,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlApiConfig {
    pub id: String,
    pub url_host: String,
    pub url_path: Option<String>,
    pub method: GqlHttpMethod,
    pub headers: Option<Json<HashMap<String, String>>>,
    pub query_params: Option<Json<HashMap<String, String>>>,
    pub body: Option<String>,
    pub authentication: GqlAuthType,
    pub pagination: Option<Json<PaginationConfig>>,
    pub data_path: Option<String>,
    pub instruction: String,
    pub documentation_url: Option<String>,
    pub response_schema: Option<Json<Value>>,
    pub response_mapping: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ApiConfig> for GqlApiConfig {
    fn from(config: ApiConfig) -> Self {
        Self {
            id: config.id,
            url_host: config.url_host,
            url_path: config.url_path,
            method: config.method.into(),
            headers: config.headers.map(Json),
            query_params: config.query_params.map(Json),
            body: config.body,
            authentication: config.authentication.into(),
            pagination: config.pagination.map(Json),
            data_path: config.data_path,
            instruction: config.instruction,
            documentation_url: config.documentation_url,
            response_schema: config.response_schema.map(Json),
            response_mapping: config.response_mapping,
            created_at: config.created_at.to_string(),
            updated_at: config.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlApiConfigList {
    pub items: Vec<GqlApiConfig>,
    pub total: usize,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlExtractConfig {
    pub id: String,
    pub url_host: String,
    pub url_path: Option<String>,
    pub method: GqlHttpMethod,
    pub headers: Option<Json<HashMap<String, String>>>,
    pub query_params: Option<Json<HashMap<String, String>>>,
    pub authentication: GqlAuthType,
    pub decompression_method: GqlDecompressionMethod,
    pub file_type: GqlFileType,
    pub data_path: Option<String>,
    pub instruction: String,
    pub documentation_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ExtractConfig> for GqlExtractConfig {
    fn from(config: ExtractConfig) -> Self {
        Self {
            id: config.id,
            url_host: config.url_host,
            url_path: config.url_path,
            method: config.method.into(),
            headers: config.headers.map(Json),
            query_params: config.query_params.map(Json),
            authentication: config.authentication.into(),
            decompression_method: config.decompression_method.into(),
            file_type: config.file_type.into(),
            data_path: config.data_path,
            instruction: config.instruction,
            documentation_url: config.documentation_url,
            created_at: config.created_at.to_string(),
            updated_at: config.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlExtractConfigList {
    pub items: Vec<GqlExtractConfig>,
    pub total: usize,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlTransformConfig {
    pub id: String,
    pub instruction: String,
    pub response_schema: Json<Value>,
    pub response_mapping: Option<String>,
    pub confidence: Option<u8>,
    pub confidence_reasoning: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TransformConfig> for GqlTransformConfig {
    fn from(config: TransformConfig) -> Self {
        Self {
            id: config.id,
            instruction: config.instruction,
            response_schema: Json(config.response_schema),
            response_mapping: config.response_mapping,
            confidence: config.confidence,
            confidence_reasoning: config.confidence_reasoning,
            created_at: config.created_at.to_string(),
            updated_at: config.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GqlTransformConfigList {
    pub items: Vec<GqlTransformConfig>,
    pub total: usize,
}

// ============================================================================
// RESOLVERS
// ============================================================================

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn list_runs(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 20)] limit: usize,
        #[graphql(default = 0)] offset: usize,
        config_id: Option<String>,
    ) -> GqlResult<GqlRunList> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        let (items, total) = store
            .list_runs(limit, offset, config_id.as_deref())
            .await?;
        Ok(GqlRunList {
            items: items.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn get_run(&self, ctx: &Context<'_>, id: String) -> GqlResult<Option<GqlRun>> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        Ok(store.get_run(&id).await?.map(Into::into))
    }

    async fn list_apis(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 20)] limit: usize,
        #[graphql(default = 0)] offset: usize,
    ) -> GqlResult<GqlApiConfigList> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        let (items, total) = store.list_api_configs(limit, offset).await?;
        Ok(GqlApiConfigList {
            items: items.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn get_api(&self, ctx: &Context<'_>, id: String) -> GqlResult<Option<GqlApiConfig>> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        Ok(store.get_api_config(&id).await?.map(Into::into))
    }

    async fn list_extracts(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 20)] limit: usize,
        #[graphql(default = 0)] offset: usize,
    ) -> GqlResult<GqlExtractConfigList> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        let (items, total) = store.list_extract_configs(limit, offset).await?;
        Ok(GqlExtractConfigList {
            items: items.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn get_extract(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> GqlResult<Option<GqlExtractConfig>> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        Ok(store.get_extract_config(&id).await?.map(Into::into))
    }

    async fn list_transforms(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 20)] limit: usize,
        #[graphql(default = 0)] offset: usize,
    ) -> GqlResult<GqlTransformConfigList> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        let (items, total) = store.list_transform_configs(limit, offset).await?;
        Ok(GqlTransformConfigList {
            items: items.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn get_transform(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> GqlResult<Option<GqlTransformConfig>> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        Ok(store.get_transform_config(&id).await?.map(Into::into))
    }

    async fn generate_schema(
        &self,
        ctx: &Context<'_>,
        instruction: String,
        response_data: Option<String>,
    ) -> GqlResult<Json<Value>> {
        let handler = ctx.data::<Arc<IntegrationHandler>>()?;
        let schema = handler
            .generate_schema(&instruction, response_data.as_deref())
            .await?;
        Ok(Json(schema))
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn call(
        &self,
        ctx: &Context<'_>,
        input: GqlApiInput,
        payload: Option<Json<Value>>,
        credentials: Option<Json<HashMap<String, String>>>,
        options: Option<GqlRequestOptions>,
    ) -> GqlResult<GqlRun> {
        let handler = ctx.data::<Arc<IntegrationHandler>>()?;
        let run = handler
            .call(
                input.into_domain()?,
                payload.map(|j| j.0).unwrap_or(Value::Null),
                credentials.map(|j| j.0).unwrap_or_default(),
                options
                    .map(|o| o.into_domain(RequestOptions::default()))
                    .unwrap_or_default(),
            )
            .await?;
        Ok(run.into())
    }

    async fn extract(
        &self,
        ctx: &Context<'_>,
        input: GqlExtractInput,
        payload: Option<Json<Value>>,
        credentials: Option<Json<HashMap<String, String>>>,
        options: Option<GqlRequestOptions>,
    ) -> GqlResult<GqlRun> {
        let handler = ctx.data::<Arc<IntegrationHandler>>()?;
        let run = handler
            .extract(
                input.into_domain()?,
                payload.map(|j| j.0).unwrap_or(Value::Null),
                credentials.map(|j| j.0).unwrap_or_default(),
                options
                    .map(|o| o.into_domain(RequestOptions::for_extract()))
                    .unwrap_or_else(RequestOptions::for_extract),
            )
            .await?;
        Ok(run.into())
    }

    async fn transform(
        &self,
        ctx: &Context<'_>,
        input: GqlTransformInput,
        data: Json<Value>,
        options: Option<GqlRequestOptions>,
    ) -> GqlResult<GqlRun> {
        let handler = ctx.data::<Arc<IntegrationHandler>>()?;
        let run = handler
            .transform(
                input.into(),
                data.0,
                options
                    .map(|o| o.into_domain(RequestOptions::default()))
                    .unwrap_or_default(),
            )
            .await?;
        Ok(run.into())
    }

    async fn upsert_api(
        &self,
        ctx: &Context<'_>,
        id: String,
        config: Json<ApiConfig>,
    ) -> GqlResult<GqlApiConfig> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        let mut config = config.0;
        config.id = id.clone();
        config.updated_at = crate::domain::now_millis();
        if config.created_at == 0 {
            config.created_at = config.updated_at;
        }
        store.upsert_api_config(&id, &config).await?;
        Ok(config.into())
    }

    async fn delete_api(&self, ctx: &Context<'_>, id: String) -> GqlResult<bool> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        Ok(store.delete_api_config(&id).await?)
    }

    async fn upsert_extract(
        &self,
        ctx: &Context<'_>,
        id: String,
        config: Json<ExtractConfig>,
    ) -> GqlResult<GqlExtractConfig> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        let mut config = config.0;
        config.id = id.clone();
        config.updated_at = crate::domain::now_millis();
        if config.created_at == 0 {
            config.created_at = config.updated_at;
        }
        store.upsert_extract_config(&id, &config).await?;
        Ok(config.into())
    }

    async fn delete_extract(&self, ctx: &Context<'_>, id: String) -> GqlResult<bool> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        Ok(store.delete_extract_config(&id).await?)
    }

    async fn upsert_transform(
        &self,
        ctx: &Context<'_>,
        id: String,
        config: Json<TransformConfig>,
    ) -> GqlResult<GqlTransformConfig> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        let mut config = config.0;
        config.id = id.clone();
        config.updated_at = crate::domain::now_millis();
        if config.created_at == 0 {
            config.created_at = config.updated_at;
        }
        store.upsert_transform_config(&id, &config).await?;
        Ok(config.into())
    }

    async fn delete_transform(&self, ctx: &Context<'_>, id: String) -> GqlResult<bool> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        Ok(store.delete_transform_config(&id).await?)
    }

    /// Rename a stored config, e.g. after promoting a cache entry to a
    /// stable handle.
    async fn update_api_config_id(
        &self,
        ctx: &Context<'_>,
        old_id: String,
        new_id: String,
    ) -> GqlResult<bool> {
        let store = ctx.data::<Arc<dyn Datastore>>()?;
        let Some(mut config) = store.get_api_config(&old_id).await? else {
            return Ok(false);
        };
        config.id = new_id.clone();
        config.updated_at = crate::domain::now_millis();
        store.upsert_api_config(&new_id, &config).await?;
        store.delete_api_config(&old_id).await?;
        Ok(true)
    }
}

pub type StitchSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the schema with its shared state.
pub fn build_schema(store: Arc<dyn Datastore>, handler: Arc<IntegrationHandler>) -> StitchSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(store)
        .data(handler)
        .finish()
}

/// Axum handler for `POST /graphql`.
pub async fn graphql_handler(
    State(schema): State<StitchSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

/// Decode uploaded file contents (standard alphabet, padding optional).
fn decode_base64(encoded: &str) -> GqlResult<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
    use base64::Engine;

    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let engine = if cleaned.ends_with('=') {
        &STANDARD
    } else {
        &STANDARD_NO_PAD
    };
    engine
        .decode(cleaned.as_bytes())
        .map_err(|e| format!("invalid base64 in file upload: {}", e).into())
}
