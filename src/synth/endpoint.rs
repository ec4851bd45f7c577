//! Endpoint synthesis
//!
//! Generates an [`ApiConfig`] from an instruction plus documentation,
//! and regenerates it when execution feeds an error back. The message
//! log is owned by the call and passed back in for each repair turn.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::llm::{retry_temperature, ChatModel};
use super::prompts;
use crate::adapters::docs_fetcher::DocsFetcher;
use crate::domain::{
    content_hash, fresh_timestamps, ApiConfig, ApiInput, AuthType, ChatMessage, HttpMethod,
    PaginationConfig,
};
use crate::error::IntegrationResult;
use crate::schema::infer_schema;

/// A synthesized config together with the conversation that produced
/// it, so the caller can resume the loop after executing it.
#[derive(Debug, Clone)]
pub struct PreparedEndpoint {
    pub config: ApiConfig,
    pub messages: Vec<ChatMessage>,
}

/// Deterministic config id: stable across runs for identical
/// (instruction, payload-shape) pairs.
pub fn endpoint_cache_id(input: &ApiInput, payload: &Value) -> String {
    content_hash(&json!({
        "instruction": input.instruction,
        "urlHost": input.url_host,
        "payloadShape": infer_schema(payload),
    }))
}

/// What the LLM is allowed to decide; caller-fixed fields override it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointDraft {
    url_host: Option<String>,
    url_path: Option<String>,
    method: Option<HttpMethod>,
    headers: Option<HashMap<String, String>>,
    query_params: Option<HashMap<String, String>>,
    body: Option<String>,
    authentication: Option<AuthType>,
    pagination: Option<PaginationConfig>,
    data_path: Option<String>,
}

pub struct EndpointSynthesizer {
    model: Arc<dyn ChatModel>,
    docs: DocsFetcher,
}

impl EndpointSynthesizer {
    pub fn new(model: Arc<dyn ChatModel>, docs: DocsFetcher) -> Self {
        Self { model, docs }
    }

    /// Produce a config for `input`. With `prior_messages` empty this
    /// seeds a fresh conversation; otherwise it appends a repair turn
    /// built from `last_error` and `previous` and asks again.
    #[allow(clippy::too_many_arguments)]
    pub async fn prepare(
        &self,
        input: &ApiInput,
        payload: &Value,
        credentials: &HashMap<String, String>,
        last_error: Option<&str>,
        previous: Option<&ApiConfig>,
        prior_messages: Vec<ChatMessage>,
        retry: u32,
    ) -> IntegrationResult<PreparedEndpoint> {
        let id = input
            .id
            .clone()
            .unwrap_or_else(|| endpoint_cache_id(input, payload));
        let (created_at, updated_at) = fresh_timestamps();

        let mut available_vars: Vec<String> = Vec::new();
        if let Value::Object(map) = payload {
            available_vars.extend(map.keys().cloned());
        }
        available_vars.extend(credentials.keys().cloned());
        available_vars.sort();

        let mut messages = prior_messages;
        if messages.is_empty() {
            let docs_url = input
                .documentation_url
                .clone()
                .or_else(|| input.url_host.clone());
            let documentation = match docs_url {
                Some(url) => self.docs.fetch(&url, input.headers.as_ref(), None).await,
                None => String::new(),
            };
            messages.push(ChatMessage::system(prompts::endpoint_system_prompt()));
            messages.push(ChatMessage::user(prompts::endpoint_user_prompt(
                input,
                &available_vars,
                &documentation,
            )));
            // A failure may predate the conversation (a cached config
            // that failed execution); carry it into the first turn
            if let (Some(error), Some(prev)) = (last_error, previous) {
                messages.push(ChatMessage::user(prompts::endpoint_repair_prompt(
                    error, prev,
                )));
            }
        } else {
            let error = last_error.unwrap_or("unknown error");
            let repair = match previous {
                Some(prev) => prompts::endpoint_repair_prompt(error, prev),
                None => format!("The previous configuration failed:\n{}", error),
            };
            messages.push(ChatMessage::user(repair));
        }

        let temperature = retry_temperature(self.model.model(), retry);
        debug!(retry, model = self.model.model(), "synthesizing endpoint config");

        let completion = self
            .model
            .complete(&messages, &prompts::api_config_response_schema(), temperature)
            .await?;
        messages.push(ChatMessage::assistant(completion.to_string()));

        let draft: EndpointDraft = serde_json::from_value(completion)?;
        let config = merge(input, draft, id, created_at, updated_at);
        Ok(PreparedEndpoint { config, messages })
    }
}

/// Caller-specified fields always win; the draft fills the gaps.
fn merge(
    input: &ApiInput,
    draft: EndpointDraft,
    id: String,
    created_at: u64,
    updated_at: u64,
) -> ApiConfig {
    ApiConfig {
        id,
        version: None,
        created_at,
        updated_at,
        url_host: input
            .url_host
            .clone()
            .or(draft.url_host)
            .unwrap_or_default(),
        url_path: input.url_path.clone().or(draft.url_path),
        method: input.method.or(draft.method).unwrap_or_default(),
        headers: input.headers.clone().or(draft.headers),
        query_params: input.query_params.clone().or(draft.query_params),
        body: input.body.clone().or(draft.body),
        authentication: input
            .authentication
            .or(draft.authentication)
            .unwrap_or_default(),
        pagination: input.pagination.or(draft.pagination),
        data_path: input.data_path.clone().or(draft.data_path),
        instruction: input.instruction.clone(),
        documentation_url: input.documentation_url.clone(),
        response_schema: input.response_schema.clone(),
        response_mapping: input.response_mapping.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_id_depends_on_payload_shape_not_values() {
        let input = ApiInput {
            instruction: "list users".into(),
            url_host: Some("https://api.test".into()),
            ..Default::default()
        };
        let a = endpoint_cache_id(&input, &json!({"limit": 1}));
        let b = endpoint_cache_id(&input, &json!({"limit": 99}));
        let c = endpoint_cache_id(&input, &json!({"limit": "one"}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn merge_prefers_caller_fixed_fields() {
        let input = ApiInput {
            instruction: "i".into(),
            url_host: Some("https://fixed.test".into()),
            data_path: Some("fixed.path".into()),
            ..Default::default()
        };
        let draft = EndpointDraft {
            url_host: Some("https://drafted.test".into()),
            url_path: Some("/drafted".into()),
            method: Some(HttpMethod::Post),
            headers: None,
            query_params: None,
            body: None,
            authentication: Some(AuthType::Header),
            pagination: None,
            data_path: Some("drafted.path".into()),
        };
        let config = merge(&input, draft, "id1".into(), 1, 1);
        assert_eq!(config.url_host, "https://fixed.test");
        assert_eq!(config.url_path.as_deref(), Some("/drafted"));
        assert_eq!(config.data_path.as_deref(), Some("fixed.path"));
        assert_eq!(config.method, HttpMethod::Post);
        assert_eq!(config.authentication, AuthType::Header);
    }
}
