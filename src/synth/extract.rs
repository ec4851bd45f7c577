//! Extract synthesis
//!
//! Generates an [`ExtractConfig`] for file/URL sources, with the same
//! conversation-per-call repair loop as endpoint synthesis.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::llm::{retry_temperature, ChatModel};
use super::prompts;
use crate::adapters::docs_fetcher::DocsFetcher;
use crate::domain::{
    content_hash, fresh_timestamps, AuthType, ChatMessage, DecompressionMethod, ExtractConfig,
    ExtractInput, FileType, HttpMethod,
};
use crate::error::IntegrationResult;
use crate::schema::infer_schema;

#[derive(Debug, Clone)]
pub struct PreparedExtract {
    pub config: ExtractConfig,
    pub messages: Vec<ChatMessage>,
}

pub fn extract_cache_id(input: &ExtractInput, payload: &Value) -> String {
    content_hash(&json!({
        "instruction": input.instruction,
        "urlHost": input.url_host,
        "payloadShape": infer_schema(payload),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractDraft {
    url_host: Option<String>,
    url_path: Option<String>,
    method: Option<HttpMethod>,
    headers: Option<HashMap<String, String>>,
    query_params: Option<HashMap<String, String>>,
    authentication: Option<AuthType>,
    decompression_method: Option<DecompressionMethod>,
    file_type: Option<FileType>,
    data_path: Option<String>,
}

pub struct ExtractSynthesizer {
    model: Arc<dyn ChatModel>,
    docs: DocsFetcher,
}

impl ExtractSynthesizer {
    pub fn new(model: Arc<dyn ChatModel>, docs: DocsFetcher) -> Self {
        Self { model, docs }
    }

    /// Produce an extract config, appending a repair turn when prior
    /// messages and an error are present.
    pub async fn prepare(
        &self,
        input: &ExtractInput,
        payload: &Value,
        credentials: &HashMap<String, String>,
        last_error: Option<&str>,
        prior_messages: Vec<ChatMessage>,
        retry: u32,
    ) -> IntegrationResult<PreparedExtract> {
        let id = input
            .id
            .clone()
            .unwrap_or_else(|| extract_cache_id(input, payload));
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
            messages.push(ChatMessage::system(prompts::extract_system_prompt()));
            messages.push(ChatMessage::user(prompts::extract_user_prompt(
                input,
                &available_vars,
                &documentation,
            )));
        } else {
            let error = last_error.unwrap_or("unknown error");
            messages.push(ChatMessage::user(prompts::extract_repair_prompt(error)));
        }

        let temperature = retry_temperature(self.model.model(), retry);
        debug!(retry, model = self.model.model(), "synthesizing extract config");

        let completion = self
            .model
            .complete(
                &messages,
                &prompts::extract_config_response_schema(),
                temperature,
            )
            .await?;
        messages.push(ChatMessage::assistant(completion.to_string()));

        let draft: ExtractDraft = serde_json::from_value(completion)?;
        let config = merge(input, draft, id, created_at, updated_at);
        Ok(PreparedExtract { config, messages })
    }
}

fn merge(
    input: &ExtractInput,
    draft: ExtractDraft,
    id: String,
    created_at: u64,
    updated_at: u64,
) -> ExtractConfig {
    ExtractConfig {
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
        body: None,
        authentication: input
            .authentication
            .or(draft.authentication)
            .unwrap_or_default(),
        decompression_method: input
            .decompression_method
            .or(draft.decompression_method)
            .unwrap_or_default(),
        file_type: input.file_type.or(draft.file_type).unwrap_or_default(),
        data_path: input.data_path.clone().or(draft.data_path),
        instruction: input.instruction.clone(),
        documentation_url: input.documentation_url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_defaults_to_auto_modes() {
        let input = ExtractInput {
            instruction: "pull the report".into(),
            url_host: Some("https://files.test/report.csv.gz".into()),
            ..Default::default()
        };
        let draft = ExtractDraft {
            url_host: None,
            url_path: None,
            method: None,
            headers: None,
            query_params: None,
            authentication: None,
            decompression_method: None,
            file_type: None,
            data_path: None,
        };
        let config = merge(&input, draft, "id".into(), 0, 0);
        assert_eq!(config.decompression_method, DecompressionMethod::Auto);
        assert_eq!(config.file_type, FileType::Auto);
        assert_eq!(config.method, HttpMethod::Get);
    }

    #[test]
    fn cache_id_is_stable() {
        let input = ExtractInput {
            instruction: "pull".into(),
            url_host: Some("https://files.test/a.csv".into()),
            ..Default::default()
        };
        assert_eq!(
            extract_cache_id(&input, &json!({})),
            extract_cache_id(&input, &json!({}))
        );
    }
}
