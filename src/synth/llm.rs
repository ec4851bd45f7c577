//! LLM provider client
//!
//! Providers differ only in base URL, API key, and identification
//! headers, so one OpenAI-compatible implementation serves both modes
//! behind the [`ChatModel`] capability trait.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{LlmProviderKind, LlmSettings};
use crate::domain::ChatMessage;
use crate::error::{LlmError, LlmResult};

/// Capability set consumed by the synthesizers: one structured-JSON
/// chat completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, used for reasoning-model detection
    fn model(&self) -> &str;

    /// Perform a chat completion constrained to `response_schema`.
    /// Returns the parsed JSON object.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        response_schema: &Value,
        temperature: Option<f32>,
    ) -> LlmResult<Value>;
}

/// The o-series reasoning models reject the temperature parameter; the
/// synthesizers omit it entirely for them. Ordinary chat models
/// (including gpt-4o) take temperature as usual.
pub fn is_reasoning_model(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    ["o1", "o3", "o4"]
        .iter()
        .any(|series| base == *series || base.starts_with(&format!("{}-", series)))
}

/// Retry temperature schedule: starts deterministic, warms up with
/// each repair attempt. `None` for reasoning models.
pub fn retry_temperature(model: &str, retry: u32) -> Option<f32> {
    if is_reasoning_model(model) {
        None
    } else {
        Some((0.1 * retry as f32).min(1.0))
    }
}

/// OpenAI-compatible chat-completions provider
pub struct OpenAiCompatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    extra_headers: Vec<(String, String)>,
}

impl OpenAiCompatModel {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            extra_headers: Vec::new(),
        }
    }

    /// Attach identification headers (router-style gateways require
    /// `HTTP-Referer` and `X-Title`).
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.extra_headers = headers;
        self
    }

    fn build_body(
        &self,
        messages: &[ChatMessage],
        response_schema: &Value,
        temperature: Option<f32>,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages
                .iter()
                .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
                .collect::<Vec<_>>(),
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "response",
                    "strict": true,
                    "schema": response_schema,
                }
            },
        });
        if let Some(temp) = temperature {
            body["temperature"] = json!(temp);
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        response_schema: &Value,
        temperature: Option<f32>,
    ) -> LlmResult<Value> {
        let body = self.build_body(messages, response_schema, temperature);

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        for (key, value) in &self.extra_headers {
            request = request.header(key, value);
        }

        let response = request.json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| LlmError::Parse {
            message: format!("failed to decode completion envelope: {}", e),
            raw: String::new(),
        })?;

        let content = completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::Parse {
                message: "completion contained no choices".to_string(),
                raw: String::new(),
            })?;

        serde_json::from_str(&content).map_err(|e| LlmError::Parse {
            message: format!("completion was not valid JSON: {}", e),
            raw: content,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, serde::Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, serde::Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Build the default chat model from provider settings.
pub fn build_model(settings: &LlmSettings) -> LlmResult<OpenAiCompatModel> {
    build_named_model(settings, settings.default_model.clone())
}

/// Build the schema-generation model, falling back to the default.
pub fn build_schema_model(settings: &LlmSettings) -> LlmResult<OpenAiCompatModel> {
    let model = settings
        .schema_model
        .clone()
        .unwrap_or_else(|| settings.default_model.clone());
    build_named_model(settings, model)
}

fn build_named_model(settings: &LlmSettings, model: String) -> LlmResult<OpenAiCompatModel> {
    let provider = settings.active_provider();
    let api_key = provider.resolve_api_key().ok_or_else(|| {
        LlmError::Authentication(format!(
            "API key not set for provider (expected in {} or settings)",
            provider.api_key_env
        ))
    })?;

    let built = OpenAiCompatModel::new(api_key, provider.base_url.clone(), model);
    Ok(match settings.provider {
        LlmProviderKind::Primary => built,
        LlmProviderKind::Router => built.with_headers(vec![
            ("HTTP-Referer".to_string(), settings.referer.clone()),
            ("X-Title".to_string(), settings.title.clone()),
        ]),
    })
}
