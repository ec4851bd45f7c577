//! Transform synthesis
//!
//! Generates a JSONata mapping satisfying the requested schema, with a
//! validate-and-retry loop: every candidate expression is applied to
//! the real data and schema-checked before it is accepted.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::llm::{retry_temperature, ChatModel};
use super::prompts;
use crate::domain::{
    content_hash, fresh_timestamps, CacheMode, TransformConfig, TransformInput,
};
use crate::error::{IntegrationError, IntegrationResult};
use crate::jsonata;
use crate::persistence::Datastore;
use crate::schema::{infer_schema, sample_for_prompt};

/// Mapping synthesis attempts before giving up.
const MAX_ATTEMPTS: u32 = 5;

/// Cache key for a transform: instruction + the inferred shape of the
/// data. Morphologically identical payloads share an entry.
pub fn transform_cache_id(instruction: &str, data: &Value) -> String {
    content_hash(&json!({
        "instruction": instruction,
        "dataShape": infer_schema(data),
    }))
}

#[derive(Debug, Deserialize)]
struct MappingDraft {
    jsonata: String,
    confidence: u8,
    confidence_reasoning: String,
}

/// A generated mapping with the model's confidence assessment.
#[derive(Debug, Clone)]
pub struct GeneratedMapping {
    pub expression: String,
    pub confidence: u8,
    pub confidence_reasoning: String,
}

pub struct TransformSynthesizer {
    model: Arc<dyn ChatModel>,
}

impl TransformSynthesizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Produce a transform config for `input` against `data`.
    ///
    /// Returns `None` when there is nothing to transform (no schema or
    /// no data). Cache hits are returned with the caller's instruction
    /// and schema; a caller-supplied mapping is accepted as-is.
    pub async fn prepare(
        &self,
        store: &dyn Datastore,
        cache_mode: CacheMode,
        input: &TransformInput,
        data: &Value,
    ) -> IntegrationResult<Option<TransformConfig>> {
        let schema = match &input.response_schema {
            Some(schema) if !schema_is_empty(schema) => schema.clone(),
            _ => return Ok(None),
        };
        if data_is_empty(data) {
            return Ok(None);
        }

        let id = input
            .id
            .clone()
            .unwrap_or_else(|| transform_cache_id(&input.instruction, data));

        if cache_mode.reads() {
            if let Some(mut cached) = store.get_transform_config(&id).await? {
                debug!(id = %id, "transform cache hit");
                if !input.instruction.is_empty() {
                    cached.instruction = input.instruction.clone();
                }
                cached.response_schema = schema;
                return Ok(Some(cached));
            }
        }

        let (created_at, updated_at) = fresh_timestamps();

        let config = if let Some(mapping) = &input.response_mapping {
            TransformConfig {
                id: id.clone(),
                version: None,
                created_at,
                updated_at,
                instruction: input.instruction.clone(),
                response_schema: schema,
                response_mapping: Some(mapping.clone()),
                confidence: None,
                confidence_reasoning: None,
            }
        } else {
            let generated = self
                .generate_mapping(&schema, data, &input.instruction)
                .await?;
            TransformConfig {
                id: id.clone(),
                version: None,
                created_at,
                updated_at,
                instruction: input.instruction.clone(),
                response_schema: schema,
                response_mapping: Some(generated.expression),
                confidence: Some(generated.confidence),
                confidence_reasoning: Some(generated.confidence_reasoning),
            }
        };

        if cache_mode.writes() {
            store.upsert_transform_config(&id, &config).await?;
        }
        Ok(Some(config))
    }

    /// The inner LLM loop: propose an expression, apply it to `data`,
    /// validate against `schema`, feed any failure back, up to
    /// [`MAX_ATTEMPTS`] times.
    pub async fn generate_mapping(
        &self,
        schema: &Value,
        data: &Value,
        instruction: &str,
    ) -> IntegrationResult<GeneratedMapping> {
        let data_schema = infer_schema(data);
        let sample = sample_for_prompt(
            data,
            prompts::SAMPLE_ARRAY_LIMIT,
            prompts::SAMPLE_CHAR_LIMIT,
        );

        let mut messages = vec![
            crate::domain::ChatMessage::system(prompts::mapping_system_prompt()),
            crate::domain::ChatMessage::user(prompts::mapping_user_prompt(
                schema,
                instruction,
                &data_schema,
                &sample,
            )),
        ];

        let mut last_error = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            let temperature = retry_temperature(self.model.model(), attempt);
            let completion = self
                .model
                .complete(&messages, &prompts::mapping_response_schema(), temperature)
                .await?;
            messages.push(crate::domain::ChatMessage::assistant(completion.to_string()));

            let draft: MappingDraft = match serde_json::from_value(completion) {
                Ok(draft) => draft,
                Err(e) => {
                    last_error = format!("completion did not match the mapping contract: {}", e);
                    messages.push(crate::domain::ChatMessage::user(
                        prompts::mapping_repair_prompt(&last_error),
                    ));
                    continue;
                }
            };

            let outcome = jsonata::validate_and_apply(data, &draft.jsonata, schema);
            if outcome.success {
                debug!(attempt, confidence = draft.confidence, "mapping validated");
                return Ok(GeneratedMapping {
                    expression: draft.jsonata,
                    confidence: draft.confidence,
                    confidence_reasoning: draft.confidence_reasoning,
                });
            }

            last_error = outcome
                .error
                .unwrap_or_else(|| "mapping produced no output".to_string());
            warn!(attempt, error = %last_error, "mapping rejected, retrying");
            messages.push(crate::domain::ChatMessage::user(
                prompts::mapping_repair_prompt(&last_error),
            ));
        }

        Err(IntegrationError::MappingValidation(format!(
            "no valid mapping after {} attempts; last error: {}",
            MAX_ATTEMPTS, last_error
        )))
    }
}

fn schema_is_empty(schema: &Value) -> bool {
    match schema {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn data_is_empty(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatMessage;
    use crate::error::LlmResult;
    use crate::persistence::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted model: returns canned completions in order.
    struct ScriptedModel {
        responses: Mutex<Vec<Value>>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Value>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            _response_schema: &Value,
            _temperature: Option<f32>,
        ) -> LlmResult<Value> {
            self.calls.lock().unwrap().push(messages.to_vec());
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    fn mapping_response(expr: &str) -> Value {
        json!({
            "jsonata": expr,
            "confidence": 80,
            "confidence_reasoning": "field names align"
        })
    }

    #[tokio::test]
    async fn returns_none_without_schema_or_data() {
        let synth = TransformSynthesizer::new(Arc::new(ScriptedModel::new(vec![])));
        let store = MemoryStore::new();

        let no_schema = TransformInput {
            instruction: "x".into(),
            ..Default::default()
        };
        assert!(synth
            .prepare(&store, CacheMode::Enabled, &no_schema, &json!({"a": 1}))
            .await
            .unwrap()
            .is_none());

        let with_schema = TransformInput {
            instruction: "x".into(),
            response_schema: Some(json!({"type": "object"})),
            ..Default::default()
        };
        assert!(synth
            .prepare(&store, CacheMode::Enabled, &with_schema, &json!(null))
            .await
            .unwrap()
            .is_none());
        assert!(synth
            .prepare(&store, CacheMode::Enabled, &with_schema, &json!([]))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn retries_until_mapping_validates() {
        // First draft references fields that do not exist; the second
        // is correct. Mirrors the full-name repair scenario.
        let model = ScriptedModel::new(vec![
            mapping_response("user.firstName & user.lastName"),
            mapping_response(r#"{"name": user.first & " " & user.last}"#),
        ]);
        let synth = TransformSynthesizer::new(Arc::new(model));
        let data = json!({"user": {"first": "J", "last": "D"}});
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });

        let generated = synth
            .generate_mapping(&schema, &data, "full name")
            .await
            .unwrap();
        assert_eq!(
            generated.expression,
            r#"{"name": user.first & " " & user.last}"#
        );
        let applied = jsonata::apply(&data, &generated.expression).unwrap();
        assert_eq!(applied, json!({"name": "J D"}));
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let bad = mapping_response("user.missing");
        let model = ScriptedModel::new(vec![bad.clone(), bad.clone(), bad.clone(), bad.clone(), bad]);
        let synth = TransformSynthesizer::new(Arc::new(model));
        let data = json!({"user": {"first": "J"}});
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });

        let err = synth
            .generate_mapping(&schema, &data, "full name")
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::MappingValidation(_)));
    }

    #[tokio::test]
    async fn cache_modes_govern_reads_and_writes() {
        let model = ScriptedModel::new(vec![
            mapping_response(r#"{"name": user.first}"#),
            mapping_response(r#"{"name": user.first}"#),
        ]);
        let synth = TransformSynthesizer::new(Arc::new(model));
        let store = MemoryStore::new();
        let data = json!({"user": {"first": "J"}});
        let input = TransformInput {
            instruction: "name only".into(),
            response_schema: Some(json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            })),
            ..Default::default()
        };

        // WRITEONLY populates but never reads
        let first = synth
            .prepare(&store, CacheMode::Writeonly, &input, &data)
            .await
            .unwrap()
            .unwrap();
        assert!(first.response_mapping.is_some());

        // ENABLED now hits the cache; the scripted model has one
        // response left, and a cache hit must not consume it.
        let second = synth
            .prepare(&store, CacheMode::Enabled, &input, &data)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.response_mapping, first.response_mapping);
    }

    #[tokio::test]
    async fn caller_mapping_accepted_as_is() {
        let synth = TransformSynthesizer::new(Arc::new(ScriptedModel::new(vec![])));
        let store = MemoryStore::new();
        let input = TransformInput {
            instruction: "x".into(),
            response_schema: Some(json!({"type": "object"})),
            response_mapping: Some("$".into()),
            ..Default::default()
        };
        let config = synth
            .prepare(&store, CacheMode::Disabled, &input, &json!({"a": 1}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.response_mapping.as_deref(), Some("$"));
        assert!(config.confidence.is_none());
    }
}
