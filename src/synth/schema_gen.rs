//! JSON Schema generation
//!
//! Turns an instruction (and optionally sampled response text) into a
//! JSON Schema. Uses the schema-generation model when one is
//! configured.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::llm::{retry_temperature, ChatModel};
use super::prompts;
use crate::domain::ChatMessage;
use crate::error::{IntegrationError, IntegrationResult};

const MAX_ATTEMPTS: u32 = 3;

pub struct SchemaGenerator {
    model: Arc<dyn ChatModel>,
}

impl SchemaGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Generate a JSON Schema for `instruction`, retrying with the
    /// error appended when the completion is not a usable schema.
    pub async fn generate(
        &self,
        instruction: &str,
        response_data: Option<&str>,
    ) -> IntegrationResult<Value> {
        if instruction.trim().is_empty() {
            return Err(IntegrationError::Configuration(
                "schema generation requires an instruction".to_string(),
            ));
        }

        let mut messages = vec![
            ChatMessage::system(prompts::schema_gen_system_prompt()),
            ChatMessage::user(prompts::schema_gen_user_prompt(instruction, response_data)),
        ];

        let mut last_error = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            let temperature = retry_temperature(self.model.model(), attempt);
            let completion = self
                .model
                .complete(&messages, &prompts::schema_gen_response_schema(), temperature)
                .await?;
            messages.push(ChatMessage::assistant(completion.to_string()));

            // Unwrap {jsonSchema: ...} envelopes; tolerate a bare schema
            let candidate = completion
                .get("jsonSchema")
                .cloned()
                .unwrap_or(completion);

            match usable_schema(&candidate) {
                Ok(()) => {
                    debug!(attempt, "generated schema accepted");
                    return Ok(candidate);
                }
                Err(e) => {
                    last_error = e;
                    warn!(attempt, error = %last_error, "generated schema rejected, retrying");
                    messages.push(ChatMessage::user(prompts::schema_gen_repair_prompt(
                        &last_error,
                    )));
                }
            }
        }

        Err(IntegrationError::Configuration(format!(
            "no usable schema after {} attempts; last error: {}",
            MAX_ATTEMPTS, last_error
        )))
    }
}

/// A candidate is usable when it is an object that compiles as a JSON
/// Schema.
fn usable_schema(candidate: &Value) -> Result<(), String> {
    if !candidate.is_object() {
        return Err("schema must be a JSON object".to_string());
    }
    jsonschema::draft202012::new(candidate)
        .map(|_| ())
        .map_err(|e| format!("schema does not compile: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedModel {
        responses: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _response_schema: &Value,
            _temperature: Option<f32>,
        ) -> LlmResult<Value> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn unwraps_the_envelope() {
        let model = ScriptedModel {
            responses: Mutex::new(vec![json!({
                "jsonSchema": {"type": "object", "properties": {"name": {"type": "string"}}}
            })]),
        };
        let generator = SchemaGenerator::new(Arc::new(model));
        let schema = generator.generate("name of the user", None).await.unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[tokio::test]
    async fn retries_on_unusable_schema() {
        let model = ScriptedModel {
            responses: Mutex::new(vec![
                json!({"jsonSchema": "not a schema"}),
                json!({"jsonSchema": {"type": "array", "items": {"type": "integer"}}}),
            ]),
        };
        let generator = SchemaGenerator::new(Arc::new(model));
        let schema = generator.generate("list of ids", None).await.unwrap();
        assert_eq!(schema["type"], "array");
    }

    #[tokio::test]
    async fn empty_instruction_is_a_configuration_error() {
        let model = ScriptedModel {
            responses: Mutex::new(vec![]),
        };
        let generator = SchemaGenerator::new(Arc::new(model));
        let err = generator.generate("  ", None).await.unwrap_err();
        assert!(matches!(err, IntegrationError::Configuration(_)));
    }
}
