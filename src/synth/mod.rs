//! LLM-driven synthesis
//!
//! The generators that turn natural-language instructions into request
//! configs, extraction configs, JSONata mappings, and JSON Schemas,
//! each with its own bounded error-feedback retry loop.

pub mod endpoint;
pub mod extract;
pub mod llm;
pub mod prompts;
pub mod schema_gen;
pub mod transform;

pub use endpoint::{EndpointSynthesizer, PreparedEndpoint};
pub use extract::{ExtractSynthesizer, PreparedExtract};
pub use llm::{is_reasoning_model, ChatModel, OpenAiCompatModel};
pub use schema_gen::SchemaGenerator;
pub use transform::TransformSynthesizer;
