//! Prompt builders and LLM response schemas
//!
//! Every synthesizer constrains its completion to a JSON Schema and
//! appends error context as plain user turns, so all prompt text lives
//! here in one place.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::domain::{ApiConfig, ApiInput, ExtractInput};

/// Documentation text is truncated to this many characters before
/// entering a prompt.
pub const DOCS_CHAR_LIMIT: usize = 80_000;

/// Sampled data shown to the mapping generator is capped at this size.
pub const SAMPLE_CHAR_LIMIT: usize = 10_000;

/// Elements kept per array when sampling data for a prompt.
pub const SAMPLE_ARRAY_LIMIT: usize = 5;

/// Response schema for endpoint synthesis completions.
pub fn api_config_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "urlHost": {"type": "string", "description": "Scheme and host, e.g. https://api.example.com"},
            "urlPath": {"type": "string", "description": "Path portion of the URL; may contain {var} placeholders"},
            "method": {"type": "string", "enum": ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"]},
            "headers": {"type": "object", "additionalProperties": {"type": "string"}},
            "queryParams": {"type": "object", "additionalProperties": {"type": "string"}},
            "body": {"type": "string", "description": "Raw request body; interpreted as JSON. May contain {var} placeholders"},
            "authentication": {"type": "string", "enum": ["NONE", "HEADER", "QUERY_PARAM", "OAUTH2"]},
            "pagination": {
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["OFFSET_BASED", "PAGE_BASED", "DISABLED"]},
                    "pageSize": {"type": "integer"}
                },
                "required": ["type"]
            },
            "dataPath": {"type": "string", "description": "Dot-separated path to the payload inside the response"}
        },
        "required": ["urlHost", "method", "authentication"]
    })
}

/// Response schema for extract synthesis completions.
pub fn extract_config_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "urlHost": {"type": "string"},
            "urlPath": {"type": "string"},
            "method": {"type": "string", "enum": ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"]},
            "headers": {"type": "object", "additionalProperties": {"type": "string"}},
            "queryParams": {"type": "object", "additionalProperties": {"type": "string"}},
            "authentication": {"type": "string", "enum": ["NONE", "HEADER", "QUERY_PARAM", "OAUTH2"]},
            "decompressionMethod": {"type": "string", "enum": ["GZIP", "DEFLATE", "ZIP", "AUTO", "NONE"]},
            "fileType": {"type": "string", "enum": ["CSV", "JSON", "XML", "AUTO"]},
            "dataPath": {"type": "string"}
        },
        "required": ["urlHost", "method", "authentication", "decompressionMethod", "fileType"]
    })
}

/// Response schema for mapping synthesis completions.
pub fn mapping_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "jsonata": {"type": "string", "description": "JSONata expression mapping the source data to the target schema"},
            "confidence": {"type": "integer", "minimum": 0, "maximum": 100},
            "confidence_reasoning": {"type": "string"}
        },
        "required": ["jsonata", "confidence", "confidence_reasoning"]
    })
}

/// Response schema for schema-generation completions.
pub fn schema_gen_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "jsonSchema": {"type": "object", "description": "A JSON Schema describing the requested output"}
        },
        "required": ["jsonSchema"]
    })
}

pub fn endpoint_system_prompt() -> String {
    "You are an API integration engineer. Given an instruction, API \
     documentation, and the variables available at execution time, produce a \
     concrete HTTP request configuration as JSON matching the response schema. \
     Reference variables as {name} placeholders. Use the reserved placeholders \
     {page}, {offset} and {limit} for pagination when the API supports it. \
     Only reference variables that are listed as available."
        .to_string()
}

pub fn endpoint_user_prompt(
    input: &ApiInput,
    available_vars: &[String],
    documentation: &str,
) -> String {
    let mut sections = vec![format!("Instruction: {}", input.instruction)];
    if let Some(host) = &input.url_host {
        sections.push(format!("Base URL: {}", host));
    }
    if let Some(path) = &input.url_path {
        sections.push(format!("Path (fixed by caller): {}", path));
    }
    if let Some(method) = &input.method {
        sections.push(format!("Method (fixed by caller): {}", method));
    }
    if let Some(headers) = &input.headers {
        sections.push(format!("Headers (fixed by caller): {}", render_map(headers)));
    }
    if let Some(params) = &input.query_params {
        sections.push(format!(
            "Query params (fixed by caller): {}",
            render_map(params)
        ));
    }
    if let Some(body) = &input.body {
        sections.push(format!("Body (fixed by caller): {}", body));
    }
    if let Some(auth) = &input.authentication {
        sections.push(format!("Authentication (fixed by caller): {:?}", auth));
    }
    if let Some(data_path) = &input.data_path {
        sections.push(format!("Data path (fixed by caller): {}", data_path));
    }
    if let Some(pagination) = &input.pagination {
        sections.push(format!(
            "Pagination (fixed by caller): {:?} pageSize={}",
            pagination.pagination_type, pagination.page_size
        ));
    }
    sections.push(format!("Available variables: {}", available_vars.join(", ")));
    if documentation.is_empty() {
        sections.push("No documentation available.".to_string());
    } else {
        sections.push(format!("Documentation:\n{}", truncate(documentation, DOCS_CHAR_LIMIT)));
    }
    sections.join("\n\n")
}

pub fn endpoint_repair_prompt(last_error: &str, previous: &ApiConfig) -> String {
    format!(
        "The previous configuration failed.\n\nError:\n{}\n\nPrevious configuration:\n{}\n\n\
         Produce a corrected configuration. Keep what worked, change what caused the failure.",
        last_error,
        serde_json::to_string_pretty(previous).unwrap_or_default(),
    )
}

pub fn extract_system_prompt() -> String {
    "You are a data extraction engineer. Given an instruction and \
     documentation for a file source, produce a download-and-parse \
     configuration as JSON matching the response schema. Choose AUTO for \
     decompression and file type unless the source dictates otherwise."
        .to_string()
}

pub fn extract_user_prompt(
    input: &ExtractInput,
    available_vars: &[String],
    documentation: &str,
) -> String {
    let mut sections = vec![format!("Instruction: {}", input.instruction)];
    if let Some(host) = &input.url_host {
        sections.push(format!("Source URL: {}", host));
    }
    if let Some(path) = &input.url_path {
        sections.push(format!("Path (fixed by caller): {}", path));
    }
    if let Some(headers) = &input.headers {
        sections.push(format!("Headers (fixed by caller): {}", render_map(headers)));
    }
    sections.push(format!("Available variables: {}", available_vars.join(", ")));
    if !documentation.is_empty() {
        sections.push(format!("Documentation:\n{}", truncate(documentation, DOCS_CHAR_LIMIT)));
    }
    sections.join("\n\n")
}

pub fn extract_repair_prompt(last_error: &str) -> String {
    format!(
        "The previous extract configuration failed.\n\nError:\n{}\n\n\
         Produce a corrected configuration.",
        last_error
    )
}

pub fn mapping_system_prompt() -> String {
    "You are a data transformation engineer. Produce a JSONata expression \
     that reshapes the source data into the target JSON Schema. Respond as \
     JSON matching the response schema, including your confidence (0-100) \
     and its reasoning."
        .to_string()
}

pub fn mapping_user_prompt(
    target_schema: &Value,
    instruction: &str,
    data_schema: &Value,
    data_sample: &str,
) -> String {
    let mut sections = vec![format!(
        "Target schema:\n{}",
        serde_json::to_string_pretty(target_schema).unwrap_or_default()
    )];
    if !instruction.is_empty() {
        sections.push(format!("Instruction: {}", instruction));
    }
    sections.push(format!(
        "Source data schema:\n{}",
        serde_json::to_string_pretty(data_schema).unwrap_or_default()
    ));
    sections.push(format!("Sampled source data:\n{}", data_sample));
    sections.join("\n\n")
}

pub fn mapping_repair_prompt(error: &str) -> String {
    format!(
        "That expression failed:\n{}\n\nProduce a corrected JSONata expression.",
        error
    )
}

pub fn schema_gen_system_prompt() -> String {
    "You are an API designer. Given an instruction and optionally a sample \
     response, produce a JSON Schema describing the output the instruction \
     asks for. Respond as JSON with the schema under the jsonSchema key."
        .to_string()
}

pub fn schema_gen_user_prompt(instruction: &str, response_data: Option<&str>) -> String {
    match response_data {
        Some(data) => format!(
            "Instruction: {}\n\nSample response data:\n{}",
            instruction,
            truncate(data, SAMPLE_CHAR_LIMIT)
        ),
        None => format!("Instruction: {}", instruction),
    }
}

pub fn schema_gen_repair_prompt(error: &str) -> String {
    format!("That schema was not usable:\n{}\n\nProduce a corrected JSON Schema.", error)
}

fn render_map(map: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();
    pairs.join(", ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut cut = max_chars;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}
