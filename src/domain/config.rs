//! Request and transform configuration types
//!
//! These are the entities synthesized by the LLM and persisted through
//! the datastore. Field names serialize in camelCase to match the wire
//! format of the public API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::now_millis;

/// HTTP method of a request template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        };
        write!(f, "{}", s)
    }
}

/// How credentials are attached to the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
    #[default]
    None,
    Header,
    QueryParam,
    Oauth2,
}

/// Pagination strategy bound via the reserved `page`/`offset`/`limit` vars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaginationType {
    OffsetBased,
    PageBased,
    #[default]
    Disabled,
}

/// Pagination settings on a request template
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationConfig {
    #[serde(rename = "type")]
    pub pagination_type: PaginationType,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    50
}

/// Decompression applied to a fetched file before parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecompressionMethod {
    Gzip,
    Deflate,
    Zip,
    #[default]
    Auto,
    None,
}

/// File format of an extract source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    Csv,
    Json,
    Xml,
    #[default]
    Auto,
}

/// Policy controlling read/write interaction with the config cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheMode {
    #[default]
    Enabled,
    Readonly,
    Writeonly,
    Disabled,
}

impl CacheMode {
    pub fn reads(&self) -> bool {
        matches!(self, CacheMode::Enabled | CacheMode::Readonly)
    }

    pub fn writes(&self) -> bool {
        matches!(self, CacheMode::Enabled | CacheMode::Writeonly)
    }
}

/// A fully-resolved HTTP request template
///
/// Produced by the endpoint synthesizer, mutated only by synthesis
/// retries (each retry yields a new in-memory config), persisted at the
/// caller's request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    /// Scheme + host, e.g. `https://api.example.com`
    pub url_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
    #[serde(default)]
    pub method: HttpMethod,
    /// Header values may contain `{var}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<HashMap<String, String>>,
    /// Raw body template, interpreted as JSON after interpolation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub authentication: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationConfig>,
    /// Dot-separated path into the response JSON; a leading `$` means root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mapping: Option<String>,
}

impl ApiConfig {
    /// Full request URL (host + optional path)
    pub fn url(&self) -> String {
        match &self.url_path {
            Some(path) if !path.is_empty() => {
                let host = self.url_host.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{}/{}", host, path)
            }
            _ => self.url_host.clone(),
        }
    }
}

/// A file/URL extraction template
///
/// Same shape as [`ApiConfig`] minus pagination, plus decompression and
/// file-type handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    pub url_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub authentication: AuthType,
    #[serde(default)]
    pub decompression_method: DecompressionMethod,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}

impl ExtractConfig {
    pub fn url(&self) -> String {
        match &self.url_path {
            Some(path) if !path.is_empty() => {
                let host = self.url_host.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{}/{}", host, path)
            }
            _ => self.url_host.clone(),
        }
    }
}

/// A synthesized response-mapping paired with the schema it satisfies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    pub instruction: String,
    pub response_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mapping: Option<String>,
    /// Model's self-assessed confidence in the mapping, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_reasoning: Option<String>,
}

/// Per-call execution options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default)]
    pub cache_mode: CacheMode,
    /// Per-HTTP-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Initial backoff delay in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::default(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            webhook_url: None,
        }
    }
}

impl RequestOptions {
    /// Extract sources download large files; give them a longer leash.
    pub fn for_extract() -> Self {
        Self {
            timeout_ms: 300_000,
            ..Self::default()
        }
    }
}

/// Caller-supplied request shape for `call`: either a stored config id
/// or an inline endpoint description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mapping: Option<String>,
}

/// Caller-supplied request shape for `extract`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decompression_method: Option<DecompressionMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    /// Raw file bytes supplied directly instead of a URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mapping: Option<String>,
}

/// Caller-supplied request shape for `transform`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mapping: Option<String>,
}

/// Stamp creation/update timestamps on a fresh entity
pub fn fresh_timestamps() -> (u64, u64) {
    let now = now_millis();
    (now, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_config_url_joins_host_and_path() {
        let cfg = ApiConfig {
            id: "c1".into(),
            version: None,
            created_at: 0,
            updated_at: 0,
            url_host: "https://api.example.com/".into(),
            url_path: Some("/v2/items".into()),
            method: HttpMethod::Get,
            headers: None,
            query_params: None,
            body: None,
            authentication: AuthType::None,
            pagination: None,
            data_path: None,
            instruction: "list items".into(),
            documentation_url: None,
            response_schema: None,
            response_mapping: None,
        };
        assert_eq!(cfg.url(), "https://api.example.com/v2/items");
    }

    #[test]
    fn enums_serialize_in_wire_format() {
        assert_eq!(
            serde_json::to_string(&AuthType::QueryParam).unwrap(),
            "\"QUERY_PARAM\""
        );
        assert_eq!(
            serde_json::to_string(&PaginationType::OffsetBased).unwrap(),
            "\"OFFSET_BASED\""
        );
        assert_eq!(serde_json::to_string(&HttpMethod::Get).unwrap(), "\"GET\"");
    }

    #[test]
    fn cache_mode_semantics() {
        assert!(CacheMode::Enabled.reads() && CacheMode::Enabled.writes());
        assert!(CacheMode::Readonly.reads() && !CacheMode::Readonly.writes());
        assert!(!CacheMode::Writeonly.reads() && CacheMode::Writeonly.writes());
        assert!(!CacheMode::Disabled.reads() && !CacheMode::Disabled.writes());
    }

    #[test]
    fn api_config_round_trips_camel_case() {
        let json = serde_json::json!({
            "id": "abc",
            "urlHost": "https://x.dev",
            "method": "POST",
            "authentication": "HEADER",
            "instruction": "do it",
            "pagination": {"type": "PAGE_BASED", "pageSize": 25}
        });
        let cfg: ApiConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.method, HttpMethod::Post);
        assert_eq!(cfg.authentication, AuthType::Header);
        let p = cfg.pagination.unwrap();
        assert_eq!(p.pagination_type, PaginationType::PageBased);
        assert_eq!(p.page_size, 25);
    }
}
