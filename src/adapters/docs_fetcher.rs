//! API documentation retrieval
//!
//! Best-effort: synthesis proceeds with whatever text can be fetched,
//! including none. HTML documentation pages are reduced to their text
//! content before being handed to the LLM.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

/// Fetches and normalizes documentation text for the synthesizers.
#[derive(Clone)]
pub struct DocsFetcher {
    client: reqwest::Client,
}

impl DocsFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Fetch documentation from `url`. Returns an empty string on any
    /// failure so synthesis can continue without docs.
    pub async fn fetch(
        &self,
        url: &str,
        headers: Option<&HashMap<String, String>>,
        query_params: Option<&HashMap<String, String>>,
    ) -> String {
        let mut builder = self.client.get(url).timeout(Duration::from_secs(60));
        if let Some(headers) = headers {
            for (key, value) in headers {
                builder = builder.header(key, value);
            }
        }
        if let Some(params) = query_params {
            builder = builder.query(params);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    warn!(url, status = status.as_u16(), "documentation fetch failed");
                    return String::new();
                }
                let text = response.text().await.unwrap_or_default();
                debug!(url, bytes = text.len(), "fetched documentation");
                normalize(&text)
            }
            Err(err) => {
                warn!(url, error = %err, "documentation fetch failed");
                String::new()
            }
        }
    }
}

impl Default for DocsFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip markup from HTML documentation pages; plain text and JSON
/// (e.g. an OpenAPI document) pass through untouched.
fn normalize(text: &str) -> String {
    let trimmed = text.trim_start();
    let looks_like_html = trimmed.starts_with('<')
        && (trimmed[..trimmed.len().min(256)].to_ascii_lowercase().contains("<html")
            || trimmed[..trimmed.len().min(256)].to_ascii_lowercase().contains("<!doctype"));
    if !looks_like_html {
        return text.to_string();
    }

    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let blocks = BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)>").expect("block regex")
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));

    let without_blocks = blocks.replace_all(text, " ");
    let without_tags = tags.replace_all(&without_blocks, " ");
    without_tags
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_pages_are_reduced_to_text() {
        let html = "<!doctype html><html><head><style>p{}</style></head>\
                    <body><h1>Users API</h1><p>GET /users lists users.</p></body></html>";
        let text = normalize(html);
        assert_eq!(text, "Users API GET /users lists users.");
    }

    #[test]
    fn plain_text_passes_through() {
        let text = "GET /users\nReturns the users.";
        assert_eq!(normalize(text), text);
    }

    #[test]
    fn openapi_json_passes_through() {
        let doc = r#"{"openapi": "3.0.0", "paths": {"/users": {}}}"#;
        assert_eq!(normalize(doc), doc);
    }
}
