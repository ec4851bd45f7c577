//! Error types for the integration engine

use thiserror::Error;

/// Errors that can occur while synthesizing or executing an integration
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Missing or invalid caller-supplied inputs
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Placeholders referenced by the config with no binding
    #[error("Unresolved variables: {}", .0.join(", "))]
    UnresolvedVariables(Vec<String>),

    /// Upstream API returned a failure status or an error body
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
        /// Method, headers and query of the failing request, for repair context
        request_summary: String,
    },

    /// Upstream returned an HTML document where JSON was expected
    #[error("Received HTML instead of JSON from {url}")]
    HtmlResponse { url: String },

    /// LLM provider failure
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Transform output failed schema validation
    #[error("Mapping validation failed: {0}")]
    MappingValidation(String),

    /// JSONata evaluation failure
    #[error("Expression error: {0}")]
    Expression(String),

    /// File decompression or parsing failure
    #[error("Parse error: {0}")]
    Parse(String),

    /// Datastore failure
    #[error("Datastore error: {0}")]
    Datastore(String),

    /// The synthesis repair budget was exhausted
    #[error("Gave up after {attempts} repair attempts: {last_error}")]
    RepairExhausted { attempts: u32, last_error: String },
}

impl IntegrationError {
    /// Whether the endpoint synthesizer can usefully see this error as
    /// feedback. Everything else is surfaced to the caller immediately.
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            IntegrationError::Http { .. }
                | IntegrationError::HtmlResponse { .. }
                | IntegrationError::UnresolvedVariables(_)
        )
    }
}

/// Errors specific to LLM provider operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// API error
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// The completion was not valid JSON or did not match the response schema
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        /// Raw completion text, surfaced so retry loops can feed it back
        raw: String,
    },

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IntegrationError {
    fn from(err: serde_json::Error) -> Self {
        IntegrationError::Parse(err.to_string())
    }
}

/// Result type alias for integration operations
pub type IntegrationResult<T> = Result<T, IntegrationError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
