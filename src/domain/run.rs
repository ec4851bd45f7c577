//! Run records
//!
//! One record per invocation, append-only, never mutated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::now_millis;

/// Outcome of a single `call`/`extract`/`transform` invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: u64,
    pub completed_at: u64,
    /// The config that produced this run, serialized in its wire shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    /// Id of that config, for filtered run listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
}

impl RunResult {
    /// Start a run record; completed via [`RunResult::succeed`] or
    /// [`RunResult::fail`].
    pub fn begin() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            success: false,
            data: None,
            error: None,
            started_at: now_millis(),
            completed_at: 0,
            config: None,
            config_id: None,
        }
    }

    pub fn with_config<C: Serialize>(mut self, config: &C, config_id: &str) -> Self {
        self.config = serde_json::to_value(config).ok();
        self.config_id = Some(config_id.to_string());
        self
    }

    pub fn succeed(mut self, data: Value) -> Self {
        self.success = true;
        self.data = Some(data);
        self.completed_at = now_millis();
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.completed_at = now_millis();
        self
    }
}
