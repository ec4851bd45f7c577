//! Domain types for the integration engine
//!
//! Request templates, transform configs, run records, and the chat turn
//! log that ties synthesis iterations together.

mod config;
mod message;
mod run;

pub use config::*;
pub use message::*;
pub use run::*;

/// Epoch milliseconds, the timestamp convention used across entities.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Deterministic id for a canonicalized value: the MD5 of its JSON
/// serialization (serde_json orders object keys, so equal values hash
/// equally). Enables cache lookup of synthesized configs.
pub fn content_hash(value: &serde_json::Value) -> String {
    use md5::{Digest, Md5};
    let canonical = serde_json::to_string(value).unwrap_or_default();
    let digest = Md5::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
