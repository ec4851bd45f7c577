//! Shared test fixtures: a scripted LLM and local HTTP servers.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use serde_json::Value;

use stitch::domain::ChatMessage;
use stitch::error::LlmResult;
use stitch::synth::ChatModel;

/// A ChatModel that replays canned completions in order and records
/// the conversations it was shown.
pub struct ScriptedModel {
    name: String,
    responses: Mutex<Vec<Value>>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            name: "scripted".to_string(),
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _response_schema: &Value,
        _temperature: Option<f32>,
    ) -> LlmResult<Value> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        assert!(!responses.is_empty(), "scripted model ran out of responses");
        Ok(responses.remove(0))
    }
}

/// Serve `router` on an ephemeral local port, returning its address.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture server");
    let addr = listener.local_addr().expect("fixture addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    addr
}

/// Shared request counter for fixtures that need to assert call counts.
#[derive(Clone, Default)]
pub struct RequestCounter(pub Arc<AtomicUsize>);

impl RequestCounter {
    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
