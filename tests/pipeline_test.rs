//! End-to-end pipeline tests: scripted LLM + local HTTP fixtures.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use common::{spawn_server, ScriptedModel};
use stitch::domain::{ApiInput, CacheMode, ExtractInput, RequestOptions, TransformInput};
use stitch::engine::handler::IntegrationHandler;
use stitch::persistence::{Datastore, MemoryStore};

fn handler_with(
    model: Arc<ScriptedModel>,
    store: Arc<MemoryStore>,
) -> IntegrationHandler {
    IntegrationHandler::new(store, model.clone(), model)
}

fn endpoint_draft(host: &str, path: &str, extra: Value) -> Value {
    let mut draft = json!({
        "urlHost": host,
        "urlPath": path,
        "method": "GET",
        "authentication": "NONE",
    });
    if let (Value::Object(base), Value::Object(more)) = (&mut draft, extra) {
        base.extend(more);
    }
    draft
}

fn mapping_draft(expr: &str) -> Value {
    json!({
        "jsonata": expr,
        "confidence": 85,
        "confidence_reasoning": "source fields map directly"
    })
}

/// Happy path: synthesize a config, execute, synthesize a mapping,
/// validate, record the run.
#[tokio::test]
async fn call_returns_schema_conformant_data() {
    let app = Router::new().route(
        "/characters",
        get(|| async {
            Json(json!({"items": [
                {"name": "Fry", "species": "Human"},
                {"name": "Leela", "species": "Mutant"}
            ]}))
        }),
    );
    let addr = spawn_server(app).await;
    let host = format!("http://{}", addr);

    let model = Arc::new(ScriptedModel::new(vec![
        endpoint_draft(&host, "/characters", json!({"dataPath": "items"})),
        mapping_draft(r#"{"characters": $}"#),
    ]));
    let store = Arc::new(MemoryStore::new());
    let handler = handler_with(model.clone(), store.clone());

    let input = ApiInput {
        instruction: "get all characters".into(),
        url_host: Some(host),
        response_schema: Some(json!({
            "type": "object",
            "properties": {
                "characters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "species": {"type": "string"}
                        },
                        "required": ["name", "species"]
                    }
                }
            },
            "required": ["characters"]
        })),
        ..Default::default()
    };

    let run = handler
        .call(input, json!({}), HashMap::new(), RequestOptions::default())
        .await
        .unwrap();

    assert!(run.success, "run failed: {:?}", run.error);
    let characters = run.data.unwrap()["characters"].clone();
    assert_eq!(characters.as_array().unwrap().len(), 2);
    assert_eq!(characters[0]["name"], "Fry");
    assert_eq!(model.call_count(), 2);

    let (runs, total) = store.list_runs(10, 0, None).await.unwrap();
    assert_eq!(total, 1);
    assert!(runs[0].success);
}

/// Self-healing: the first synthesized config references a credential
/// that does not exist; the error feeds back and the second config
/// uses the right placeholder.
#[tokio::test]
async fn unresolved_variable_triggers_repair_loop() {
    let app = Router::new().route(
        "/private",
        get(|headers: HeaderMap| async move {
            if headers.get("authorization").map(|v| v.as_bytes()) == Some(b"Bearer x") {
                Json(json!({"ok": true}))
            } else {
                Json(json!({"error": "unauthorized"}))
            }
        }),
    );
    let addr = spawn_server(app).await;
    let host = format!("http://{}", addr);

    let model = Arc::new(ScriptedModel::new(vec![
        endpoint_draft(
            &host,
            "/private",
            json!({"headers": {"Authorization": "Bearer {apikey}"}}),
        ),
        endpoint_draft(
            &host,
            "/private",
            json!({"headers": {"Authorization": "Bearer {token}"}}),
        ),
    ]));
    let store = Arc::new(MemoryStore::new());
    let handler = handler_with(model.clone(), store.clone());

    let input = ApiInput {
        instruction: "read the private resource".into(),
        url_host: Some(host),
        ..Default::default()
    };
    let credentials: HashMap<String, String> =
        [("token".to_string(), "x".to_string())].into_iter().collect();

    let run = handler
        .call(input, json!({}), credentials, RequestOptions::default())
        .await
        .unwrap();

    assert!(run.success, "run failed: {:?}", run.error);
    assert_eq!(run.data.unwrap(), json!({"ok": true}));
    assert_eq!(model.call_count(), 2);

    // The repair turn carried the unresolved-variable context
    let second_call = &model.calls.lock().unwrap()[1];
    let last_user = second_call
        .iter()
        .rev()
        .find(|m| matches!(m.role, stitch::domain::Role::User))
        .unwrap();
    assert!(last_user.content.contains("apikey"));
}

/// A successful synthesized config lands in the cache; an identical
/// request reuses it without consulting the LLM.
#[tokio::test]
async fn cache_hit_skips_synthesis() {
    let app = Router::new().route("/ping", get(|| async { Json(json!({"pong": 1})) }));
    let addr = spawn_server(app).await;
    let host = format!("http://{}", addr);

    // Exactly one scripted response: a second synthesis would panic
    let model = Arc::new(ScriptedModel::new(vec![endpoint_draft(
        &host, "/ping", json!({}),
    )]));
    let store = Arc::new(MemoryStore::new());
    let handler = handler_with(model.clone(), store.clone());

    let input = ApiInput {
        instruction: "ping the service".into(),
        url_host: Some(host),
        ..Default::default()
    };

    let first = handler
        .call(
            input.clone(),
            json!({}),
            HashMap::new(),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert!(first.success);
    assert_eq!(model.call_count(), 1);

    let second = handler
        .call(input, json!({}), HashMap::new(), RequestOptions::default())
        .await
        .unwrap();
    assert!(second.success);
    assert_eq!(second.data.unwrap(), json!({"pong": 1}));
    assert_eq!(model.call_count(), 1);
    assert_eq!(second.config_id, first.config_id);
}

/// Disabled cache mode never reads nor writes the store.
#[tokio::test]
async fn disabled_cache_always_synthesizes() {
    let app = Router::new().route("/ping", get(|| async { Json(json!({"pong": 1})) }));
    let addr = spawn_server(app).await;
    let host = format!("http://{}", addr);

    let model = Arc::new(ScriptedModel::new(vec![
        endpoint_draft(&host, "/ping", json!({})),
        endpoint_draft(&host, "/ping", json!({})),
    ]));
    let store = Arc::new(MemoryStore::new());
    let handler = handler_with(model.clone(), store.clone());

    let input = ApiInput {
        instruction: "ping the service".into(),
        url_host: Some(host),
        ..Default::default()
    };
    let options = RequestOptions {
        cache_mode: CacheMode::Disabled,
        ..Default::default()
    };

    handler
        .call(input.clone(), json!({}), HashMap::new(), options.clone())
        .await
        .unwrap();
    handler
        .call(input, json!({}), HashMap::new(), options)
        .await
        .unwrap();
    assert_eq!(model.call_count(), 2);

    let (configs, _) = store.list_api_configs(10, 0).await.unwrap();
    assert!(configs.is_empty());
}

/// Gzip-compressed CSV with AUTO everything: decompress, parse, type.
#[tokio::test]
async fn extract_parses_compressed_csv() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"id,name\n1,Ada\n2,Grace\n").unwrap();
    let compressed = encoder.finish().unwrap();

    let app = Router::new().route(
        "/report.csv.gz",
        get(move || {
            let bytes = compressed.clone();
            async move { bytes }
        }),
    );
    let addr = spawn_server(app).await;
    let host = format!("http://{}", addr);

    let model = Arc::new(ScriptedModel::new(vec![json!({
        "urlHost": host,
        "urlPath": "/report.csv.gz",
        "method": "GET",
        "authentication": "NONE",
        "decompressionMethod": "AUTO",
        "fileType": "AUTO",
    })]));
    let store = Arc::new(MemoryStore::new());
    let handler = handler_with(model.clone(), store.clone());

    let input = ExtractInput {
        instruction: "pull the id/name report".into(),
        url_host: Some(host.clone()),
        ..Default::default()
    };

    let run = handler
        .extract(
            input,
            json!({}),
            HashMap::new(),
            RequestOptions::for_extract(),
        )
        .await
        .unwrap();

    assert!(run.success, "run failed: {:?}", run.error);
    assert_eq!(
        run.data.unwrap(),
        json!([{"id": 1, "name": "Ada"}, {"id": 2, "name": "Grace"}])
    );
}

/// Uploaded bytes skip synthesis entirely.
#[tokio::test]
async fn extract_accepts_uploaded_file() {
    let model = Arc::new(ScriptedModel::new(vec![]));
    let store = Arc::new(MemoryStore::new());
    let handler = handler_with(model.clone(), store.clone());

    let input = ExtractInput {
        instruction: "parse the upload".into(),
        file: Some(b"[{\"k\": 1}]".to_vec()),
        ..Default::default()
    };

    let run = handler
        .extract(
            input,
            json!({}),
            HashMap::new(),
            RequestOptions::for_extract(),
        )
        .await
        .unwrap();

    assert!(run.success);
    assert_eq!(run.data.unwrap(), json!([{"k": 1}]));
    assert_eq!(model.call_count(), 0);
}

/// Webhook notification fires after the run completes.
#[tokio::test]
async fn webhook_receives_run_outcome() {
    use std::sync::Mutex;
    use tokio::time::{sleep, timeout, Duration};

    let app = Router::new().route("/ping", get(|| async { Json(json!({"pong": 1})) }));
    let addr = spawn_server(app).await;
    let host = format!("http://{}", addr);

    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let hook_app = Router::new().route(
        "/hook",
        axum::routing::post(move |Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(body);
                "ok"
            }
        }),
    );
    let hook_addr = spawn_server(hook_app).await;

    let model = Arc::new(ScriptedModel::new(vec![endpoint_draft(
        &host, "/ping", json!({}),
    )]));
    let store = Arc::new(MemoryStore::new());
    let handler = handler_with(model.clone(), store.clone());

    let input = ApiInput {
        instruction: "ping the service".into(),
        url_host: Some(host),
        ..Default::default()
    };
    let options = RequestOptions {
        webhook_url: Some(format!("http://{}/hook", hook_addr)),
        ..Default::default()
    };

    let run = handler
        .call(input, json!({}), HashMap::new(), options)
        .await
        .unwrap();
    assert!(run.success);

    timeout(Duration::from_secs(2), async {
        while received.lock().unwrap().is_empty() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("webhook was never delivered");

    let delivered = received.lock().unwrap();
    assert_eq!(delivered[0]["runId"], run.id.as_str());
    assert_eq!(delivered[0]["success"], true);
}

/// Standalone transform with the full retry flow: first draft fails
/// validation, the corrected second draft is returned and cached.
#[tokio::test]
async fn transform_retries_and_caches() {
    let model = Arc::new(ScriptedModel::new(vec![
        mapping_draft("user.firstName & user.lastName"),
        mapping_draft(r#"{"name": user.first & " " & user.last}"#),
    ]));
    let store = Arc::new(MemoryStore::new());
    let handler = handler_with(model.clone(), store.clone());

    let input = TransformInput {
        instruction: "full name".into(),
        response_schema: Some(json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        })),
        ..Default::default()
    };
    let data = json!({"user": {"first": "J", "last": "D"}});

    let run = handler
        .transform(input, data, RequestOptions::default())
        .await
        .unwrap();

    assert!(run.success, "run failed: {:?}", run.error);
    assert_eq!(run.data.unwrap(), json!({"name": "J D"}));
    assert_eq!(model.call_count(), 2);

    let (transforms, total) = store.list_transform_configs(10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(
        transforms[0].response_mapping.as_deref(),
        Some(r#"{"name": user.first & " " & user.last}"#)
    );
}
