//! Request executor tests against local HTTP fixtures.

mod common;

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use common::{spawn_server, RequestCounter};
use stitch::adapters::http_caller::HttpCaller;
use stitch::domain::{
    ApiConfig, AuthType, HttpMethod, PaginationConfig, PaginationType, RequestOptions,
};
use stitch::engine::executor::execute_api;
use stitch::error::IntegrationError;

fn base_config(url_host: String) -> ApiConfig {
    ApiConfig {
        id: "test".into(),
        version: None,
        created_at: 0,
        updated_at: 0,
        url_host,
        url_path: Some("/items".into()),
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
    }
}

fn fast_options() -> RequestOptions {
    RequestOptions {
        retries: 0,
        retry_delay_ms: 10,
        ..Default::default()
    }
}

/// 173 items served offset-based: expect 4 fetches (50+50+50+23).
#[tokio::test]
async fn offset_pagination_collects_all_pages() {
    let counter = RequestCounter::default();
    let c = counter.clone();

    let app = Router::new().route(
        "/items",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let c = c.clone();
            async move {
                c.increment();
                let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
                let limit: usize = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(50);
                let items: Vec<Value> = (offset..(offset + limit).min(173))
                    .map(|i| json!({"id": i}))
                    .collect();
                Json(items)
            }
        }),
    );
    let addr = spawn_server(app).await;

    let mut config = base_config(format!("http://{}", addr));
    config.pagination = Some(PaginationConfig {
        pagination_type: PaginationType::OffsetBased,
        page_size: 50,
    });
    config.query_params = Some(
        [
            ("offset".to_string(), "{offset}".to_string()),
            ("limit".to_string(), "{limit}".to_string()),
        ]
        .into_iter()
        .collect(),
    );

    let outcome = execute_api(
        &HttpCaller::new(),
        &config,
        &json!({}),
        &HashMap::new(),
        &fast_options(),
    )
    .await
    .unwrap();

    assert_eq!(counter.get(), 4);
    let items = outcome.data.as_array().unwrap();
    assert_eq!(items.len(), 173);
    assert_eq!(items[0], json!({"id": 0}));
    assert_eq!(items[172], json!({"id": 172}));
}

/// An endpoint that ignores paging parameters replays the same page;
/// the identical-page guard must stop the loop.
#[tokio::test]
async fn identical_pages_terminate_pagination() {
    let counter = RequestCounter::default();
    let c = counter.clone();

    let app = Router::new().route(
        "/items",
        get(move || {
            let c = c.clone();
            async move {
                c.increment();
                // Always a full page, paging params ignored
                let items: Vec<Value> = (0..50).map(|i| json!({"id": i})).collect();
                Json(items)
            }
        }),
    );
    let addr = spawn_server(app).await;

    let mut config = base_config(format!("http://{}", addr));
    config.pagination = Some(PaginationConfig {
        pagination_type: PaginationType::PageBased,
        page_size: 50,
    });

    let outcome = execute_api(
        &HttpCaller::new(),
        &config,
        &json!({}),
        &HashMap::new(),
        &fast_options(),
    )
    .await
    .unwrap();

    assert_eq!(counter.get(), 2);
    assert_eq!(outcome.data.as_array().unwrap().len(), 50);
}

/// Unresolved placeholders abort before any HTTP call.
#[tokio::test]
async fn unresolved_variables_abort_without_http() {
    let counter = RequestCounter::default();
    let c = counter.clone();

    let app = Router::new().route(
        "/items",
        get(move || {
            let c = c.clone();
            async move {
                c.increment();
                Json(json!([]))
            }
        }),
    );
    let addr = spawn_server(app).await;

    let mut config = base_config(format!("http://{}", addr));
    config.headers = Some(
        [("Authorization".to_string(), "Bearer {apikey}".to_string())]
            .into_iter()
            .collect(),
    );

    let err = execute_api(
        &HttpCaller::new(),
        &config,
        &json!({}),
        &HashMap::new(),
        &fast_options(),
    )
    .await
    .unwrap_err();

    match err {
        IntegrationError::UnresolvedVariables(names) => {
            assert_eq!(names, vec!["apikey".to_string()])
        }
        other => panic!("expected UnresolvedVariables, got {:?}", other),
    }
    assert_eq!(counter.get(), 0);
}

/// Payload and credential values bind placeholders across the request.
#[tokio::test]
async fn variables_interpolate_into_request() {
    #[derive(Clone)]
    struct Seen(RequestCounter);

    let seen = RequestCounter::default();
    let s = Seen(seen.clone());

    let app = Router::new().route(
        "/items",
        get(
            move |State(Seen(c)): State<Seen>,
                  headers: axum::http::HeaderMap,
                  Query(params): Query<HashMap<String, String>>| {
                async move {
                    c.increment();
                    assert_eq!(headers.get("x-api-key").unwrap(), "sekrit");
                    assert_eq!(params.get("q").unwrap(), "widgets");
                    Json(json!({"ok": true}))
                }
            },
        ),
    )
    .with_state(s);
    let addr = spawn_server(app).await;

    let mut config = base_config(format!("http://{}", addr));
    config.headers = Some(
        [("X-Api-Key".to_string(), "{apiKey}".to_string())]
            .into_iter()
            .collect(),
    );
    config.query_params = Some(
        [("q".to_string(), "{search}".to_string())]
            .into_iter()
            .collect(),
    );

    let credentials: HashMap<String, String> =
        [("apiKey".to_string(), "sekrit".to_string())].into_iter().collect();
    let outcome = execute_api(
        &HttpCaller::new(),
        &config,
        &json!({"search": "widgets"}),
        &credentials,
        &fast_options(),
    )
    .await
    .unwrap();

    assert_eq!(seen.get(), 1);
    assert_eq!(outcome.data, json!({"ok": true}));
}

/// Data path extraction drills into wrapped responses; scalar results
/// end the loop.
#[tokio::test]
async fn data_path_extracts_wrapped_payload() {
    let app = Router::new().route(
        "/items",
        get(|| async { Json(json!({"result": {"items": [{"id": 1}, {"id": 2}]}})) }),
    );
    let addr = spawn_server(app).await;

    let mut config = base_config(format!("http://{}", addr));
    config.data_path = Some("$.result.items".into());

    let outcome = execute_api(
        &HttpCaller::new(),
        &config,
        &json!({}),
        &HashMap::new(),
        &fast_options(),
    )
    .await
    .unwrap();

    assert!(outcome.data_path_success);
    assert_eq!(outcome.data, json!([{"id": 1}, {"id": 2}]));
}

/// HTTP 429 with Retry-After above the 60s cap fails without retrying.
#[tokio::test]
async fn rate_limit_over_cap_fails_non_retryably() {
    let counter = RequestCounter::default();
    let c = counter.clone();

    let app = Router::new().route(
        "/items",
        get(move || {
            let c = c.clone();
            async move {
                c.increment();
                ([("Retry-After", "120")], StatusCode::TOO_MANY_REQUESTS).into_response()
            }
        }),
    );
    let addr = spawn_server(app).await;

    let config = base_config(format!("http://{}", addr));
    let err = execute_api(
        &HttpCaller::new(),
        &config,
        &json!({}),
        &HashMap::new(),
        &RequestOptions {
            retries: 3,
            retry_delay_ms: 10,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();

    match err {
        IntegrationError::Http { status, .. } => assert_eq!(status, 429),
        other => panic!("expected Http error, got {:?}", other),
    }
    assert_eq!(counter.get(), 1);
}

/// Responses that are HTML documents are rejected as such.
#[tokio::test]
async fn html_body_is_rejected() {
    let app = Router::new().route(
        "/items",
        get(|| async { "<!doctype html><html><body>login</body></html>" }),
    );
    let addr = spawn_server(app).await;

    let config = base_config(format!("http://{}", addr));
    let err = execute_api(
        &HttpCaller::new(),
        &config,
        &json!({}),
        &HashMap::new(),
        &fast_options(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, IntegrationError::HtmlResponse { .. }));
}

/// A 2xx body with an error field is a failure for the repair loop.
#[tokio::test]
async fn error_field_in_body_is_a_failure() {
    let app = Router::new().route(
        "/items",
        get(|| async { Json(json!({"error": "invalid cursor"})) }),
    );
    let addr = spawn_server(app).await;

    let config = base_config(format!("http://{}", addr));
    let err = execute_api(
        &HttpCaller::new(),
        &config,
        &json!({}),
        &HashMap::new(),
        &fast_options(),
    )
    .await
    .unwrap_err();

    match err {
        IntegrationError::Http { status, body, .. } => {
            assert_eq!(status, 200);
            assert!(body.contains("invalid cursor"));
        }
        other => panic!("expected Http error, got {:?}", other),
    }
}

/// 5xx responses are retried with backoff until the budget runs out.
#[tokio::test]
async fn server_errors_retry_then_surface() {
    let counter = RequestCounter::default();
    let c = counter.clone();

    let app = Router::new().route(
        "/items",
        get(move || {
            let c = c.clone();
            async move {
                let n = c.increment();
                if n < 3 {
                    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
                } else {
                    Json(json!([{"id": 1}])).into_response()
                }
            }
        }),
    );
    let addr = spawn_server(app).await;

    let config = base_config(format!("http://{}", addr));
    let outcome = execute_api(
        &HttpCaller::new(),
        &config,
        &json!({}),
        &HashMap::new(),
        &RequestOptions {
            retries: 5,
            retry_delay_ms: 10,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(counter.get(), 3);
    assert_eq!(outcome.data, json!({"id": 1}));
}
