//! # Stitch - Self-Healing API Integration Engine
//!
//! Stitch turns a natural-language instruction, an endpoint hint, and
//! a desired output schema into validated data. An LLM synthesizes a
//! concrete request configuration from the target's documentation; the
//! engine executes it (authentication, pagination, retries), extracts
//! the payload, and applies a synthesized JSONata mapping validated
//! against the requested JSON Schema. Failures feed back into the LLM
//! as repair context until the output validates.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stitch::config::Settings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let settings = Settings::new()?;
//!
//!     // Server will start on configured host:port
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Domain**: configs, run records, the synthesis turn log
//! - **Engine**: interpolation, execution, file extraction, job queue
//! - **Synth**: LLM-driven generators with bounded repair loops
//! - **Adapters**: GraphQL surface, outbound HTTP, docs fetching
//! - **Persistence**: memory/file/Redis datastores behind one port

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod jsonata;
pub mod persistence;
pub mod schema;
pub mod synth;

use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::routing::{get, post};
use axum::Router;

use crate::adapters::graphql::{build_schema, graphql_handler};
use crate::engine::handler::IntegrationHandler;
use crate::persistence::Datastore;

/// Creates the Axum application router with all endpoints configured.
pub fn create_app(
    store: Arc<dyn Datastore>,
    handler: Arc<IntegrationHandler>,
    auth_token: Option<String>,
    cors_origin: Option<String>,
) -> Router {
    let schema = build_schema(store, handler);

    let mut graphql_routes = Router::new()
        .route("/graphql", post(graphql_handler))
        .with_state(schema);

    if let Some(token) = auth_token {
        let expected = format!("Bearer {}", token);
        graphql_routes = graphql_routes.layer(middleware::from_fn(
            move |req: axum::extract::Request, next: Next| {
                let expected = expected.clone();
                async move {
                    let authorized = req
                        .headers()
                        .get(axum::http::header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v == expected)
                        .unwrap_or(false);
                    if authorized {
                        Ok(next.run(req).await)
                    } else {
                        Err(StatusCode::UNAUTHORIZED)
                    }
                }
            },
        ));
    }

    let cors = match cors_origin.and_then(|o| o.parse::<HeaderValue>().ok()) {
        Some(origin) => tower_http::cors::CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        None => tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    };

    Router::new()
        .route("/health", get(adapters::health_handler::health))
        .merge(graphql_routes)
        .layer(cors)
}
