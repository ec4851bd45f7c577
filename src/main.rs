use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use stitch::cli::Cli;
use stitch::config::{DatastoreKind, Settings};
use stitch::engine::handler::IntegrationHandler;
use stitch::persistence::{Datastore, FileStore, MemoryStore, RedisStore};
use stitch::synth::llm::{build_model, build_schema_model};
use stitch::synth::ChatModel;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration with CLI overrides
    let settings = Settings::new_with_cli(&cli)?;
    let host = settings.server.host.clone();
    let port = settings.server.port;

    info!("Starting Stitch integration engine on {}:{}", host, port);

    // Select the datastore backend
    let store: Arc<dyn Datastore> = match settings.datastore.kind {
        DatastoreKind::Memory => {
            info!("Using in-memory datastore");
            Arc::new(MemoryStore::new())
        }
        DatastoreKind::File => {
            info!(dir = %settings.datastore.storage_dir, "Using file datastore");
            Arc::new(FileStore::new(&settings.datastore.storage_dir)?)
        }
        DatastoreKind::Redis => {
            info!(host = %settings.datastore.redis.host, "Using Redis datastore");
            Arc::new(RedisStore::connect(&settings.datastore.redis).await?)
        }
    };

    // Build LLM models (schema generation may use a distinct model)
    let model = Arc::new(build_model(&settings.llm)?);
    let schema_model = Arc::new(build_schema_model(&settings.llm)?);
    info!(model = model.model(), "LLM provider configured");

    // Wire the integration handler
    let handler = Arc::new(IntegrationHandler::new(
        store.clone(),
        model,
        schema_model,
    ));

    // Create application router
    let app = stitch::create_app(
        store,
        handler,
        settings.auth_token.clone(),
        settings.server.cors_origin.clone(),
    );

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
