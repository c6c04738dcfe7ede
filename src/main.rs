use clap::Parser;
use pantry::{
    api::{handlers::AppState, routes},
    cli::{commands, Cli, Commands},
    config::Settings,
    embed, index,
    retriever::Retriever,
    Error, Result,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    // Silently ignore if file doesn't exist
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pantry=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::from_env()?;
    settings.validate()?;

    // Handle commands
    match cli.command {
        Commands::Serve { port, host } => {
            serve(settings, port, host).await?;
        }
        Commands::Ingest { input, random_ids } => {
            commands::ingest(&settings, &input, random_ids).await?;
        }
        Commands::Search {
            ingredients,
            tags,
            exclude,
            k,
        } => {
            commands::search(&settings, &ingredients, tags, exclude, k).await?;
        }
        Commands::Stats => {
            commands::stats(&settings).await?;
        }
    }

    Ok(())
}

async fn serve(mut settings: Settings, port: Option<u16>, host: Option<String>) -> Result<()> {
    // Override settings with CLI arguments
    if let Some(port) = port {
        settings.server.port = port;
    }
    if let Some(host) = host {
        settings.server.host = host;
    }

    info!("Starting Pantry server");
    info!("Index backend: {}", settings.index.backend);
    info!("Server: {}:{}", settings.server.host, settings.server.port);

    // Build the embedding provider
    let embedder = embed::build_embedder(&settings.embedding)?;
    info!(
        "Embedding model: {} ({} dimensions)",
        embedder.model_id(),
        embedder.dimension()
    );

    // Connect the vector index; fails fast on an unreachable backend or
    // a dimension mismatch against an existing collection
    let index = index::connect(&settings, embedder.clone()).await?;
    let indexed = index.count().await?;
    info!("Vector index ready ({} documents)", indexed);

    // Create application state
    let state = AppState {
        retriever: Arc::new(Retriever::new(index.clone())),
        index,
        settings: settings.clone(),
    };

    // Create router with rate limiting
    let app = routes::create_router(state, &settings);

    // Start server
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    println!("\n========================================");
    println!("Pantry Recipe Retrieval");
    println!("========================================");
    println!("Status: Running");
    println!("Address: http://{addr}");
    println!("Backend: {}", settings.index.backend);
    println!("Model: {}", embedder.model_id());
    println!("Documents: {indexed}");
    println!("\nAPI Endpoints:");
    println!("  POST /api/recipe");
    println!("  GET  /health");
    println!("  GET  /ready");
    println!("\nPress Ctrl+C to stop");
    println!("========================================\n");

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Internal(format!("Server error: {e}")))?;

    info!("Shutting down...");
    Ok(())
}
