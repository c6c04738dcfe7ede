pub mod config;
pub mod error;

// Ingestion pipeline
pub mod ingest;

// Embedding providers
pub mod embed;

// Vector index backends
pub mod index;

// Constrained retrieval
pub mod retriever;

// HTTP API
pub mod api;

// Command line interface
pub mod cli;

// Re-exports
pub use config::Settings;
pub use error::{Error, Result};
