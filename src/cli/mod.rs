pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pantry")]
#[command(about = "Pantry - Ingredient-driven recipe retrieval", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the retrieval server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,
    },

    /// Ingest a JSON file of raw recipe records
    Ingest {
        /// Path to a JSON file holding an array of raw records
        input: PathBuf,

        /// Assign random document ids instead of ids derived from source URLs
        #[arg(long)]
        random_ids: bool,
    },

    /// Search the index for recipes
    Search {
        /// Comma-separated available ingredients
        ingredients: String,

        /// Comma-separated preferred tags
        #[arg(long)]
        tags: Option<String>,

        /// Comma-separated allergic ingredients to exclude
        #[arg(long)]
        exclude: Option<String>,

        /// Number of results to return
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show index statistics
    Stats,
}
