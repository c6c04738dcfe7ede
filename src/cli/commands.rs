use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::{IndexBackend, Settings};
use crate::embed::build_embedder;
use crate::index::{self, VectorIndex};
use crate::ingest::{IngestOptions, Ingestor};
use crate::retriever::{RecipeResult, Retriever};
use crate::Result;

/// Ingest a JSON file of raw recipe records into the index
pub async fn ingest(settings: &Settings, input: &Path, random_ids: bool) -> Result<()> {
    let embedder = build_embedder(&settings.embedding)?;
    let options = IngestOptions {
        stable_ids: !random_ids,
    };

    let report = match settings.index.backend {
        IndexBackend::Memory => {
            let memory = index::connect_memory(settings, embedder).await?;
            let index: Arc<dyn VectorIndex> = memory.clone();
            let report = Ingestor::new(index, options).ingest_file(input).await?;

            // The memory backend only survives the process through its
            // snapshot file
            if let Some(path) = &settings.index.snapshot_path {
                memory.snapshot(path).await?;
                info!("Snapshot written to {}", path.display());
            }

            report
        }
        IndexBackend::Qdrant => {
            let index = index::connect(settings, embedder).await?;
            Ingestor::new(index, options).ingest_file(input).await?
        }
    };

    println!("\u{2713} Ingested: {}", input.display());
    println!("  Indexed: {}", report.indexed);
    println!("  Skipped: {}", report.skipped);

    Ok(())
}

/// Search the index for recipes matching ingredients and preferences
pub async fn search(
    settings: &Settings,
    ingredients: &str,
    tags: Option<String>,
    exclude: Option<String>,
    k: Option<usize>,
) -> Result<()> {
    let embedder = build_embedder(&settings.embedding)?;
    let index = index::connect(settings, embedder).await?;
    let retriever = Retriever::new(index);

    let ingredients = split_terms(ingredients);
    let tags = tags.as_deref().map(split_terms).unwrap_or_default();
    let exclude = exclude.as_deref().map(split_terms).unwrap_or_default();
    let k = k.unwrap_or(settings.retrieval.default_k);

    let results = retriever.find_recipe(&ingredients, &tags, &exclude, k).await?;

    print_results(&results);

    Ok(())
}

/// Show index statistics
pub async fn stats(settings: &Settings) -> Result<()> {
    let embedder = build_embedder(&settings.embedding)?;
    let index = index::connect(settings, embedder.clone()).await?;

    let total = index.count().await?;

    println!("Backend: {}", settings.index.backend);
    println!(
        "Model: {} ({} dimensions)",
        embedder.model_id(),
        embedder.dimension()
    );
    println!("Documents: {total}");

    Ok(())
}

// Helper functions

fn split_terms(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|term| term.trim().to_string())
        .filter(|term| !term.is_empty())
        .collect()
}

fn print_results(results: &[RecipeResult]) {
    if results.is_empty() {
        println!("No recipes found");
        return;
    }

    println!("\nFound {} recipes:\n", results.len());

    for (rank, recipe) in results.iter().enumerate() {
        println!("{}. {}", rank + 1, recipe.recipe_name);
        println!("   Ingredients: {}", truncate(&recipe.recipe_ingredients, 70));
        println!("   Tags: {}", truncate(&recipe.recipe_tags, 70));
        println!("   URL: {}", recipe.recipe_url);
        println!();
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_terms() {
        assert_eq!(
            split_terms("oat, milk , honey"),
            vec!["oat".to_string(), "milk".to_string(), "honey".to_string()]
        );
        assert_eq!(split_terms(""), Vec::<String>::new());
        assert_eq!(split_terms(" , ,"), Vec::<String>::new());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long ingredient list", 10), "a very ...");
    }
}
