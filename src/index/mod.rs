pub mod filter;
pub mod memory;
pub mod mmr;
pub mod qdrant;

use crate::config::{IndexBackend, Settings};
use crate::embed::TextEmbedder;
use crate::error::{Error, Result};
use crate::ingest::document::IndexedDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub use filter::{FieldCondition, MatchPredicate, StructuralFilter};
pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

/// One retrieved point: the stored payload (metadata plus the body text
/// under `search_text`) and its relevance score. A hit that came back
/// without a payload carries `None`; post-processing applies its batch
/// policy to that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: Option<BTreeMap<String, String>>,
}

/// Capability contract implemented per backend. Everything above the
/// index depends on this trait, never on a concrete backend type.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embeds and stores a batch as one upsert call, returning the
    /// stored ids in input order. Duplicate ids replace their entry;
    /// distinct ids accumulate, duplicates included.
    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<Vec<Uuid>>;

    /// Filtered similarity search returning at most `k` hits, ordered
    /// by decreasing relevance after the diversity re-rank. Zero
    /// matches is an empty vec, not an error.
    async fn search(
        &self,
        query_text: &str,
        k: usize,
        filter: &StructuralFilter,
    ) -> Result<Vec<SearchHit>>;

    /// Number of stored points.
    async fn count(&self) -> Result<usize>;
}

/// Builds the configured backend. Qdrant bootstraps its collection here
/// so a dimension mismatch stops startup; the memory backend restores
/// its snapshot when one is configured and present.
pub async fn connect(
    settings: &Settings,
    embedder: Arc<dyn TextEmbedder>,
) -> Result<Arc<dyn VectorIndex>> {
    match settings.index.backend {
        IndexBackend::Memory => Ok(connect_memory(settings, embedder).await?),
        IndexBackend::Qdrant => {
            let index =
                QdrantIndex::connect(&settings.index, settings.retrieval.clone(), embedder).await?;
            Ok(Arc::new(index))
        }
    }
}

/// Builds the memory backend, restoring a snapshot when one exists.
/// Concrete return type so callers can save a snapshot afterwards.
pub async fn connect_memory(
    settings: &Settings,
    embedder: Arc<dyn TextEmbedder>,
) -> Result<Arc<MemoryIndex>> {
    let index = MemoryIndex::new(embedder, settings.retrieval.clone());
    if let Some(path) = &settings.index.snapshot_path {
        if path.exists() {
            index.restore(path).await?;
        } else {
            info!("No snapshot at {}, starting empty", path.display());
        }
    }
    Ok(Arc::new(index))
}

/// Runs batch embedding on the blocking pool. Model inference is
/// CPU-bound; this is the suspension point that keeps a slow embed from
/// stalling the async workers.
pub(crate) async fn embed_batch_blocking(
    embedder: &Arc<dyn TextEmbedder>,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    let embedder = Arc::clone(embedder);
    tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| Error::Internal(format!("Embedding task failed: {e}")))?
}

/// Embeds a single query text on the blocking pool.
pub(crate) async fn embed_query_blocking(
    embedder: &Arc<dyn TextEmbedder>,
    query_text: &str,
) -> Result<Vec<f32>> {
    embed_batch_blocking(embedder, vec![query_text.to_string()])
        .await?
        .pop()
        .ok_or_else(|| Error::Embedding("Provider returned no query vector".to_string()))
}
