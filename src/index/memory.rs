use crate::config::RetrievalConfig;
use crate::embed::TextEmbedder;
use crate::error::{Error, Result};
use crate::index::filter::StructuralFilter;
use crate::index::mmr::{cosine_similarity, maximal_marginal_relevance};
use crate::index::{embed_batch_blocking, embed_query_blocking, SearchHit, VectorIndex};
use crate::ingest::document::{IndexedDocument, SEARCH_TEXT_KEY};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// One stored point; also the JSONL snapshot record, one per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    id: Uuid,
    vector: Vec<f32>,
    payload: BTreeMap<String, String>,
}

/// In-process vector index. Evaluates filters and cosine scores
/// locally; embedding runs on the blocking pool through the shared
/// provider. Reads run concurrently, upserts take the write lock.
pub struct MemoryIndex {
    embedder: Arc<dyn TextEmbedder>,
    retrieval: RetrievalConfig,
    points: RwLock<Vec<StoredPoint>>,
}

impl MemoryIndex {
    pub fn new(embedder: Arc<dyn TextEmbedder>, retrieval: RetrievalConfig) -> Self {
        Self {
            embedder,
            retrieval,
            points: RwLock::new(Vec::new()),
        }
    }

    /// Writes the store to `path` as JSONL.
    pub async fn snapshot(&self, path: &Path) -> Result<()> {
        let points = self.points.read().await;

        let mut out = String::new();
        for point in points.iter() {
            out.push_str(&serde_json::to_string(point)?);
            out.push('\n');
        }
        tokio::fs::write(path, out).await?;

        info!("Saved {} points to {}", points.len(), path.display());
        Ok(())
    }

    /// Restores a snapshot, replacing current contents. Stored vectors
    /// must match the provider dimension; a mismatch means the snapshot
    /// was built against a different model and cannot be served.
    pub async fn restore(&self, path: &Path) -> Result<()> {
        let raw = tokio::fs::read_to_string(path).await?;

        let mut points = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let point: StoredPoint = serde_json::from_str(line)
                .map_err(|e| Error::Config(format!("Corrupt snapshot line {}: {e}", line_no + 1)))?;

            if point.vector.len() != self.embedder.dimension() {
                return Err(Error::Config(format!(
                    "Snapshot dimension mismatch at line {}: stored {} dimensions, provider '{}' produces {}",
                    line_no + 1,
                    point.vector.len(),
                    self.embedder.model_id(),
                    self.embedder.dimension()
                )));
            }
            points.push(point);
        }

        let count = points.len();
        *self.points.write().await = points;

        info!("Restored {} points from {}", count, path.display());
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<Vec<Uuid>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.search_text.clone()).collect();
        let vectors = embed_batch_blocking(&self.embedder, texts).await?;

        let mut points = self.points.write().await;
        let mut ids = Vec::with_capacity(documents.len());

        for (doc, vector) in documents.into_iter().zip(vectors) {
            let IndexedDocument {
                id,
                search_text,
                mut metadata,
            } = doc;
            metadata.insert(SEARCH_TEXT_KEY.to_string(), search_text);

            let point = StoredPoint {
                id,
                vector,
                payload: metadata,
            };
            match points.iter_mut().find(|p| p.id == id) {
                Some(existing) => *existing = point,
                None => points.push(point),
            }
            ids.push(id);
        }

        debug!("Upserted {} points ({} total)", ids.len(), points.len());
        Ok(ids)
    }

    async fn search(
        &self,
        query_text: &str,
        k: usize,
        filter: &StructuralFilter,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = embed_query_blocking(&self.embedder, query_text).await?;
        let points = self.points.read().await;

        // Filter, score, keep the best fetch_k as the re-rank pool
        let mut scored: Vec<(f32, &StoredPoint)> = points
            .iter()
            .filter(|p| filter.matches(&p.payload))
            .map(|p| (cosine_similarity(&query, &p.vector), p))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(self.retrieval.fetch_k.max(k));

        let candidates: Vec<Vec<f32>> = scored.iter().map(|(_, p)| p.vector.clone()).collect();
        let order = maximal_marginal_relevance(&query, &candidates, k, self.retrieval.mmr_lambda);

        Ok(order
            .into_iter()
            .map(|i| {
                let (score, point) = &scored[i];
                SearchHit {
                    id: point.id,
                    score: *score,
                    payload: Some(point.payload.clone()),
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.points.read().await.len())
    }
}
