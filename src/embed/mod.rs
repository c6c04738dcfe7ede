pub mod hash;
#[cfg(feature = "onnx")]
pub mod minilm;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::info;

pub use hash::HashEmbedder;
#[cfg(feature = "onnx")]
pub use minilm::MiniLmEmbedder;

/// Maps text to a fixed-dimension vector. Implementations are
/// deterministic for a given model identity and safe to share across
/// tasks; any internal model state is initialized once and read-only
/// afterwards.
pub trait TextEmbedder: Send + Sync {
    /// Embed one text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch. The default delegates to per-text embedding;
    /// providers with real batch inference override it.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Output vector dimension.
    fn dimension(&self) -> usize;

    /// Stable identifier for logs and snapshots.
    fn model_id(&self) -> &str;
}

/// Builds the configured provider and validates its dimension against
/// the configured one. Called once at startup; a mismatch here must
/// stop initialization before anything touches the index.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn TextEmbedder>> {
    let embedder: Arc<dyn TextEmbedder> = match config.model.as_str() {
        "hash" | "fnv1a" => Arc::new(HashEmbedder::new(config.dimension)),

        #[cfg(feature = "onnx")]
        "minilm" | "all-minilm-l6-v2" => {
            let dir = config.model_dir.as_ref().ok_or_else(|| {
                Error::Config("EMBEDDING_MODEL_DIR is required for the minilm model".to_string())
            })?;
            Arc::new(MiniLmEmbedder::load(dir)?)
        }

        #[cfg(not(feature = "onnx"))]
        "minilm" | "all-minilm-l6-v2" => {
            return Err(Error::Config(
                "Embedding model 'minilm' requires a build with the 'onnx' feature".to_string(),
            ));
        }

        other => {
            return Err(Error::Config(format!("Unknown embedding model '{other}'")));
        }
    };

    if embedder.dimension() != config.dimension {
        return Err(Error::Config(format!(
            "Embedding dimension mismatch: model '{}' produces {} dimensions, configuration expects {}",
            embedder.model_id(),
            embedder.dimension(),
            config.dimension
        )));
    }

    info!(
        "Embedding provider ready: {} ({} dimensions)",
        embedder.model_id(),
        embedder.dimension()
    );

    Ok(embedder)
}

/// L2-normalizes a vector in place. Zero and non-finite norms zero the
/// vector instead of dividing by them.
pub(crate) fn normalize_in_place(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();

    if norm > f32::EPSILON && norm.is_finite() {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    } else {
        vector.fill(0.0);
    }
}
