use crate::embed::{normalize_in_place, TextEmbedder};
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// FNV-1a feature-hashing embedder. Lowercases, splits on
/// non-alphanumeric boundaries, hashes each token into a signed bucket
/// and L2-normalizes the result. Fully deterministic and model-free;
/// the default provider for local development and tests. Texts sharing
/// tokens land near each other, which is all the retrieval pipeline
/// needs outside of semantic-model deployments.
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    /// `dimension` must be non-zero; bucket assignment takes the hash
    /// modulo the dimension.
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be non-zero");
        Self {
            dimension,
            model_id: format!("fnv1a-{dimension}"),
        }
    }
}

impl TextEmbedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token);
            let bucket = (hash % self.dimension as u64) as usize;
            // Signed buckets so colliding tokens partially cancel
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalize_in_place(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in token.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
