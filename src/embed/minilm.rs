use crate::embed::{normalize_in_place, TextEmbedder};
use crate::error::{Error, Result};
use fastembed::{
    InitOptionsUserDefined, Pooling, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel,
};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Output dimension of all-MiniLM-L6-v2.
pub const MINILM_DIMENSION: usize = 384;

/// sentence-transformers/all-MiniLM-L6-v2 over ONNX. Model files are
/// read from a local directory; nothing is downloaded at runtime.
/// Inference access is serialized through a mutex; the loaded model
/// state is process-wide, initialized once and read-only afterwards.
pub struct MiniLmEmbedder {
    model: Mutex<TextEmbedding>,
    model_id: String,
}

impl MiniLmEmbedder {
    /// Loads the model from `dir`. Required files: `model.onnx`,
    /// `tokenizer.json`, `config.json`, `special_tokens_map.json`,
    /// `tokenizer_config.json`.
    pub fn load(dir: &Path) -> Result<Self> {
        let onnx_file = read_model_file(dir, "model.onnx")?;
        let tokenizer_files = TokenizerFiles {
            tokenizer_file: read_model_file(dir, "tokenizer.json")?,
            config_file: read_model_file(dir, "config.json")?,
            special_tokens_map_file: read_model_file(dir, "special_tokens_map.json")?,
            tokenizer_config_file: read_model_file(dir, "tokenizer_config.json")?,
        };

        let mut model = UserDefinedEmbeddingModel::new(onnx_file, tokenizer_files);
        model.pooling = Some(Pooling::Mean);

        let text_embedding =
            TextEmbedding::try_new_from_user_defined(model, InitOptionsUserDefined::new())
                .map_err(|e| Error::Embedding(format!("Failed to initialize MiniLM: {e}")))?;

        info!("Loaded MiniLM model from {}", dir.display());

        Ok(Self {
            model: Mutex::new(text_embedding),
            model_id: "all-minilm-l6-v2".to_string(),
        })
    }
}

fn read_model_file(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let path = dir.join(name);
    std::fs::read(&path)
        .map_err(|e| Error::Config(format!("Cannot read model file {}: {e}", path.display())))
}

impl TextEmbedder for MiniLmEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("Model returned no embedding".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::Embedding("Embedding model mutex poisoned".to_string()))?;
        let mut vectors = model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::Embedding(format!("Inference failed: {e}")))?;
        drop(model);

        for vector in &mut vectors {
            if vector.len() != MINILM_DIMENSION {
                return Err(Error::Embedding(format!(
                    "Model produced {} dimensions, expected {MINILM_DIMENSION}",
                    vector.len()
                )));
            }
            normalize_in_place(vector);
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        MINILM_DIMENSION
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
