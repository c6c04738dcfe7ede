use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub server: ServerConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "hash" (built-in feature hashing) or "minilm"
    /// (requires the `onnx` feature and a local model directory).
    pub model: String,
    /// Expected vector dimension; checked against the provider at startup.
    pub dimension: usize,
    pub model_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout_seconds: u64,
    /// Memory backend only: JSONL file the index is restored from at
    /// startup and saved to after ingestion.
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_rate_limit: u64,
    pub max_request_body_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Result count when a query does not ask for one.
    pub default_k: usize,
    /// Upper bound on per-query result count.
    pub max_k: usize,
    /// Candidate pool fetched before the diversity re-rank.
    pub fetch_k: usize,
    /// Trade-off weight between relevance and diversity (0 = all
    /// diversity, 1 = pure similarity order).
    pub mmr_lambda: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Memory,
    Qdrant,
}

impl FromStr for IndexBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(IndexBackend::Memory),
            "qdrant" => Ok(IndexBackend::Qdrant),
            other => Err(Error::Config(format!(
                "Unknown index backend '{other}' (expected 'memory' or 'qdrant')"
            ))),
        }
    }
}

impl std::fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexBackend::Memory => write!(f, "memory"),
            IndexBackend::Qdrant => write!(f, "qdrant"),
        }
    }
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let model = std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "hash".to_string());

        let dimension = std::env::var("EMBEDDING_DIMENSION")
            .unwrap_or_else(|_| "384".to_string())
            .parse()
            .map_err(|_| Error::Config("Invalid EMBEDDING_DIMENSION value".to_string()))?;

        let model_dir = std::env::var("EMBEDDING_MODEL_DIR").ok().map(PathBuf::from);

        let backend = std::env::var("INDEX_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse::<IndexBackend>()?;

        let index_url =
            std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string());

        let api_key = std::env::var("QDRANT_API_KEY").ok();

        let collection =
            std::env::var("QDRANT_COLLECTION_NAME").unwrap_or_else(|_| "recipes".to_string());

        let timeout_seconds = std::env::var("INDEX_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| Error::Config("Invalid INDEX_TIMEOUT_SECONDS value".to_string()))?;

        let snapshot_path = std::env::var("INDEX_SNAPSHOT_PATH").ok().map(PathBuf::from);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| Error::Config("Invalid PORT value".to_string()))?;

        let api_rate_limit = std::env::var("API_RATE_LIMIT")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| Error::Config("Invalid API_RATE_LIMIT value".to_string()))?;

        let max_request_body_size = std::env::var("MAX_REQUEST_BODY_SIZE")
            .unwrap_or_else(|_| "1048576".to_string())
            .parse()
            .map_err(|_| Error::Config("Invalid MAX_REQUEST_BODY_SIZE value".to_string()))?;

        let default_k = std::env::var("DEFAULT_K")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| Error::Config("Invalid DEFAULT_K value".to_string()))?;

        let max_k = std::env::var("MAX_K")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .map_err(|_| Error::Config("Invalid MAX_K value".to_string()))?;

        let fetch_k = std::env::var("FETCH_K")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .map_err(|_| Error::Config("Invalid FETCH_K value".to_string()))?;

        let mmr_lambda = std::env::var("MMR_LAMBDA")
            .unwrap_or_else(|_| "0.7".to_string())
            .parse()
            .map_err(|_| Error::Config("Invalid MMR_LAMBDA value".to_string()))?;

        Ok(Settings {
            embedding: EmbeddingConfig {
                model,
                dimension,
                model_dir,
            },
            index: IndexConfig {
                backend,
                url: index_url,
                api_key,
                collection,
                timeout_seconds,
                snapshot_path,
            },
            server: ServerConfig {
                host,
                port,
                api_rate_limit,
                max_request_body_size,
            },
            retrieval: RetrievalConfig {
                default_k,
                max_k,
                fetch_k,
                mmr_lambda,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("Port must be non-zero".to_string()));
        }

        if self.server.api_rate_limit == 0 {
            return Err(Error::Config("API_RATE_LIMIT must be non-zero".to_string()));
        }

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "Embedding dimension must be non-zero".to_string(),
            ));
        }

        if self.retrieval.default_k == 0 || self.retrieval.max_k == 0 {
            return Err(Error::Config("Result counts must be non-zero".to_string()));
        }

        if self.retrieval.default_k > self.retrieval.max_k {
            return Err(Error::Config(
                "DEFAULT_K must not exceed MAX_K".to_string(),
            ));
        }

        if self.retrieval.fetch_k == 0 {
            return Err(Error::Config(
                "Candidate pool size must be non-zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            return Err(Error::Config(
                "MMR_LAMBDA must be between 0 and 1".to_string(),
            ));
        }

        if self.index.backend == IndexBackend::Qdrant {
            url::Url::parse(&self.index.url)
                .map_err(|_| Error::Config(format!("Invalid QDRANT_URL: {}", self.index.url)))?;

            if self.index.collection.is_empty() {
                return Err(Error::Config(
                    "Collection name must not be empty".to_string(),
                ));
            }

            if self.index.timeout_seconds == 0 {
                return Err(Error::Config(
                    "Index timeout must be non-zero".to_string(),
                ));
            }
        }

        Ok(())
    }
}
