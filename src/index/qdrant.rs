use crate::config::{IndexConfig, RetrievalConfig};
use crate::embed::TextEmbedder;
use crate::error::{Error, Result};
use crate::index::filter::StructuralFilter;
use crate::index::mmr::maximal_marginal_relevance;
use crate::index::{embed_batch_blocking, embed_query_blocking, SearchHit, VectorIndex};
use crate::ingest::document::{IndexedDocument, SEARCH_TEXT_KEY};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Qdrant REST adapter. One collection per index, cosine distance,
/// payloads carrying the stringified metadata plus the body text.
/// Search over-fetches with vectors attached and re-ranks client-side,
/// since the diversity pass needs candidate vectors.
pub struct QdrantIndex {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    retrieval: RetrievalConfig,
    embedder: Arc<dyn TextEmbedder>,
}

impl QdrantIndex {
    /// Connects and bootstraps the collection: creates it with the
    /// provider dimension when missing, verifies the dimension when
    /// present (fail fast, nothing may run against a mismatched
    /// collection), and ensures a full-text index on the body field so
    /// text clauses can match.
    pub async fn connect(
        config: &IndexConfig,
        retrieval: RetrievalConfig,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(api_key).map_err(|_| {
                Error::Config("QDRANT_API_KEY contains invalid header characters".to_string())
            })?;
            headers.insert(HeaderName::from_static("api-key"), value);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        let index = Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            retrieval,
            embedder,
        };
        index.ensure_collection().await?;

        Ok(index)
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let response = self
            .http
            .get(self.collection_url(""))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let info: CollectionInfo = response
                    .json()
                    .await
                    .map_err(|e| Error::Index(format!("Malformed collection info: {e}")))?;

                let size = info.result.config.params.vectors.size;
                if size != self.embedder.dimension() {
                    return Err(Error::Config(format!(
                        "Collection '{}' stores {size}-dimension vectors but provider '{}' produces {}",
                        self.collection,
                        self.embedder.model_id(),
                        self.embedder.dimension()
                    )));
                }
                debug!("Collection '{}' present ({size} dimensions)", self.collection);
            }
            StatusCode::NOT_FOUND => self.create_collection().await?,
            status => return Err(status_error(status, response).await),
        }

        self.ensure_payload_index().await
    }

    async fn create_collection(&self) -> Result<()> {
        let body = json!({
            "vectors": {
                "size": self.embedder.dimension(),
                "distance": "Cosine"
            }
        });

        let response = self
            .http
            .put(self.collection_url(""))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            // Conflict means another process created it first
            StatusCode::OK | StatusCode::CREATED | StatusCode::CONFLICT => {
                info!(
                    "Created collection '{}' ({} dimensions)",
                    self.collection,
                    self.embedder.dimension()
                );
                Ok(())
            }
            status => Err(status_error(status, response).await),
        }
    }

    /// Text match conditions require a full-text index on the target
    /// field; tag and allergen clauses all target the body field.
    async fn ensure_payload_index(&self) -> Result<()> {
        let body = json!({
            "field_name": SEARCH_TEXT_KEY,
            "field_schema": {
                "type": "text",
                "tokenizer": "word",
                "lowercase": true
            }
        });

        let response = self
            .http
            .put(self.collection_url("/index"))
            .query(&[("wait", "true")])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::CONFLICT => Ok(()),
            status => Err(status_error(status, response).await),
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<Vec<Uuid>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.search_text.clone()).collect();
        let vectors = embed_batch_blocking(&self.embedder, texts).await?;

        let points: Vec<serde_json::Value> = documents
            .iter()
            .zip(&vectors)
            .map(|(doc, vector)| {
                let mut payload = serde_json::Map::new();
                for (key, value) in &doc.metadata {
                    payload.insert(key.clone(), json!(value));
                }
                payload.insert(SEARCH_TEXT_KEY.to_string(), json!(doc.search_text));

                json!({
                    "id": doc.id,
                    "vector": vector,
                    "payload": payload
                })
            })
            .collect();

        let response = self
            .http
            .put(self.collection_url("/points"))
            .query(&[("wait", "true")])
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        debug!(
            "Upserted {} points into '{}'",
            documents.len(),
            self.collection
        );
        Ok(documents.iter().map(|d| d.id).collect())
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

        let mut body = json!({
            "vector": query,
            "limit": self.retrieval.fetch_k.max(k),
            "with_payload": true,
            "with_vector": true
        });
        if !filter.is_empty() {
            body["filter"] = serde_json::to_value(filter)?;
        }

        let response = self
            .http
            .post(self.collection_url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Index(format!("Malformed search response: {e}")))?;

        let candidates: Vec<Vec<f32>> = parsed
            .result
            .iter()
            .map(|p| p.vector.clone().unwrap_or_default())
            .collect();
        let order =
            maximal_marginal_relevance(&query, &candidates, k, self.retrieval.mmr_lambda);

        Ok(order
            .into_iter()
            .map(|i| {
                let point = &parsed.result[i];
                SearchHit {
                    id: point.id,
                    score: point.score,
                    payload: point.payload.clone().map(payload_strings),
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .http
            .post(self.collection_url("/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let parsed: CountResponse = response
            .json()
            .await
            .map_err(|e| Error::Index(format!("Malformed count response: {e}")))?;
        Ok(parsed.result.count)
    }
}

/// Payload values are written as strings; anything else that shows up
/// keeps its JSON string form.
fn payload_strings(payload: serde_json::Map<String, serde_json::Value>) -> BTreeMap<String, String> {
    payload
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}

fn transport_error(err: reqwest::Error) -> Error {
    Error::IndexUnavailable(format!("Request failed: {err}"))
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> Error {
    let body = response.text().await.unwrap_or_default();
    let detail: String = body.chars().take(300).collect();

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::IndexUnavailable(format!("{status}: {detail}"))
    } else {
        Error::Index(format!("{status}: {detail}"))
    }
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    result: CollectionDescription,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Debug, Deserialize)]
struct VectorParams {
    size: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Uuid,
    score: f32,
    payload: Option<serde_json::Map<String, serde_json::Value>>,
    vector: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::ingest::document::{build, RecipeDocument};
    use mockito::{Matcher, Server, ServerGuard};

    const DIMENSION: usize = 32;

    fn test_config(url: &str) -> IndexConfig {
        IndexConfig {
            backend: crate::config::IndexBackend::Qdrant,
            url: url.to_string(),
            api_key: None,
            collection: "recipes".to_string(),
            timeout_seconds: 5,
            snapshot_path: None,
        }
    }

    fn test_retrieval() -> RetrievalConfig {
        RetrievalConfig {
            default_k: 3,
            max_k: 20,
            fetch_k: 20,
            mmr_lambda: 0.7,
        }
    }

    fn collection_info_body(size: usize) -> String {
        json!({
            "result": {
                "config": {
                    "params": {
                        "vectors": {"size": size, "distance": "Cosine"}
                    }
                }
            },
            "status": "ok"
        })
        .to_string()
    }

    /// Mocks the bootstrap exchange for an existing collection.
    async fn mock_bootstrap(server: &mut ServerGuard) -> (mockito::Mock, mockito::Mock) {
        let get = server
            .mock("GET", "/collections/recipes")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(collection_info_body(DIMENSION))
            .create_async()
            .await;
        let index = server
            .mock("PUT", "/collections/recipes/index")
            .match_query(Matcher::UrlEncoded("wait".into(), "true".into()))
            .with_status(200)
            .with_body(json!({"result": {}, "status": "ok"}).to_string())
            .create_async()
            .await;
        (get, index)
    }

    async fn connected_index(server: &ServerGuard) -> QdrantIndex {
        QdrantIndex::connect(
            &test_config(&server.url()),
            test_retrieval(),
            Arc::new(HashEmbedder::new(DIMENSION)),
        )
        .await
        .expect("Failed to connect")
    }

    fn sample_document() -> IndexedDocument {
        build(&RecipeDocument {
            name: "Oats".to_string(),
            ingredients: vec!["oat".to_string(), "milk".to_string()],
            directions: vec!["Mix".to_string()],
            tags: vec!["breakfast".to_string()],
            details: Default::default(),
            nutrition: Default::default(),
            image_url: "None".to_string(),
            source_url: "https://example.com/oats".to_string(),
        })
    }

    #[tokio::test]
    async fn test_connect_creates_missing_collection() {
        let mut server = Server::new_async().await;

        let get = server
            .mock("GET", "/collections/recipes")
            .with_status(404)
            .create_async()
            .await;
        let create = server
            .mock("PUT", "/collections/recipes")
            .match_body(Matcher::PartialJson(json!({
                "vectors": {"size": DIMENSION, "distance": "Cosine"}
            })))
            .with_status(200)
            .with_body(json!({"result": true, "status": "ok"}).to_string())
            .create_async()
            .await;
        let index = server
            .mock("PUT", "/collections/recipes/index")
            .match_query(Matcher::UrlEncoded("wait".into(), "true".into()))
            .with_status(200)
            .with_body(json!({"result": {}, "status": "ok"}).to_string())
            .create_async()
            .await;

        connected_index(&server).await;

        get.assert_async().await;
        create.assert_async().await;
        index.assert_async().await;
    }

    #[tokio::test]
    async fn test_connect_rejects_dimension_mismatch() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/collections/recipes")
            .with_status(200)
            .with_body(collection_info_body(768))
            .create_async()
            .await;

        let result = QdrantIndex::connect(
            &test_config(&server.url()),
            test_retrieval(),
            Arc::new(HashEmbedder::new(DIMENSION)),
        )
        .await;

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_upsert_sends_points_with_body_text() {
        let mut server = Server::new_async().await;
        let _bootstrap = mock_bootstrap(&mut server).await;

        let doc = sample_document();
        let upsert = server
            .mock("PUT", "/collections/recipes/points")
            .match_query(Matcher::UrlEncoded("wait".into(), "true".into()))
            .match_body(Matcher::PartialJson(json!({
                "points": [{
                    "id": doc.id,
                    "payload": {
                        "name": "Oats",
                        "search_text": doc.search_text
                    }
                }]
            })))
            .with_status(200)
            .with_body(json!({"result": {"status": "completed"}, "status": "ok"}).to_string())
            .create_async()
            .await;

        let index = connected_index(&server).await;
        let expected_id = doc.id;
        let ids = index.upsert(vec![doc]).await.expect("Failed to upsert");

        assert_eq!(ids, vec![expected_id]);
        upsert.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_maps_hits_and_payloads() {
        let mut server = Server::new_async().await;
        let _bootstrap = mock_bootstrap(&mut server).await;

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let search = server
            .mock("POST", "/collections/recipes/points/search")
            .match_body(Matcher::PartialJson(json!({
                "with_payload": true,
                "with_vector": true,
                "filter": {
                    "must": [{"key": "search_text", "match": {"text": "breakfast"}}]
                }
            })))
            .with_status(200)
            .with_body(
                json!({
                    "result": [
                        {
                            "id": first,
                            "score": 0.91,
                            "payload": {"name": "Oats", "search_text": "oat|milk"},
                            "vector": [0.0, 0.0, 0.0]
                        },
                        {
                            "id": second,
                            "score": 0.40,
                            "payload": null,
                            "vector": [0.0, 0.0, 0.0]
                        }
                    ],
                    "status": "ok"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let index = connected_index(&server).await;
        let filter = StructuralFilter::new().require_text(SEARCH_TEXT_KEY, "breakfast");
        let hits = index
            .search("oat|milk", 2, &filter)
            .await
            .expect("Failed to search");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, first);
        assert_eq!(hits[0].score, 0.91);
        assert_eq!(
            hits[0].payload.as_ref().expect("Missing payload")["name"],
            "Oats"
        );
        // Null payloads surface as None for the post-processing policy
        assert!(hits[1].payload.is_none());
        search.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_server_error_is_retryable() {
        let mut server = Server::new_async().await;
        let _bootstrap = mock_bootstrap(&mut server).await;

        server
            .mock("POST", "/collections/recipes/points/search")
            .with_status(503)
            .create_async()
            .await;

        let index = connected_index(&server).await;
        let err = index
            .search("oat", 1, &StructuralFilter::new())
            .await
            .expect_err("Search should fail");

        assert!(matches!(err, Error::IndexUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_search_client_error_is_permanent() {
        let mut server = Server::new_async().await;
        let _bootstrap = mock_bootstrap(&mut server).await;

        server
            .mock("POST", "/collections/recipes/points/search")
            .with_status(400)
            .with_body("bad filter")
            .create_async()
            .await;

        let index = connected_index(&server).await;
        let err = index
            .search("oat", 1, &StructuralFilter::new())
            .await
            .expect_err("Search should fail");

        assert!(matches!(err, Error::Index(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_count_reads_exact_count() {
        let mut server = Server::new_async().await;
        let _bootstrap = mock_bootstrap(&mut server).await;

        server
            .mock("POST", "/collections/recipes/points/count")
            .with_status(200)
            .with_body(json!({"result": {"count": 7}, "status": "ok"}).to_string())
            .create_async()
            .await;

        let index = connected_index(&server).await;
        assert_eq!(index.count().await.expect("Failed to count"), 7);
    }

    #[tokio::test]
    async fn test_connect_unreachable_is_unavailable() {
        // Nothing listening on this port
        let config = test_config("http://127.0.0.1:1");
        let result = QdrantIndex::connect(
            &config,
            test_retrieval(),
            Arc::new(HashEmbedder::new(DIMENSION)),
        )
        .await;

        assert!(matches!(result, Err(Error::IndexUnavailable(_))));
    }
}
