use crate::error::{Error, Result};
use crate::index::{SearchHit, StructuralFilter, VectorIndex};
use crate::ingest::document::{search_text, MISSING, SEARCH_TEXT_KEY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const NAME_PLACEHOLDER: &str = "No name available";
const INGREDIENTS_PLACEHOLDER: &str = "No ingredients available";
const DIRECTIONS_PLACEHOLDER: &str = "No directions available";
const DETAILS_PLACEHOLDER: &str = "No details available";
const NUTRITION_PLACEHOLDER: &str = "No nutrition details available";
const TAGS_PLACEHOLDER: &str = "No tags available";
const IMAGE_PLACEHOLDER: &str = "No image available";
const URL_PLACEHOLDER: &str = "No URL available";

/// Query input for the lower-level search surface: a single string or
/// a sequence of terms. Any other shape fails at deserialization;
/// that is a caller bug, not a retrieval failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QueryText {
    Single(String),
    Terms(Vec<String>),
}

impl QueryText {
    /// Flattens to the text actually embedded; term sequences join
    /// with "-". Empty input is rejected rather than searched.
    pub fn into_text(self) -> Result<String> {
        let text = match self {
            QueryText::Single(s) => s,
            QueryText::Terms(terms) => terms.join("-"),
        };

        if text.trim().is_empty() {
            return Err(Error::Query("Query text is empty".to_string()));
        }
        Ok(text)
    }
}

/// Response-shaped recipe record. Every field is a string carrying the
/// stored string form of its metadata value, or a human-readable
/// placeholder where the value is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeResult {
    pub recipe_name: String,
    pub recipe_ingredients: String,
    pub recipe_directions: String,
    pub recipe_details: String,
    pub recipe_nutrition_details: String,
    pub recipe_tags: String,
    pub recipe_image_url: String,
    pub recipe_url: String,
}

/// Orchestrates constrained retrieval: builds query text and filter,
/// runs the filtered search, and maps hits into the response shape.
/// Read-only and safe to share across concurrent requests.
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Finds recipes for available ingredients and preferences. Each
    /// preferred tag becomes a required body-text clause and each
    /// allergen a forbidden one. An empty result means "no recipe
    /// found" and is not an error; only infrastructure failures raise.
    pub async fn find_recipe(
        &self,
        ingredients: &[String],
        preferred_tags: &[String],
        allergic_ingredients: &[String],
        k: usize,
    ) -> Result<Vec<RecipeResult>> {
        if ingredients.is_empty() && preferred_tags.is_empty() {
            return Err(Error::Query(
                "At least one ingredient or preferred tag is required".to_string(),
            ));
        }

        // Same rendering as the ingestion side, so document and query
        // text share their tag spelling
        let query = search_text(ingredients, preferred_tags);

        let mut filter = StructuralFilter::new();
        for tag in preferred_tags {
            filter = filter.require_text(SEARCH_TEXT_KEY, tag);
        }
        for allergen in allergic_ingredients {
            filter = filter.exclude_text(SEARCH_TEXT_KEY, allergen);
        }

        self.similarity_search(QueryText::Single(query), k, &filter)
            .await
    }

    /// Lower-level surface: a raw query against the index followed by
    /// the post-processing pass.
    pub async fn similarity_search(
        &self,
        query: QueryText,
        k: usize,
        filter: &StructuralFilter,
    ) -> Result<Vec<RecipeResult>> {
        let text = query.into_text()?;
        let k = k.max(1);

        debug!(
            "Searching k={k}, query length {}, filter empty: {}",
            text.len(),
            filter.is_empty()
        );

        let hits = self.index.search(&text, k, filter).await?;
        post_process(&hits)
    }
}

/// Maps hits into response-shaped records. The internal `"None"`
/// sentinel never leaves the core; consumers see per-field
/// placeholders. A hit with no payload at all fails the whole batch
/// rather than producing a partial list.
pub fn post_process(hits: &[SearchHit]) -> Result<Vec<RecipeResult>> {
    hits.iter()
        .map(|hit| {
            let Some(payload) = &hit.payload else {
                return Err(Error::ResultShape(format!("Hit {} has no payload", hit.id)));
            };

            Ok(RecipeResult {
                recipe_name: field_or(payload, "name", NAME_PLACEHOLDER),
                recipe_ingredients: field_or(payload, "ingredients", INGREDIENTS_PLACEHOLDER),
                recipe_directions: field_or(payload, "directions", DIRECTIONS_PLACEHOLDER),
                recipe_details: field_or(payload, "details", DETAILS_PLACEHOLDER),
                recipe_nutrition_details: field_or(payload, "nutrition", NUTRITION_PLACEHOLDER),
                recipe_tags: field_or(payload, "tags", TAGS_PLACEHOLDER),
                recipe_image_url: field_or(payload, "image_url", IMAGE_PLACEHOLDER),
                recipe_url: field_or(payload, "source_url", URL_PLACEHOLDER),
            })
        })
        .collect()
}

fn field_or(payload: &BTreeMap<String, String>, key: &str, placeholder: &str) -> String {
    match payload.get(key) {
        Some(value) if value != MISSING => value.clone(),
        _ => placeholder.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::embed::HashEmbedder;
    use crate::index::MemoryIndex;
    use crate::ingest::document::{build, RecipeDocument};
    use serde_json::json;
    use uuid::Uuid;

    async fn test_retriever_with(docs: Vec<RecipeDocument>) -> Retriever {
        let index = Arc::new(MemoryIndex::new(
            Arc::new(HashEmbedder::new(128)),
            RetrievalConfig {
                default_k: 3,
                max_k: 20,
                fetch_k: 20,
                mmr_lambda: 0.7,
            },
        ));
        let built: Vec<_> = docs.iter().map(build).collect();
        index.upsert(built).await.expect("Failed to seed index");
        Retriever::new(index)
    }

    fn oats() -> RecipeDocument {
        RecipeDocument {
            name: "Overnight Oats".to_string(),
            ingredients: vec!["oat".to_string(), "milk".to_string()],
            directions: vec!["Mix".to_string()],
            tags: vec!["breakfast".to_string(), "vegan".to_string()],
            details: Default::default(),
            nutrition: Default::default(),
            image_url: "https://example.com/oats.jpg".to_string(),
            source_url: "https://example.com/oats".to_string(),
        }
    }

    #[test]
    fn test_query_text_single() {
        let text = QueryText::Single("oat|milk".to_string())
            .into_text()
            .expect("Failed to flatten query");
        assert_eq!(text, "oat|milk");
    }

    #[test]
    fn test_query_text_terms_join_with_dash() {
        let text = QueryText::Terms(vec!["oat".to_string(), "milk".to_string()])
            .into_text()
            .expect("Failed to flatten query");
        assert_eq!(text, "oat-milk");
    }

    #[test]
    fn test_query_text_empty_rejected() {
        let err = QueryText::Single("  ".to_string())
            .into_text()
            .expect_err("Empty query should fail");
        assert!(matches!(err, Error::Query(_)));

        let err = QueryText::Terms(vec![])
            .into_text()
            .expect_err("Empty terms should fail");
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn test_query_text_union_shape() {
        assert!(serde_json::from_value::<QueryText>(json!("oat")).is_ok());
        assert!(serde_json::from_value::<QueryText>(json!(["oat", "milk"])).is_ok());
        assert!(serde_json::from_value::<QueryText>(json!(42)).is_err());
        assert!(serde_json::from_value::<QueryText>(json!({"q": "oat"})).is_err());
    }

    #[tokio::test]
    async fn test_find_recipe_requires_some_criteria() {
        let retriever = test_retriever_with(vec![]).await;

        let err = retriever
            .find_recipe(&[], &[], &[], 1)
            .await
            .expect_err("Empty query should fail");
        assert!(matches!(err, Error::Query(_)));
    }

    #[tokio::test]
    async fn test_find_recipe_returns_formatted_result() {
        let retriever = test_retriever_with(vec![oats()]).await;

        let results = retriever
            .find_recipe(
                &["oat".to_string(), "milk".to_string()],
                &["breakfast".to_string()],
                &[],
                1,
            )
            .await
            .expect("Failed to find recipe");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].recipe_name, "Overnight Oats");
        assert_eq!(results[0].recipe_ingredients, "[\"oat\", \"milk\"]");
        assert_eq!(results[0].recipe_url, "https://example.com/oats");
    }

    #[tokio::test]
    async fn test_find_recipe_empty_index_is_empty_result() {
        let retriever = test_retriever_with(vec![]).await;

        let results = retriever
            .find_recipe(&["oat".to_string()], &[], &[], 3)
            .await
            .expect("Failed to search");
        assert!(results.is_empty());
    }

    #[test]
    fn test_post_process_substitutes_placeholders() {
        let mut payload = BTreeMap::new();
        payload.insert("name".to_string(), "Soup".to_string());
        payload.insert("image_url".to_string(), MISSING.to_string());

        let hits = vec![SearchHit {
            id: Uuid::new_v4(),
            score: 0.8,
            payload: Some(payload),
        }];

        let results = post_process(&hits).expect("Failed to post-process");
        assert_eq!(results[0].recipe_name, "Soup");
        assert_eq!(results[0].recipe_image_url, "No image available");
        assert_eq!(results[0].recipe_ingredients, "No ingredients available");
        assert_eq!(
            results[0].recipe_nutrition_details,
            "No nutrition details available"
        );
    }

    #[test]
    fn test_post_process_missing_payload_fails_batch() {
        let good = SearchHit {
            id: Uuid::new_v4(),
            score: 0.9,
            payload: Some(BTreeMap::new()),
        };
        let bad = SearchHit {
            id: Uuid::new_v4(),
            score: 0.5,
            payload: None,
        };

        let err = post_process(&[good, bad]).expect_err("Batch should fail");
        assert!(matches!(err, Error::ResultShape(_)));
    }

    #[test]
    fn test_post_process_empty_batch() {
        let results = post_process(&[]).expect("Failed to post-process");
        assert!(results.is_empty());
    }
}
