use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Sentinel stored for a value the source never provided.
pub const MISSING: &str = "None";

/// Sentinel substituted for JSON `null` during scrubbing.
pub const NULL_SENTINEL: &str = "null";

/// Literal marker introducing the tag section of the body text. Tag and
/// allergen filter clauses match substrings of the text after this
/// marker, so the spelling must not change.
pub const TAG_PREFIX: &str = "recipe_tags_formatted:";

/// Payload key holding the searchable body text.
pub const SEARCH_TEXT_KEY: &str = "search_text";

/// Separator between ingredient lines in the body text.
pub const INGREDIENT_SEPARATOR: &str = "|";

/// The closed set of metadata keys stored with every document. Retrieval
/// post-processing reads exactly these.
pub const METADATA_FIELDS: [&str; 8] = [
    "name",
    "ingredients",
    "directions",
    "tags",
    "details",
    "nutrition",
    "image_url",
    "source_url",
];

/// Canonical recipe after normalization. Every field is present; missing
/// source values appear as the `"None"` sentinel, never as absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDocument {
    pub name: String,
    pub ingredients: Vec<String>,
    pub directions: Vec<String>,
    pub tags: Vec<String>,
    pub details: RecipeDetails,
    pub nutrition: NutritionFacts,
    pub image_url: String,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDetails {
    pub prep_time: String,
    pub cook_time: String,
    pub total_time: String,
    pub servings: String,
}

impl Default for RecipeDetails {
    fn default() -> Self {
        Self {
            prep_time: MISSING.to_string(),
            cook_time: MISSING.to_string(),
            total_time: MISSING.to_string(),
            servings: MISSING.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionFacts {
    pub calories: String,
    pub fat: String,
    pub carbs: String,
    pub protein: String,
}

impl Default for NutritionFacts {
    fn default() -> Self {
        Self {
            calories: MISSING.to_string(),
            fat: MISSING.to_string(),
            carbs: MISSING.to_string(),
            protein: MISSING.to_string(),
        }
    }
}

/// The unit actually stored in the vector index: a searchable text body
/// plus a stringified metadata bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: Uuid,
    pub search_text: String,
    pub metadata: BTreeMap<String, String>,
}

/// String form of a list field: bracketed and quoted, `["a", "b"]`.
/// Empty lists render as the missing-value sentinel.
pub fn list_repr(values: &[String]) -> String {
    if values.is_empty() {
        MISSING.to_string()
    } else {
        format!("{values:?}")
    }
}

/// Renders the searchable body text: pipe-joined ingredients, a newline,
/// then the tag marker followed by the tags in their list string form.
/// Query construction uses this same function, so a tag present in a
/// document appears verbatim in any query or filter built from it.
pub fn search_text(ingredients: &[String], tags: &[String]) -> String {
    format!(
        "{}\n{TAG_PREFIX}{}",
        ingredients.join(INGREDIENT_SEPARATOR),
        list_repr(tags)
    )
}

/// Builds the indexable unit from a canonical document. Assumes the
/// normalizer's invariants already hold; performs no validation.
pub fn build(doc: &RecipeDocument) -> IndexedDocument {
    let mut metadata = BTreeMap::new();
    metadata.insert("name".to_string(), doc.name.clone());
    metadata.insert("ingredients".to_string(), list_repr(&doc.ingredients));
    metadata.insert("directions".to_string(), list_repr(&doc.directions));
    metadata.insert("tags".to_string(), list_repr(&doc.tags));
    metadata.insert("details".to_string(), struct_repr(&doc.details));
    metadata.insert("nutrition".to_string(), struct_repr(&doc.nutrition));
    metadata.insert("image_url".to_string(), doc.image_url.clone());
    metadata.insert("source_url".to_string(), doc.source_url.clone());

    IndexedDocument {
        id: Uuid::new_v4(),
        search_text: search_text(&doc.ingredients, &doc.tags),
        metadata,
    }
}

fn struct_repr<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| MISSING.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> RecipeDocument {
        RecipeDocument {
            name: "Overnight Oats".to_string(),
            ingredients: vec!["oat".to_string(), "milk".to_string()],
            directions: vec!["Mix".to_string(), "Chill overnight".to_string()],
            tags: vec!["breakfast".to_string(), "vegan".to_string()],
            details: RecipeDetails {
                prep_time: "5 mins".to_string(),
                ..RecipeDetails::default()
            },
            nutrition: NutritionFacts::default(),
            image_url: "https://example.com/oats.jpg".to_string(),
            source_url: "https://example.com/recipes/oats".to_string(),
        }
    }

    #[test]
    fn test_search_text_shape() {
        let doc = sample_document();
        let text = search_text(&doc.ingredients, &doc.tags);

        assert_eq!(
            text,
            "oat|milk\nrecipe_tags_formatted:[\"breakfast\", \"vegan\"]"
        );
    }

    #[test]
    fn test_search_text_contains_each_tag_verbatim() {
        let doc = sample_document();
        let text = search_text(&doc.ingredients, &doc.tags);

        for tag in &doc.tags {
            assert!(text.contains(tag), "tag {tag} missing from body text");
        }
    }

    #[test]
    fn test_search_text_without_tags() {
        let text = search_text(&["flour".to_string()], &[]);
        assert_eq!(text, "flour\nrecipe_tags_formatted:None");
    }

    #[test]
    fn test_build_uses_closed_metadata_set() {
        let built = build(&sample_document());

        assert_eq!(built.metadata.len(), METADATA_FIELDS.len());
        for field in METADATA_FIELDS {
            assert!(built.metadata.contains_key(field), "missing key {field}");
        }
    }

    #[test]
    fn test_build_stringifies_fields() {
        let built = build(&sample_document());

        assert_eq!(built.metadata["name"], "Overnight Oats");
        assert_eq!(built.metadata["ingredients"], "[\"oat\", \"milk\"]");
        assert_eq!(built.metadata["tags"], "[\"breakfast\", \"vegan\"]");
        assert!(built.metadata["details"].contains("\"prep_time\":\"5 mins\""));
        assert!(built.metadata["nutrition"].contains("\"calories\":\"None\""));
    }

    #[test]
    fn test_build_empty_lists_use_sentinel() {
        let mut doc = sample_document();
        doc.directions.clear();

        let built = build(&doc);
        assert_eq!(built.metadata["directions"], MISSING);
    }

    #[test]
    fn test_build_assigns_distinct_ids() {
        let doc = sample_document();
        assert_ne!(build(&doc).id, build(&doc).id);
    }
}
