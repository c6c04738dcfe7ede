use crate::error::{Error, Result};
use crate::ingest::document::{
    NutritionFacts, RecipeDetails, RecipeDocument, MISSING, NULL_SENTINEL,
};
use regex::Regex;
use serde_json::{Map, Value};

// Raw scraped record keys. Fields vary by source; every lookup falls
// back to a sentinel or an empty list.
const NAME_KEY: &str = "recipe_name";
const INGREDIENTS_KEY: &str = "recipe_ingredients_formatted";
const DIRECTIONS_KEY: &str = "recipe_directions_formatted";
const TAGS_KEY: &str = "recipe_tags_formatted";
const DETAILS_KEY: &str = "recipe_details_formatted";
const NUTRITION_KEY: &str = "recipe_nutrition_details_formatted";
const IMAGE_KEY: &str = "recipe_img_url-src";
const SOURCE_KEY: &str = "recipe_card-href";

/// Converts a raw scraped record into the canonical document. Pure: the
/// input value is never modified.
///
/// Fails with a normalization error when the record is not a JSON
/// object; callers skip the record and log.
pub fn normalize(record: &Value) -> Result<RecipeDocument> {
    let scrubbed = scrub_nulls(record.clone());
    let map = scrubbed.as_object().ok_or_else(|| {
        Error::Normalization(format!(
            "record is not a JSON object (got {})",
            json_type_name(&scrubbed)
        ))
    })?;

    Ok(RecipeDocument {
        name: text_field(map, NAME_KEY),
        ingredients: list_field(map, INGREDIENTS_KEY),
        directions: list_field(map, DIRECTIONS_KEY),
        tags: list_field(map, TAGS_KEY),
        details: parse_details(&list_field(map, DETAILS_KEY)),
        nutrition: parse_nutrition(&list_field(map, NUTRITION_KEY)),
        image_url: image_field(map, IMAGE_KEY),
        source_url: text_field(map, SOURCE_KEY),
    })
}

/// Recursively replaces every JSON `null` with the `"null"` sentinel,
/// in mapping values and sequence elements alike. Runs before field
/// extraction so string formatting never meets an absent-value marker.
pub fn scrub_nulls(value: Value) -> Value {
    match value {
        Value::Null => Value::String(NULL_SENTINEL.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(scrub_nulls).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, scrub_nulls(v))).collect())
        }
        other => other,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(value_text)
        .unwrap_or_else(|| MISSING.to_string())
}

fn list_field(map: &Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key).map(flatten_list).unwrap_or_default()
}

/// Flattens a raw list-ish value into plain strings: strings pass
/// through, single-entry objects contribute their value, byte arrays
/// decode to text, anything else keeps its JSON string form. A bare
/// scalar becomes a one-element list, which keeps scrubbed nulls
/// visible as sentinels.
pub fn flatten_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => {
            // A field-level byte array is one encoded text value
            if let Some(text) = decode_bytes(items) {
                return vec![text];
            }
            items.iter().filter_map(value_text).collect()
        }
        other => value_text(other).into_iter().collect(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(NULL_SENTINEL.to_string()),
        Value::Array(items) => decode_bytes(items).or_else(|| Some(value.to_string())),
        Value::Object(map) if map.len() == 1 => map.values().next().and_then(value_text),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Some scraped fields arrive as arrays of byte values. Decodes them as
/// UTF-8, replacing invalid sequences. Returns None when the array is
/// not a plausible byte string.
fn decode_bytes(items: &[Value]) -> Option<String> {
    if items.is_empty() {
        return None;
    }

    let mut bytes = Vec::with_capacity(items.len());
    for item in items {
        let n = item.as_u64()?;
        if n > 255 {
            return None;
        }
        bytes.push(n as u8);
    }

    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parses free-text detail lines ("Prep Time: 15 mins") into the fixed
/// detail set. Unmatched lines are ignored; unmatched keys keep the
/// sentinel.
pub fn parse_details(lines: &[String]) -> RecipeDetails {
    let mut details = RecipeDetails::default();

    for line in lines {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        if label.contains("prep") {
            details.prep_time = value.to_string();
        } else if label.contains("cook") {
            details.cook_time = value.to_string();
        } else if label.contains("total") {
            details.total_time = value.to_string();
        } else if label.contains("serving") || label.contains("yield") {
            details.servings = value.to_string();
        }
    }

    details
}

/// Parses nutrition lines into the fixed fact set. Accepts both
/// "Calories: 240" and "240 Calories" spellings.
pub fn parse_nutrition(lines: &[String]) -> NutritionFacts {
    let mut facts = NutritionFacts::default();

    for line in lines {
        let (label, value) = match line.split_once(':') {
            Some((l, v)) => (l.trim().to_lowercase(), v.trim().to_string()),
            None => match line.trim().rsplit_once(' ') {
                Some((v, l)) => (l.trim().to_lowercase(), v.trim().to_string()),
                None => continue,
            },
        };
        if value.is_empty() {
            continue;
        }

        if label.contains("calorie") {
            facts.calories = value;
        } else if label.contains("fat") {
            facts.fat = value;
        } else if label.contains("carb") {
            facts.carbs = value;
        } else if label.contains("protein") {
            facts.protein = value;
        }
    }

    facts
}

fn image_field(map: &Map<String, Value>, key: &str) -> String {
    let raw = text_field(map, key);
    if raw == MISSING || raw == NULL_SENTINEL {
        return MISSING.to_string();
    }
    extract_image_url(&raw)
}

/// Pulls the first image URL out of a raw src/srcset attribute value.
/// Scraped values often wrap the real URL in markup fragments or srcset
/// candidate lists.
pub fn extract_image_url(raw: &str) -> String {
    let re = Regex::new(r#"https?://[^"'\s,]+\.(?:jpg|jpeg|png|webp)"#).unwrap();

    if let Some(m) = re.find(raw) {
        return m.as_str().to_string();
    }

    // Not an image-suffixed URL but still a URL: keep it
    if url::Url::parse(raw.trim()).is_ok() {
        return raw.trim().to_string();
    }

    MISSING.to_string()
}
