//! Backend request construction and response decoding
//!
//! The request carries the full flattened catalog (never truncated or
//! pre-filtered; semantic matching is the backend's job), the current
//! selection set, standing constraints, and instructions that limit the
//! backend's role to intent classification and entity extraction. The
//! selection policy itself is enforced in code by `selection::apply_turn`.
//!
//! The response side treats the backend as untrusted: fenced output is
//! unwrapped, ids and prices are accepted as strings or numbers, unknown
//! intents fall back to exploration, and a missing `results` field is an
//! empty turn rather than an error.

use serde::{Deserialize, Deserializer};

use crate::llm::{InferenceError, InferenceRequest};

use super::image::ImageDescriptor;
use super::projector::SearchRecord;
use super::selection::{Intent, SelectionContext, Turn};

/// Build the single-turn backend request.
pub fn build_request(
    query: &str,
    image: Option<&ImageDescriptor>,
    context: &SelectionContext,
    preferences: Option<&str>,
    limit: usize,
    records: &[SearchRecord],
) -> InferenceRequest {
    let catalog_json =
        serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string());
    let selection_json =
        serde_json::to_string_pretty(&context.entries).unwrap_or_else(|_| "[]".to_string());

    let mut instruction = String::new();

    instruction.push_str(
        "You are a Georgian cuisine expert acting as the intent classifier and entity \
         extractor of a restaurant ordering assistant. You never decide the final \
         selection yourself; you only report what this turn refers to.\n\n",
    );

    instruction.push_str(&format!("USER REQUEST: \"{}\"\n\n", query));

    if image.is_some() {
        instruction.push_str(
            "IMAGE ANALYSIS MODE:\n\
             - First, analyze the attached food image to identify what dish/cuisine it shows.\n\
             - Then search the restaurant data for ACTUAL similar dishes.\n\
             - Report matching rows copied from the restaurant data, never a free-text \
             description of the image.\n\n",
        );
    }

    instruction.push_str("RESTAURANT DATA (available dishes):\n");
    instruction.push_str(&catalog_json);
    instruction.push_str("\n\n");

    instruction.push_str("CURRENT SELECTION (already chosen in this conversation):\n");
    instruction.push_str(&selection_json);
    instruction.push_str("\n\n");

    if !context.constraints.is_empty() {
        instruction.push_str("STANDING CONSTRAINTS (apply until countermanded):\n");
        for constraint in &context.constraints {
            instruction.push_str(&format!("- {}\n", constraint));
        }
        instruction.push('\n');
    }

    if let Some(preferences) = preferences {
        if !preferences.is_empty() {
            instruction.push_str(&format!(
                "USER PREFERENCES AND ALLERGIES: \"{}\"\n\n",
                preferences
            ));
        }
    }

    instruction.push_str(&format!(
        "CLASSIFY the user's intent as exactly one of:\n\
         - \"explore\": the user names a dish category or asks for options. Extract ALL \
         rows of that category across restaurants, not a filtered subset.\n\
         - \"select\": the user commits to one specific item among previously shown \
         alternatives (\"I'll take X\"). Extract EXACTLY the chosen row(s), nothing else.\n\
         - \"add\": the user wants something additional (\"also\", \"add\", \"more\"). \
         Extract only the newly requested rows.\n\
         - \"remove\": the user explicitly drops something (\"remove X\", \"I don't want \
         X\"). Extract exactly the rows to drop, or name only the category when the whole \
         category goes.\n\
         - \"replace\": the user swaps one thing for another (\"instead\", \"different\"). \
         Extract the replacement rows and name the category being replaced.\n\
         - \"query\": the user asks about the current selection without changing it. \
         Extract nothing.\n\n\
         RULES:\n\
         - \"category\" is a short lowercase label for the dish group this turn is about \
         (e.g. \"khinkali\", \"drinks\").\n\
         - Every row in \"results\" must be copied verbatim from RESTAURANT DATA. Never \
         invent rows, never edit names or prices.\n\
         - Never repeat the same (restaurant_id, dish_name) pair.\n\
         - Return at most {} rows.\n\
         - \"constraints\" lists allergen or dietary restrictions stated in THIS request \
         (e.g. \"no pork\"); previously stated ones are already in STANDING CONSTRAINTS.\n\n",
        limit
    ));

    instruction.push_str(
        "OUTPUT FORMAT (JSON ONLY):\n\
         {\n\
           \"intent\": \"explore\" | \"select\" | \"add\" | \"remove\" | \"replace\" | \"query\",\n\
           \"category\": \"...\",\n\
           \"results\": [\n\
             {\n\
               \"restaurant_id\": \"...\",\n\
               \"restaurant_name\": \"...\",\n\
               \"dish_name\": \"...\",\n\
               \"dish_price\": 0.00\n\
             }\n\
           ],\n\
           \"constraints\": []\n\
         }\n",
    );

    match image {
        Some(descriptor) => InferenceRequest::with_image(
            descriptor.mime_type.clone(),
            descriptor.data.clone(),
            instruction,
        ),
        None => InferenceRequest::text(instruction),
    }
}

/// Decode the backend's response text into a turn.
///
/// Verification against the catalog happens afterwards in
/// `selection::verify_records`; this function only handles the wire shape.
pub fn parse_extraction(text: &str) -> Result<Turn, InferenceError> {
    let payload = strip_code_fence(text.trim());

    let wire: ExtractionWire = serde_json::from_str(payload)
        .map_err(|e| InferenceError::Parse(format!("backend returned non-conforming JSON: {}", e)))?;

    let intent = wire
        .intent
        .as_deref()
        .and_then(parse_intent)
        .or_else(|| wire.operation_performed.as_deref().and_then(classifier_intent))
        .unwrap_or_default();

    let records = wire
        .results
        .unwrap_or_default()
        .into_iter()
        .filter(|row| !row.dish_name.is_empty())
        .map(|row| SearchRecord {
            restaurant_id: row.restaurant_id,
            restaurant_name: row.restaurant_name,
            dish_name: row.dish_name,
            dish_price: row.dish_price,
        })
        .collect();

    Ok(Turn {
        intent,
        category: wire.category.filter(|c| !c.trim().is_empty()),
        records,
        constraints: wire.constraints.unwrap_or_default(),
    })
}

fn parse_intent(raw: &str) -> Option<Intent> {
    match raw.trim().to_lowercase().as_str() {
        "explore" => Some(Intent::Explore),
        "select" => Some(Intent::Select),
        "add" => Some(Intent::Add),
        "remove" => Some(Intent::Remove),
        "replace" => Some(Intent::Replace),
        "query" => Some(Intent::Query),
        _ => None,
    }
}

/// Map the legacy `operation_performed` classifier onto an intent.
fn classifier_intent(raw: &str) -> Option<Intent> {
    match raw.trim().to_lowercase().as_str() {
        "added" => Some(Intent::Add),
        "filtered" => Some(Intent::Select),
        "replaced" => Some(Intent::Replace),
        "removed" => Some(Intent::Remove),
        "no_change" => Some(Intent::Query),
        _ => None,
    }
}

/// Unwrap a ```json fenced block when the model ignores the JSON-only
/// instruction; otherwise return the input unchanged.
fn strip_code_fence(content: &str) -> &str {
    let Some(fence_start) = content.find("```") else {
        return content;
    };
    let after_opening = &content[fence_start + 3..];

    let Some(newline) = after_opening.find('\n') else {
        return content;
    };
    let body = &after_opening[newline + 1..];

    match body.find("```") {
        Some(closing) => body[..closing].trim(),
        None => content,
    }
}

#[derive(Debug, Deserialize)]
struct ExtractionWire {
    intent: Option<String>,
    category: Option<String>,
    results: Option<Vec<ExtractedRow>>,
    constraints: Option<Vec<String>>,
    operation_performed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractedRow {
    #[serde(default, deserialize_with = "lenient_string")]
    restaurant_id: String,
    #[serde(default)]
    restaurant_name: String,
    #[serde(default)]
    dish_name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    dish_price: f64,
}

/// Accept a JSON string or number where a string is expected.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Accept a JSON number or numeric string where a number is expected.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(restaurant_id: &str, dish: &str, price: f64) -> SearchRecord {
        SearchRecord {
            restaurant_id: restaurant_id.to_string(),
            restaurant_name: "Sakhli 11".to_string(),
            dish_name: dish.to_string(),
            dish_price: price,
        }
    }

    #[test]
    fn test_build_request_serializes_full_catalog() {
        let records = vec![
            record("1", "Khachapuri", 8.0),
            record("1", "Lobiani", 6.0),
        ];

        let request = build_request("khachapuri", None, &SelectionContext::default(), None, 10, &records);

        let crate::llm::Part::Text(text) = &request.parts[0] else {
            panic!("expected text part");
        };
        assert!(text.contains("Khachapuri"));
        assert!(text.contains("Lobiani"));
        assert!(text.contains("at most 10 rows"));
        assert!(!request.has_image());
    }

    #[test]
    fn test_build_request_with_image_adds_analysis_block() {
        let descriptor = ImageDescriptor {
            data: "aGVsbG8=".to_string(),
            mime_type: "image/png".to_string(),
        };

        let request = build_request(
            "",
            Some(&descriptor),
            &SelectionContext::default(),
            None,
            5,
            &[],
        );

        assert!(request.has_image());
        let crate::llm::Part::Text(text) = &request.parts[1] else {
            panic!("expected text part");
        };
        assert!(text.contains("IMAGE ANALYSIS MODE"));
        assert!(text.contains("never a free-text"));
    }

    #[test]
    fn test_build_request_carries_constraints_and_preferences() {
        let context = SelectionContext {
            entries: vec![],
            constraints: vec!["no pork".to_string()],
        };

        let request = build_request(
            "drinks",
            None,
            &context,
            Some("vegetarian, no nuts"),
            10,
            &[],
        );

        let crate::llm::Part::Text(text) = &request.parts[0] else {
            panic!("expected text part");
        };
        assert!(text.contains("STANDING CONSTRAINTS"));
        assert!(text.contains("no pork"));
        assert!(text.contains("vegetarian, no nuts"));
    }

    #[test]
    fn test_parse_extraction_full_shape() {
        let text = r#"{
            "intent": "select",
            "category": "khinkali",
            "results": [{
                "restaurant_id": "1",
                "restaurant_name": "Sakhli 11",
                "dish_name": "Khinkali (beef)",
                "dish_price": 1.2
            }],
            "constraints": ["no pork"]
        }"#;

        let turn = parse_extraction(text).unwrap();

        assert_eq!(turn.intent, Intent::Select);
        assert_eq!(turn.category.as_deref(), Some("khinkali"));
        assert_eq!(turn.records.len(), 1);
        assert_eq!(turn.constraints, vec!["no pork"]);
    }

    #[test]
    fn test_parse_extraction_lenient_id_and_price() {
        let text = r#"{
            "intent": "explore",
            "results": [{
                "restaurant_id": 1,
                "restaurant_name": "Sakhli 11",
                "dish_name": "Khachapuri",
                "dish_price": "8.00"
            }]
        }"#;

        let turn = parse_extraction(text).unwrap();

        assert_eq!(turn.records[0].restaurant_id, "1");
        assert!((turn.records[0].dish_price - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_extraction_missing_results_is_empty_turn() {
        let turn = parse_extraction(r#"{"intent": "query"}"#).unwrap();
        assert_eq!(turn.intent, Intent::Query);
        assert!(turn.records.is_empty());
    }

    #[test]
    fn test_parse_extraction_unknown_intent_defaults_to_explore() {
        let turn = parse_extraction(r#"{"intent": "banquet", "results": []}"#).unwrap();
        assert_eq!(turn.intent, Intent::Explore);
    }

    #[test]
    fn test_parse_extraction_legacy_classifier() {
        let turn =
            parse_extraction(r#"{"operation_performed": "removed", "results": []}"#).unwrap();
        assert_eq!(turn.intent, Intent::Remove);
    }

    #[test]
    fn test_parse_extraction_fenced_json() {
        let text = "```json\n{\"intent\": \"add\", \"results\": []}\n```\nDone.";
        let turn = parse_extraction(text).unwrap();
        assert_eq!(turn.intent, Intent::Add);
    }

    #[test]
    fn test_parse_extraction_rejects_non_json() {
        let err = parse_extraction("I could not find anything.").unwrap_err();
        assert!(matches!(err, InferenceError::Parse(_)));
    }
}
