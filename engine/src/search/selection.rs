//! Selection policy state machine
//!
//! The conversational selection set is owned by this module, not by the
//! inference backend. The backend classifies each utterance into an
//! [`Intent`] and extracts the catalog records it refers to; the rules that
//! decide what the selection looks like afterwards live here as pure,
//! deterministic functions over [`SelectionContext`].
//!
//! Invariants enforced on every turn:
//! - no duplicate `(restaurant_id, dish_name)` pair,
//! - the selection never exceeds the requested limit,
//! - entries unknown to the live catalog never enter the context,
//! - standing constraints persist until countermanded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::db::Restaurant;

use super::projector::SearchRecord;

/// What a conversational turn asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Show all options in a category; the default mode
    #[default]
    Explore,

    /// Commit to specific item(s) among previously shown alternatives
    Select,

    /// Append new items/categories, keeping the prior selection
    Add,

    /// Drop explicitly named items or one named category
    Remove,

    /// Swap one category for another
    Replace,

    /// Ask about the current selection without changing it
    Query,
}

/// One entry of the selection set: a catalog record plus the category label
/// the backend assigned when the entry was introduced. The category is what
/// lets a later selection drop exactly the shown siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub restaurant_id: String,
    pub restaurant_name: String,
    pub dish_name: String,
    pub dish_price: f64,
    #[serde(default)]
    pub category: String,
}

impl SelectionEntry {
    fn from_record(record: &SearchRecord, category: &str) -> Self {
        Self {
            restaurant_id: record.restaurant_id.clone(),
            restaurant_name: record.restaurant_name.clone(),
            dish_name: record.dish_name.clone(),
            dish_price: record.dish_price,
            category: category.to_string(),
        }
    }

    /// Dedup key for selection entries.
    pub fn key(&self) -> (&str, &str) {
        (self.restaurant_id.as_str(), self.dish_name.as_str())
    }

    fn in_category(&self, category: &str) -> bool {
        !category.is_empty() && self.category.to_lowercase() == category.to_lowercase()
    }
}

/// The selection set carried between conversational turns.
///
/// Travels with the caller (the backend holds no session); the orchestrator
/// returns the updated context with every reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionContext {
    #[serde(default)]
    pub entries: Vec<SelectionEntry>,

    /// Standing allergen/preference constraints, persistent across turns
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// What the backend extracted from one turn, already verified against the
/// live catalog (see [`verify_records`]).
#[derive(Debug, Clone, Default)]
pub struct Turn {
    pub intent: Intent,
    pub category: Option<String>,
    pub records: Vec<SearchRecord>,
    pub constraints: Vec<String>,
}

/// Apply one turn to the selection context. Pure.
pub fn apply_turn(context: &SelectionContext, turn: &Turn, limit: usize) -> SelectionContext {
    let category = turn.category.as_deref().unwrap_or("").trim();
    let mut entries = context.entries.clone();

    match turn.intent {
        Intent::Explore | Intent::Query | Intent::Add => {
            append_records(&mut entries, &turn.records, category);
        }
        Intent::Select => {
            // Drop the shown siblings, keep unrelated categories untouched.
            entries.retain(|entry| !entry.in_category(category));
            append_records(&mut entries, &turn.records, category);
        }
        Intent::Remove => {
            if !turn.records.is_empty() {
                let removed: Vec<(&str, &str)> = turn
                    .records
                    .iter()
                    .map(|r| (r.restaurant_id.as_str(), r.dish_name.as_str()))
                    .collect();
                entries.retain(|entry| !removed.contains(&entry.key()));
            } else if !category.is_empty() {
                entries.retain(|entry| !entry.in_category(category));
            }
            // Nothing is ever removed implicitly.
        }
        Intent::Replace => {
            entries.retain(|entry| !entry.in_category(category));
            append_records(&mut entries, &turn.records, category);
        }
    }

    if entries.len() > limit {
        // Prior entries win over newly appended ones; only the tail added
        // this turn is cut.
        warn!(
            "selection exceeds limit {}, truncating {} entries",
            limit,
            entries.len() - limit
        );
        entries.truncate(limit);
    }

    SelectionContext {
        entries,
        constraints: merge_constraints(&context.constraints, &turn.constraints),
    }
}

/// Append records not already present, tagging each with the turn category.
fn append_records(entries: &mut Vec<SelectionEntry>, records: &[SearchRecord], category: &str) {
    for record in records {
        let key = (record.restaurant_id.as_str(), record.dish_name.as_str());
        if entries.iter().any(|entry| entry.key() == key) {
            continue;
        }
        entries.push(SelectionEntry::from_record(record, category));
    }
}

/// Union of standing and newly stated constraints, case-insensitive.
fn merge_constraints(standing: &[String], stated: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = standing.to_vec();
    for constraint in stated {
        let trimmed = constraint.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !merged
            .iter()
            .any(|existing| existing.to_lowercase() == trimmed.to_lowercase())
        {
            merged.push(trimmed.to_string());
        }
    }
    merged
}

/// Verify extracted records against the live projection.
///
/// The catalog is ground truth: rows that do not resolve to a projected
/// record are dropped, and resolving rows are replaced by the catalog record
/// so the backend cannot corrupt names or prices. Matching is
/// case-insensitive on the dish name; duplicates collapse to the first
/// occurrence.
pub fn verify_records(extracted: &[SearchRecord], projection: &[SearchRecord]) -> Vec<SearchRecord> {
    let by_key: HashMap<(String, String), &SearchRecord> = projection
        .iter()
        .map(|record| {
            (
                (record.restaurant_id.clone(), record.dish_name.to_lowercase()),
                record,
            )
        })
        .collect();

    let mut verified: Vec<SearchRecord> = Vec::new();
    for row in extracted {
        let key = (row.restaurant_id.clone(), row.dish_name.to_lowercase());
        let Some(record) = by_key.get(&key) else {
            warn!(
                "dropping unverifiable record: restaurant {} / {}",
                row.restaurant_id, row.dish_name
            );
            continue;
        };
        if verified
            .iter()
            .any(|existing| existing.restaurant_id == record.restaurant_id
                && existing.dish_name == record.dish_name)
        {
            continue;
        }
        verified.push((*record).clone());
    }
    verified
}

/// Drop entries whose live dish lists an allergen named by a standing
/// constraint. The match is case-insensitive substring containment of the
/// catalog's own allergen vocabulary inside the constraint text ("I have a
/// pork allergy" drops dishes listing "pork").
pub fn enforce_constraints(
    context: SelectionContext,
    catalog: &[Restaurant],
) -> SelectionContext {
    if context.constraints.is_empty() {
        return context;
    }

    let lowered: Vec<String> = context
        .constraints
        .iter()
        .map(|c| c.to_lowercase())
        .collect();

    let mut allergens_by_key: HashMap<(String, String), &Vec<String>> = HashMap::new();
    for restaurant in catalog {
        for dish in &restaurant.dishes {
            allergens_by_key.insert(
                (restaurant.id.to_string(), dish.name.to_lowercase()),
                &dish.allergens,
            );
        }
    }

    let entries = context
        .entries
        .into_iter()
        .filter(|entry| {
            let key = (entry.restaurant_id.clone(), entry.dish_name.to_lowercase());
            let Some(allergens) = allergens_by_key.get(&key) else {
                return true;
            };
            let blocked = allergens.iter().any(|allergen| {
                let allergen = allergen.to_lowercase();
                !allergen.is_empty() && lowered.iter().any(|c| c.contains(&allergen))
            });
            if blocked {
                warn!(
                    "dropping {} ({}) against standing constraints",
                    entry.dish_name, entry.restaurant_name
                );
            }
            !blocked
        })
        .collect();

    SelectionContext {
        entries,
        constraints: context.constraints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(restaurant_id: &str, dish: &str, price: f64) -> SearchRecord {
        SearchRecord {
            restaurant_id: restaurant_id.to_string(),
            restaurant_name: format!("Restaurant {}", restaurant_id),
            dish_name: dish.to_string(),
            dish_price: price,
        }
    }

    fn turn(intent: Intent, category: &str, records: Vec<SearchRecord>) -> Turn {
        Turn {
            intent,
            category: Some(category.to_string()),
            records,
            constraints: vec![],
        }
    }

    #[test]
    fn test_explore_appends_all_matches() {
        let context = SelectionContext::default();
        let matches = vec![
            record("1", "Khinkali (beef)", 1.0),
            record("1", "Khinkali (pork)", 1.0),
            record("2", "Khinkali (mushroom)", 1.2),
        ];

        let next = apply_turn(&context, &turn(Intent::Explore, "khinkali", matches), 10);

        assert_eq!(next.entries.len(), 3);
        assert!(next.entries.iter().all(|e| e.category == "khinkali"));
    }

    #[test]
    fn test_select_narrows_category_keeps_others() {
        let mut context = SelectionContext::default();
        context = apply_turn(
            &context,
            &turn(
                Intent::Explore,
                "khachapuri",
                vec![
                    record("1", "Khachapuri Adjaruli", 8.0),
                    record("2", "Khachapuri Imeruli", 7.0),
                ],
            ),
            10,
        );
        context = apply_turn(
            &context,
            &turn(Intent::Add, "drinks", vec![record("1", "Tarkhuna", 2.0)]),
            10,
        );

        let next = apply_turn(
            &context,
            &turn(
                Intent::Select,
                "khachapuri",
                vec![record("1", "Khachapuri Adjaruli", 8.0)],
            ),
            10,
        );

        let names: Vec<&str> = next.entries.iter().map(|e| e.dish_name.as_str()).collect();
        assert_eq!(names, vec!["Tarkhuna", "Khachapuri Adjaruli"]);
    }

    #[test]
    fn test_add_preserves_prior_selection() {
        let context = apply_turn(
            &SelectionContext::default(),
            &turn(Intent::Explore, "khinkali", vec![record("1", "Khinkali (beef)", 1.0)]),
            10,
        );

        let next = apply_turn(
            &context,
            &turn(Intent::Add, "drinks", vec![record("1", "Saperavi", 6.0)]),
            10,
        );

        assert_eq!(next.entries.len(), 2);
        assert_eq!(next.entries[0].dish_name, "Khinkali (beef)");
    }

    #[test]
    fn test_remove_named_item_only() {
        let mut context = SelectionContext::default();
        context = apply_turn(
            &context,
            &turn(
                Intent::Explore,
                "khinkali",
                vec![
                    record("1", "Khinkali (beef)", 1.0),
                    record("1", "Khinkali (pork)", 1.0),
                ],
            ),
            10,
        );

        let next = apply_turn(
            &context,
            &turn(Intent::Remove, "", vec![record("1", "Khinkali (pork)", 1.0)]),
            10,
        );

        assert_eq!(next.entries.len(), 1);
        assert_eq!(next.entries[0].dish_name, "Khinkali (beef)");
    }

    #[test]
    fn test_remove_whole_category_when_no_items_named() {
        let mut context = SelectionContext::default();
        context = apply_turn(
            &context,
            &turn(Intent::Explore, "drinks", vec![record("1", "Saperavi", 6.0)]),
            10,
        );
        context = apply_turn(
            &context,
            &turn(Intent::Add, "khachapuri", vec![record("1", "Khachapuri Adjaruli", 8.0)]),
            10,
        );

        let next = apply_turn(&context, &turn(Intent::Remove, "drinks", vec![]), 10);

        assert_eq!(next.entries.len(), 1);
        assert_eq!(next.entries[0].dish_name, "Khachapuri Adjaruli");
    }

    #[test]
    fn test_remove_with_nothing_named_removes_nothing() {
        let context = apply_turn(
            &SelectionContext::default(),
            &turn(Intent::Explore, "drinks", vec![record("1", "Saperavi", 6.0)]),
            10,
        );

        let next = apply_turn(&context, &turn(Intent::Remove, "", vec![]), 10);
        assert_eq!(next.entries.len(), 1);
    }

    #[test]
    fn test_replace_swaps_category() {
        let context = apply_turn(
            &SelectionContext::default(),
            &turn(Intent::Explore, "drinks", vec![record("1", "Saperavi", 6.0)]),
            10,
        );

        let next = apply_turn(
            &context,
            &turn(Intent::Replace, "drinks", vec![record("1", "Tarkhuna", 2.0)]),
            10,
        );

        assert_eq!(next.entries.len(), 1);
        assert_eq!(next.entries[0].dish_name, "Tarkhuna");
    }

    #[test]
    fn test_no_duplicate_keys_after_any_turn() {
        let context = apply_turn(
            &SelectionContext::default(),
            &turn(Intent::Explore, "khinkali", vec![record("1", "Khinkali (beef)", 1.0)]),
            10,
        );

        let next = apply_turn(
            &context,
            &turn(
                Intent::Add,
                "khinkali",
                vec![
                    record("1", "Khinkali (beef)", 1.0),
                    record("1", "Khinkali (beef)", 1.0),
                ],
            ),
            10,
        );

        assert_eq!(next.entries.len(), 1);
    }

    #[test]
    fn test_limit_truncates_new_entries_keeps_prior() {
        let context = apply_turn(
            &SelectionContext::default(),
            &turn(Intent::Explore, "khachapuri", vec![record("1", "Khachapuri Adjaruli", 8.0)]),
            10,
        );

        let next = apply_turn(
            &context,
            &turn(
                Intent::Add,
                "khinkali",
                vec![
                    record("1", "Khinkali (beef)", 1.0),
                    record("1", "Khinkali (pork)", 1.0),
                    record("2", "Khinkali (mushroom)", 1.2),
                ],
            ),
            2,
        );

        assert_eq!(next.entries.len(), 2);
        assert_eq!(next.entries[0].dish_name, "Khachapuri Adjaruli");
        assert_eq!(next.entries[1].dish_name, "Khinkali (beef)");
    }

    #[test]
    fn test_constraints_persist_and_union() {
        let mut context = SelectionContext::default();
        context = apply_turn(
            &context,
            &Turn {
                intent: Intent::Explore,
                category: None,
                records: vec![],
                constraints: vec!["no pork".to_string()],
            },
            10,
        );
        context = apply_turn(
            &context,
            &Turn {
                intent: Intent::Query,
                category: None,
                records: vec![],
                constraints: vec!["NO PORK".to_string(), "nut allergy".to_string()],
            },
            10,
        );

        assert_eq!(context.constraints, vec!["no pork", "nut allergy"]);
    }

    #[test]
    fn test_verify_records_drops_hallucinations_and_normalizes() {
        let projection = vec![record("1", "Khachapuri", 8.0)];
        let extracted = vec![
            SearchRecord {
                restaurant_id: "1".to_string(),
                restaurant_name: "Wrong Name".to_string(),
                dish_name: "khachapuri".to_string(),
                dish_price: 99.0,
            },
            record("1", "Mystery Pie", 5.0),
        ];

        let verified = verify_records(&extracted, &projection);

        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].restaurant_name, "Restaurant 1");
        assert!((verified[0].dish_price - 8.0).abs() < f64::EPSILON);
        assert_eq!(verified[0].dish_name, "Khachapuri");
    }

    #[test]
    fn test_verify_records_collapses_duplicates() {
        let projection = vec![record("1", "Khachapuri", 8.0)];
        let extracted = vec![record("1", "Khachapuri", 8.0), record("1", "Khachapuri", 8.0)];

        assert_eq!(verify_records(&extracted, &projection).len(), 1);
    }

    #[test]
    fn test_enforce_constraints_drops_listed_allergens() {
        use crate::db::Dish;

        let catalog = vec![Restaurant {
            id: 1,
            name: "Sakhli 11".to_string(),
            address: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            working_hours: String::new(),
            phone: String::new(),
            price_range: 2,
            atmosphere: vec![],
            dishes: vec![
                Dish {
                    id: 1,
                    restaurant_id: 1,
                    name: "Khinkali (pork)".to_string(),
                    description: String::new(),
                    price: 1.0,
                    image_url: String::new(),
                    ingredients: vec![],
                    tags: vec![],
                    allergens: vec!["pork".to_string()],
                },
                Dish {
                    id: 2,
                    restaurant_id: 1,
                    name: "Khinkali (mushroom)".to_string(),
                    description: String::new(),
                    price: 1.1,
                    image_url: String::new(),
                    ingredients: vec![],
                    tags: vec![],
                    allergens: vec![],
                },
            ],
        }];

        let context = SelectionContext {
            entries: vec![
                SelectionEntry::from_record(&record("1", "Khinkali (pork)", 1.0), "khinkali"),
                SelectionEntry::from_record(&record("1", "Khinkali (mushroom)", 1.1), "khinkali"),
            ],
            constraints: vec!["I have a PORK allergy".to_string()],
        };

        let filtered = enforce_constraints(context, &catalog);

        assert_eq!(filtered.entries.len(), 1);
        assert_eq!(filtered.entries[0].dish_name, "Khinkali (mushroom)");
        assert_eq!(filtered.constraints.len(), 1);
    }
}
