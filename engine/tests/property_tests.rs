//! Property-based tests for the orchestrator's invariants.

use proptest::prelude::*;
use std::collections::HashSet;

use supra_engine::db::{Dish, Restaurant};
use supra_engine::search::reconcile::reconcile;
use supra_engine::search::selection::{
    apply_turn, verify_records, Intent, SelectionContext, SelectionEntry, Turn,
};
use supra_engine::search::{project, SearchRecord};

fn build_catalog(rows: Vec<(String, Vec<(String, f64)>)>) -> Vec<Restaurant> {
    rows.into_iter()
        .enumerate()
        .map(|(index, (name, dishes))| {
            let restaurant_id = index as i64 + 1;
            Restaurant {
                id: restaurant_id,
                name,
                address: String::new(),
                latitude: 41.7,
                longitude: 44.8,
                working_hours: String::new(),
                phone: String::new(),
                price_range: 2,
                atmosphere: vec![],
                dishes: dishes
                    .into_iter()
                    .enumerate()
                    .map(|(dish_index, (dish_name, price))| Dish {
                        id: dish_index as i64 + 1,
                        restaurant_id,
                        name: dish_name,
                        description: String::new(),
                        price,
                        image_url: String::new(),
                        ingredients: vec![],
                        tags: vec![],
                        allergens: vec![],
                    })
                    .collect(),
            }
        })
        .collect()
}

fn arb_catalog() -> impl Strategy<Value = Vec<Restaurant>> {
    prop::collection::vec(
        (
            "[A-Z][a-z]{2,8}",
            prop::collection::vec(("[A-Z][a-z]{2,8}", 0.5f64..50.0), 0..5),
        ),
        0..5,
    )
    .prop_map(build_catalog)
}

fn arb_entries() -> impl Strategy<Value = Vec<SelectionEntry>> {
    prop::collection::vec(
        ("[0-9]{1,2}", "[A-Z][a-z]{2,8}", 0.5f64..50.0),
        0..8,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .map(|(restaurant_id, dish_name, price)| SelectionEntry {
                restaurant_id,
                restaurant_name: String::new(),
                dish_name,
                dish_price: price,
                category: String::new(),
            })
            .collect()
    })
}

proptest! {
    /// Projecting the same catalog twice yields identical record lists.
    #[test]
    fn prop_projection_idempotent(catalog in arb_catalog()) {
        prop_assert_eq!(project(&catalog), project(&catalog));
    }

    /// One record per (restaurant, dish) pair, in catalog order.
    #[test]
    fn prop_projection_covers_every_dish(catalog in arb_catalog()) {
        let records = project(&catalog);
        let expected: usize = catalog.iter().map(|r| r.dishes.len()).sum();
        prop_assert_eq!(records.len(), expected);

        for record in &records {
            let restaurant = catalog
                .iter()
                .find(|r| r.id.to_string() == record.restaurant_id);
            prop_assert!(restaurant.is_some());
        }
    }

    /// Verified records are always a subset of the projection, without
    /// duplicate keys, regardless of what the backend claimed.
    #[test]
    fn prop_verification_only_admits_catalog_records(
        catalog in arb_catalog(),
        noise in prop::collection::vec(("[0-9]{1,2}", "[A-Za-z]{2,8}", 0.5f64..50.0), 0..8),
    ) {
        let projection = project(&catalog);

        let mut claimed: Vec<SearchRecord> = projection.clone();
        claimed.extend(noise.into_iter().map(|(restaurant_id, dish_name, price)| SearchRecord {
            restaurant_id,
            restaurant_name: String::new(),
            dish_name,
            dish_price: price,
        }));

        let verified = verify_records(&claimed, &projection);

        let mut seen = HashSet::new();
        for record in &verified {
            prop_assert!(projection.contains(record));
            prop_assert!(seen.insert((record.restaurant_id.clone(), record.dish_name.clone())));
        }
    }

    /// Reconciled output only ever contains live catalog dishes and never
    /// repeats a (restaurant_id, dish_name) key.
    #[test]
    fn prop_reconcile_ground_truth_and_dedup(
        catalog in arb_catalog(),
        entries in arb_entries(),
    ) {
        let output = reconcile(&entries, &catalog);

        let mut seen = HashSet::new();
        for restaurant in &output {
            let live = catalog.iter().find(|r| r.id == restaurant.id);
            prop_assert!(live.is_some());
            let live = live.expect("checked above");

            for dish in &restaurant.dishes {
                prop_assert!(live.dishes.iter().any(|d| d.name == dish.name));
                prop_assert!(seen.insert((restaurant.id, dish.name.clone())));
            }
        }
    }

    /// The selection never exceeds the limit and never holds duplicate keys
    /// after any turn.
    #[test]
    fn prop_apply_turn_respects_limit_and_dedup(
        catalog in arb_catalog(),
        limit in 1usize..6,
        intent_index in 0usize..6,
    ) {
        let intents = [
            Intent::Explore,
            Intent::Select,
            Intent::Add,
            Intent::Remove,
            Intent::Replace,
            Intent::Query,
        ];

        let records = project(&catalog);
        let turn = Turn {
            intent: intents[intent_index],
            category: Some("dishes".to_string()),
            records: records.clone(),
            constraints: vec![],
        };

        // Seed the context with a first exploration turn.
        let seeded = apply_turn(&SelectionContext::default(), &Turn {
            intent: Intent::Explore,
            category: Some("dishes".to_string()),
            records,
            constraints: vec![],
        }, limit);

        let next = apply_turn(&seeded, &turn, limit);

        prop_assert!(next.entries.len() <= limit);

        let mut seen = HashSet::new();
        for entry in &next.entries {
            prop_assert!(seen.insert((entry.restaurant_id.clone(), entry.dish_name.clone())));
        }

        if intents[intent_index] == Intent::Remove {
            prop_assert!(next.entries.len() <= seeded.entries.len());
        }
    }
}
