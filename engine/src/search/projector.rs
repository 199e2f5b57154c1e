//! Catalog projection
//!
//! Flattens the live restaurant/dish catalog into the flat records the
//! inference backend is given. One record per (restaurant, dish) pair, in
//! catalog order; the restaurant id is stringified for the wire contract.

use serde::{Deserialize, Serialize};

use crate::db::Restaurant;

/// Flat (restaurant, dish) projection.
///
/// Derived per orchestration call, never persisted, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub restaurant_id: String,
    pub restaurant_name: String,
    pub dish_name: String,
    pub dish_price: f64,
}

/// Project the catalog into flat search records. Pure, single pass.
pub fn project(catalog: &[Restaurant]) -> Vec<SearchRecord> {
    catalog
        .iter()
        .flat_map(|restaurant| {
            restaurant.dishes.iter().map(|dish| SearchRecord {
                restaurant_id: restaurant.id.to_string(),
                restaurant_name: restaurant.name.clone(),
                dish_name: dish.name.clone(),
                dish_price: dish.price,
            })
        })
        .collect()
}
