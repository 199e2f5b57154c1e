//! Response reconciliation
//!
//! Maps the final selection back onto the authoritative catalog. The catalog
//! is ground truth: entries that do not resolve to a live (restaurant, dish)
//! pair are silently dropped, and the output never carries two dishes with
//! the same `(restaurant_id, dish_name)` key.

use std::collections::HashSet;

use crate::db::Restaurant;

use super::selection::SelectionEntry;

/// Prune the live catalog down to the selected dishes.
///
/// Restaurants whose id was referenced stay in the output even when every
/// referenced dish name failed to resolve; their dish list is then empty.
/// Never fails; an empty selection yields an empty list.
pub fn reconcile(entries: &[SelectionEntry], catalog: &[Restaurant]) -> Vec<Restaurant> {
    let requested_ids: HashSet<&str> = entries
        .iter()
        .map(|entry| entry.restaurant_id.as_str())
        .collect();
    let requested_keys: HashSet<(&str, &str)> =
        entries.iter().map(|entry| entry.key()).collect();

    catalog
        .iter()
        .filter(|restaurant| requested_ids.contains(restaurant.id.to_string().as_str()))
        .map(|restaurant| {
            let restaurant_id = restaurant.id.to_string();
            let mut seen: HashSet<&str> = HashSet::new();

            let dishes = restaurant
                .dishes
                .iter()
                .filter(|dish| {
                    requested_keys.contains(&(restaurant_id.as_str(), dish.name.as_str()))
                        && seen.insert(dish.name.as_str())
                })
                .cloned()
                .collect();

            Restaurant {
                dishes,
                ..restaurant.clone()
            }
        })
        .collect()
}
