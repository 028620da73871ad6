//! Derived read operations over a fetched restaurant list.
//!
//! These are pure transformations; they never touch the store or the remote.

use crate::models::Restaurant;

/// Value that matches any cuisine or neighborhood.
pub const ANY: &str = "all";

/// Restaurants whose `attr` equals `value` exactly (case-sensitive), in
/// input order.
pub fn filter_by_attribute(restaurants: &[Restaurant], attr: &str, value: &str) -> Vec<Restaurant> {
    restaurants
        .iter()
        .filter(|r| r.attribute(attr) == Some(value))
        .cloned()
        .collect()
}

/// Distinct values of `attr`, in order of first appearance. Restaurants
/// without the attribute are skipped.
pub fn distinct_values_of(restaurants: &[Restaurant], attr: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for value in restaurants.iter().filter_map(|r| r.attribute(attr)) {
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
    values
}

/// Filter by cuisine and neighborhood, where [`ANY`] disables that filter.
pub fn filter_by_cuisine_and_neighborhood(
    restaurants: &[Restaurant],
    cuisine: &str,
    neighborhood: &str,
) -> Vec<Restaurant> {
    restaurants
        .iter()
        .filter(|r| cuisine == ANY || r.cuisine_type.as_deref() == Some(cuisine))
        .filter(|r| neighborhood == ANY || r.neighborhood.as_deref() == Some(neighborhood))
        .cloned()
        .collect()
}
