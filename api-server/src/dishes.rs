//! Dish endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use supra_engine::db::{Dish, DishUpdate, NewDish};

use crate::{ApiError, ServerState};

pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<NewDish>,
) -> Result<(StatusCode, Json<Dish>), ApiError> {
    let dish = state.db.dishes().create(&payload).await?;
    Ok((StatusCode::CREATED, Json(dish)))
}

pub async fn list(State(state): State<ServerState>) -> Result<Json<Vec<Dish>>, ApiError> {
    Ok(Json(state.db.dishes().list().await?))
}

pub async fn find_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<Dish>, ApiError> {
    Ok(Json(state.db.dishes().find_by_id(id).await?))
}

pub async fn find_by_restaurant(
    State(state): State<ServerState>,
    Path(restaurant_id): Path<i64>,
) -> Result<Json<Vec<Dish>>, ApiError> {
    Ok(Json(state.db.dishes().find_by_restaurant(restaurant_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

pub async fn find_by_name(
    State(state): State<ServerState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<Vec<Dish>>, ApiError> {
    Ok(Json(state.db.dishes().find_by_name(&query.name).await?))
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub min: f64,
    pub max: f64,
}

pub async fn find_by_price_range(
    State(state): State<ServerState>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<Vec<Dish>>, ApiError> {
    Ok(Json(
        state.db.dishes().find_by_price_range(query.min, query.max).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct TagsQuery {
    /// Comma-separated tag list
    pub tags: String,
}

pub async fn find_by_tags(
    State(state): State<ServerState>,
    Query(query): Query<TagsQuery>,
) -> Result<Json<Vec<Dish>>, ApiError> {
    let tags = split_csv(&query.tags);
    Ok(Json(state.db.dishes().find_by_tags(&tags).await?))
}

#[derive(Debug, Deserialize)]
pub struct AllergensQuery {
    /// Comma-separated allergen list
    pub allergens: String,
}

pub async fn find_by_allergens(
    State(state): State<ServerState>,
    Query(query): Query<AllergensQuery>,
) -> Result<Json<Vec<Dish>>, ApiError> {
    let allergens = split_csv(&query.allergens);
    Ok(Json(state.db.dishes().find_by_allergens(&allergens).await?))
}

pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<DishUpdate>,
) -> Result<Json<Dish>, ApiError> {
    Ok(Json(state.db.dishes().update(id, &payload).await?))
}

pub async fn remove(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db.dishes().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_csv_trims_and_drops_empties() {
        assert_eq!(split_csv("spicy, vegan ,,"), vec!["spicy", "vegan"]);
        assert!(split_csv("").is_empty());
    }
}
