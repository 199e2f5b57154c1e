/// Restaurant persistence operations
///
/// Restaurants are the root of the catalog; list/find operations load the
/// nested dish list so a single call yields the full catalog snapshot the
/// search orchestrator consumes.
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::dishes::{map_dish_row, Dish};
use super::{decode_list, encode_list, StoreError};

/// Restaurant record with its nested dishes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub working_hours: String,
    pub phone: String,
    pub price_range: i64,
    pub atmosphere: Vec<String>,
    #[serde(default)]
    pub dishes: Vec<Dish>,
}

/// Payload for creating a restaurant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRestaurant {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub working_hours: String,
    pub phone: String,
    pub price_range: i64,
    pub atmosphere: Vec<String>,
}

/// Partial update for a restaurant; unset fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub working_hours: Option<String>,
    pub phone: Option<String>,
    pub price_range: Option<i64>,
    pub atmosphere: Option<Vec<String>>,
}

/// Restaurant repository for database operations
pub struct RestaurantRepository {
    pool: SqlitePool,
}

impl RestaurantRepository {
    /// Create a new restaurant repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new restaurant
    pub async fn create(&self, new: &NewRestaurant) -> Result<Restaurant, StoreError> {
        validate_price_range(new.price_range)?;

        let result = sqlx::query(
            "INSERT INTO restaurants (name, address, latitude, longitude, working_hours, phone, price_range, atmosphere) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.name)
        .bind(&new.address)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(&new.working_hours)
        .bind(&new.phone)
        .bind(new.price_range)
        .bind(encode_list(&new.atmosphere))
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid()).await
    }

    /// List all restaurants with their nested dishes.
    ///
    /// This is the catalog-provider boundary the search orchestrator uses;
    /// every orchestration call fetches a fresh snapshot through it.
    pub async fn list(&self) -> Result<Vec<Restaurant>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, address, latitude, longitude, working_hours, phone, price_range, atmosphere \
             FROM restaurants ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut restaurants: Vec<Restaurant> = rows.into_iter().map(map_restaurant_row).collect();

        let dish_rows = sqlx::query(
            "SELECT id, restaurant_id, name, description, price, image_url, ingredients, tags, allergens \
             FROM dishes ORDER BY restaurant_id ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_restaurant: HashMap<i64, Vec<Dish>> = HashMap::new();
        for row in dish_rows {
            let dish = map_dish_row(row);
            by_restaurant.entry(dish.restaurant_id).or_default().push(dish);
        }

        for restaurant in &mut restaurants {
            if let Some(dishes) = by_restaurant.remove(&restaurant.id) {
                restaurant.dishes = dishes;
            }
        }

        Ok(restaurants)
    }

    /// Get a restaurant by ID, including its dishes
    pub async fn find_by_id(&self, id: i64) -> Result<Restaurant, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, address, latitude, longitude, working_hours, phone, price_range, atmosphere \
             FROM restaurants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let mut restaurant = row
            .map(map_restaurant_row)
            .ok_or(StoreError::NotFound {
                entity: "Restaurant",
                id,
            })?;

        restaurant.dishes = self.dishes_for(id).await?;
        Ok(restaurant)
    }

    /// Find restaurants by exact name
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<Restaurant>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, address, latitude, longitude, working_hours, phone, price_range, atmosphere \
             FROM restaurants WHERE name = ? ORDER BY id ASC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        self.with_dishes(rows.into_iter().map(map_restaurant_row).collect())
            .await
    }

    /// Find restaurants by price range bucket (1..=4)
    pub async fn find_by_price_range(&self, price_range: i64) -> Result<Vec<Restaurant>, StoreError> {
        validate_price_range(price_range)?;

        let rows = sqlx::query(
            "SELECT id, name, address, latitude, longitude, working_hours, phone, price_range, atmosphere \
             FROM restaurants WHERE price_range = ? ORDER BY id ASC",
        )
        .bind(price_range)
        .fetch_all(&self.pool)
        .await?;

        self.with_dishes(rows.into_iter().map(map_restaurant_row).collect())
            .await
    }

    /// Find restaurants within an axis-aligned box around a coordinate.
    ///
    /// Matches |latitude - lat| < radius AND |longitude - lon| < radius,
    /// radius in degrees.
    pub async fn find_by_location(
        &self,
        latitude: f64,
        longitude: f64,
        radius: f64,
    ) -> Result<Vec<Restaurant>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, address, latitude, longitude, working_hours, phone, price_range, atmosphere \
             FROM restaurants \
             WHERE ABS(latitude - ?) < ? AND ABS(longitude - ?) < ? \
             ORDER BY id ASC",
        )
        .bind(latitude)
        .bind(radius)
        .bind(longitude)
        .bind(radius)
        .fetch_all(&self.pool)
        .await?;

        self.with_dishes(rows.into_iter().map(map_restaurant_row).collect())
            .await
    }

    /// Update a restaurant; unset fields keep their current value
    pub async fn update(&self, id: i64, update: &RestaurantUpdate) -> Result<Restaurant, StoreError> {
        let current = self.find_by_id(id).await?;

        let name = update.name.clone().unwrap_or(current.name);
        let address = update.address.clone().unwrap_or(current.address);
        let latitude = update.latitude.unwrap_or(current.latitude);
        let longitude = update.longitude.unwrap_or(current.longitude);
        let working_hours = update.working_hours.clone().unwrap_or(current.working_hours);
        let phone = update.phone.clone().unwrap_or(current.phone);
        let price_range = update.price_range.unwrap_or(current.price_range);
        let atmosphere = update.atmosphere.clone().unwrap_or(current.atmosphere);

        validate_price_range(price_range)?;

        sqlx::query(
            "UPDATE restaurants SET name = ?, address = ?, latitude = ?, longitude = ?, \
             working_hours = ?, phone = ?, price_range = ?, atmosphere = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(&address)
        .bind(latitude)
        .bind(longitude)
        .bind(&working_hours)
        .bind(&phone)
        .bind(price_range)
        .bind(encode_list(&atmosphere))
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await
    }

    /// Delete a restaurant; the FK cascades to its dishes
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM restaurants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Restaurant",
                id,
            });
        }
        Ok(())
    }

    /// Check whether a restaurant exists
    pub async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM restaurants WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn dishes_for(&self, restaurant_id: i64) -> Result<Vec<Dish>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, restaurant_id, name, description, price, image_url, ingredients, tags, allergens \
             FROM dishes WHERE restaurant_id = ? ORDER BY id ASC",
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_dish_row).collect())
    }

    async fn with_dishes(
        &self,
        mut restaurants: Vec<Restaurant>,
    ) -> Result<Vec<Restaurant>, StoreError> {
        for restaurant in &mut restaurants {
            restaurant.dishes = self.dishes_for(restaurant.id).await?;
        }
        Ok(restaurants)
    }
}

fn validate_price_range(price_range: i64) -> Result<(), StoreError> {
    if !(1..=4).contains(&price_range) {
        return Err(StoreError::InvalidInput(
            "Price range must be between 1 and 4".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn map_restaurant_row(row: sqlx::sqlite::SqliteRow) -> Restaurant {
    Restaurant {
        id: row.get("id"),
        name: row.get("name"),
        address: row.get("address"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        working_hours: row.get("working_hours"),
        phone: row.get("phone"),
        price_range: row.get("price_range"),
        atmosphere: decode_list(row.get::<String, _>("atmosphere").as_str()),
        dishes: Vec::new(),
    }
}
