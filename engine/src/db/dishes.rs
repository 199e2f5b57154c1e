/// Dish persistence operations
///
/// Dishes belong to exactly one restaurant; creation validates the owning
/// restaurant so every stored dish resolves to a live restaurant.
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use super::{decode_list, encode_list, StoreError};

/// Dish record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub id: i64,
    pub restaurant_id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image_url: String,
    pub ingredients: Vec<String>,
    pub tags: Vec<String>,
    pub allergens: Vec<String>,
}

/// Payload for creating a dish
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDish {
    pub restaurant_id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image_url: String,
    pub ingredients: Vec<String>,
    pub tags: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
}

/// Partial update for a dish; unset fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DishUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub ingredients: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub allergens: Option<Vec<String>>,
}

/// Dish repository for database operations
pub struct DishRepository {
    pool: SqlitePool,
}

impl DishRepository {
    /// Create a new dish repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new dish after validating the owning restaurant exists
    pub async fn create(&self, new: &NewDish) -> Result<Dish, StoreError> {
        validate_price(new.price)?;
        self.ensure_restaurant(new.restaurant_id).await?;

        let result = sqlx::query(
            "INSERT INTO dishes (restaurant_id, name, description, price, image_url, ingredients, tags, allergens) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.restaurant_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(&new.image_url)
        .bind(encode_list(&new.ingredients))
        .bind(encode_list(&new.tags))
        .bind(encode_list(&new.allergens))
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid()).await
    }

    /// List all dishes
    pub async fn list(&self) -> Result<Vec<Dish>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, restaurant_id, name, description, price, image_url, ingredients, tags, allergens \
             FROM dishes ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_dish_row).collect())
    }

    /// Get a dish by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Dish, StoreError> {
        let row = sqlx::query(
            "SELECT id, restaurant_id, name, description, price, image_url, ingredients, tags, allergens \
             FROM dishes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_dish_row).ok_or(StoreError::NotFound {
            entity: "Dish",
            id,
        })
    }

    /// List the dishes of one restaurant
    pub async fn find_by_restaurant(&self, restaurant_id: i64) -> Result<Vec<Dish>, StoreError> {
        self.ensure_restaurant(restaurant_id).await?;

        let rows = sqlx::query(
            "SELECT id, restaurant_id, name, description, price, image_url, ingredients, tags, allergens \
             FROM dishes WHERE restaurant_id = ? ORDER BY id ASC",
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_dish_row).collect())
    }

    /// Find dishes by exact name
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<Dish>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, restaurant_id, name, description, price, image_url, ingredients, tags, allergens \
             FROM dishes WHERE name = ? ORDER BY id ASC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_dish_row).collect())
    }

    /// Find dishes within an inclusive price band
    pub async fn find_by_price_range(
        &self,
        min_price: f64,
        max_price: f64,
    ) -> Result<Vec<Dish>, StoreError> {
        if min_price < 0.0 || max_price < 0.0 || min_price > max_price {
            return Err(StoreError::InvalidInput("Invalid price range".to_string()));
        }

        let rows = sqlx::query(
            "SELECT id, restaurant_id, name, description, price, image_url, ingredients, tags, allergens \
             FROM dishes WHERE price >= ? AND price <= ? ORDER BY id ASC",
        )
        .bind(min_price)
        .bind(max_price)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_dish_row).collect())
    }

    /// Find dishes carrying any of the given tags (case-insensitive).
    ///
    /// Tag lists live in JSON columns, so the match runs over the decoded
    /// lists rather than in SQL.
    pub async fn find_by_tags(&self, tags: &[String]) -> Result<Vec<Dish>, StoreError> {
        if tags.is_empty() {
            return Err(StoreError::InvalidInput(
                "At least one tag is required".to_string(),
            ));
        }

        let wanted: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        let dishes = self.list().await?;

        Ok(dishes
            .into_iter()
            .filter(|dish| {
                dish.tags
                    .iter()
                    .any(|tag| wanted.contains(&tag.to_lowercase()))
            })
            .collect())
    }

    /// Find dishes listing any of the given allergens (case-insensitive)
    pub async fn find_by_allergens(&self, allergens: &[String]) -> Result<Vec<Dish>, StoreError> {
        if allergens.is_empty() {
            return Err(StoreError::InvalidInput(
                "At least one allergen is required".to_string(),
            ));
        }

        let wanted: Vec<String> = allergens.iter().map(|a| a.to_lowercase()).collect();
        let dishes = self.list().await?;

        Ok(dishes
            .into_iter()
            .filter(|dish| {
                dish.allergens
                    .iter()
                    .any(|allergen| wanted.contains(&allergen.to_lowercase()))
            })
            .collect())
    }

    /// Update a dish; unset fields keep their current value
    pub async fn update(&self, id: i64, update: &DishUpdate) -> Result<Dish, StoreError> {
        let current = self.find_by_id(id).await?;

        let name = update.name.clone().unwrap_or(current.name);
        let description = update.description.clone().unwrap_or(current.description);
        let price = update.price.unwrap_or(current.price);
        let image_url = update.image_url.clone().unwrap_or(current.image_url);
        let ingredients = update.ingredients.clone().unwrap_or(current.ingredients);
        let tags = update.tags.clone().unwrap_or(current.tags);
        let allergens = update.allergens.clone().unwrap_or(current.allergens);

        validate_price(price)?;

        sqlx::query(
            "UPDATE dishes SET name = ?, description = ?, price = ?, image_url = ?, \
             ingredients = ?, tags = ?, allergens = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(&description)
        .bind(price)
        .bind(&image_url)
        .bind(encode_list(&ingredients))
        .bind(encode_list(&tags))
        .bind(encode_list(&allergens))
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await
    }

    /// Delete a dish
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM dishes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "Dish", id });
        }
        Ok(())
    }

    /// Delete every dish of one restaurant
    pub async fn delete_by_restaurant(&self, restaurant_id: i64) -> Result<u64, StoreError> {
        self.ensure_restaurant(restaurant_id).await?;

        let result = sqlx::query("DELETE FROM dishes WHERE restaurant_id = ?")
            .bind(restaurant_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn ensure_restaurant(&self, restaurant_id: i64) -> Result<(), StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM restaurants WHERE id = ?")
            .bind(restaurant_id)
            .fetch_one(&self.pool)
            .await?;

        if count == 0 {
            return Err(StoreError::InvalidInput(format!(
                "Restaurant with ID {} does not exist",
                restaurant_id
            )));
        }
        Ok(())
    }
}

fn validate_price(price: f64) -> Result<(), StoreError> {
    if !price.is_finite() || price < 0.0 {
        return Err(StoreError::InvalidInput(
            "Price must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn map_dish_row(row: sqlx::sqlite::SqliteRow) -> Dish {
    Dish {
        id: row.get("id"),
        restaurant_id: row.get("restaurant_id"),
        name: row.get("name"),
        description: row.get("description"),
        price: row.get("price"),
        image_url: row.get("image_url"),
        ingredients: decode_list(row.get::<String, _>("ingredients").as_str()),
        tags: decode_list(row.get::<String, _>("tags").as_str()),
        allergens: decode_list(row.get::<String, _>("allergens").as_str()),
    }
}
