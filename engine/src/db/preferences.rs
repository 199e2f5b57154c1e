/// User preference persistence operations
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use super::StoreError;

/// Preference record; each field is an independent optional filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreference {
    pub id: i64,
    pub user_id: i64,
    pub tag: Option<String>,
    pub atmosphere: Option<String>,
    pub allergen: Option<String>,
}

/// Payload for creating a preference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPreference {
    pub user_id: i64,
    pub tag: Option<String>,
    pub atmosphere: Option<String>,
    pub allergen: Option<String>,
}

/// Partial update for a preference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    pub tag: Option<String>,
    pub atmosphere: Option<String>,
    pub allergen: Option<String>,
}

/// Preference repository for database operations
pub struct PreferenceRepository {
    pool: SqlitePool,
}

impl PreferenceRepository {
    /// Create a new preference repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a preference after validating the owning user exists
    pub async fn create(&self, new: &NewPreference) -> Result<UserPreference, StoreError> {
        self.ensure_user(new.user_id).await?;

        let result = sqlx::query(
            "INSERT INTO user_preferences (user_id, tag, atmosphere, allergen) VALUES (?, ?, ?, ?)",
        )
        .bind(new.user_id)
        .bind(&new.tag)
        .bind(&new.atmosphere)
        .bind(&new.allergen)
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid()).await
    }

    /// List all preferences
    pub async fn list(&self) -> Result<Vec<UserPreference>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, tag, atmosphere, allergen FROM user_preferences ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_preference_row).collect())
    }

    /// Get a preference by ID
    pub async fn find_by_id(&self, id: i64) -> Result<UserPreference, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, tag, atmosphere, allergen FROM user_preferences WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_preference_row).ok_or(StoreError::NotFound {
            entity: "User Preferences",
            id,
        })
    }

    /// List the preferences of one user
    pub async fn find_by_user(&self, user_id: i64) -> Result<Vec<UserPreference>, StoreError> {
        self.ensure_user(user_id).await?;

        let rows = sqlx::query(
            "SELECT id, user_id, tag, atmosphere, allergen FROM user_preferences \
             WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_preference_row).collect())
    }

    /// Update a preference; unset fields keep their current value
    pub async fn update(
        &self,
        id: i64,
        update: &PreferenceUpdate,
    ) -> Result<UserPreference, StoreError> {
        let current = self.find_by_id(id).await?;

        let tag = update.tag.clone().or(current.tag);
        let atmosphere = update.atmosphere.clone().or(current.atmosphere);
        let allergen = update.allergen.clone().or(current.allergen);

        sqlx::query(
            "UPDATE user_preferences SET tag = ?, atmosphere = ?, allergen = ? WHERE id = ?",
        )
        .bind(&tag)
        .bind(&atmosphere)
        .bind(&allergen)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await
    }

    /// Delete a preference
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM user_preferences WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "User Preferences",
                id,
            });
        }
        Ok(())
    }

    /// Delete every preference of one user
    pub async fn delete_by_user(&self, user_id: i64) -> Result<u64, StoreError> {
        self.ensure_user(user_id).await?;

        let result = sqlx::query("DELETE FROM user_preferences WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn ensure_user(&self, user_id: i64) -> Result<(), StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        if count == 0 {
            return Err(StoreError::InvalidInput(format!(
                "User with ID {} does not exist",
                user_id
            )));
        }
        Ok(())
    }
}

fn map_preference_row(row: sqlx::sqlite::SqliteRow) -> UserPreference {
    UserPreference {
        id: row.get("id"),
        user_id: row.get("user_id"),
        tag: row.get("tag"),
        atmosphere: row.get("atmosphere"),
        allergen: row.get("allergen"),
    }
}
