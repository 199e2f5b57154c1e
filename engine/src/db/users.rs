/// User persistence operations
///
/// Authentication and password handling are out of scope for this service;
/// users exist so preferences have an owner.
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use super::StoreError;

/// User record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub user_name: String,
    pub email: String,
}

/// Payload for creating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub user_name: String,
    pub email: String,
}

/// Partial update for a user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub user_name: Option<String>,
    pub email: Option<String>,
}

/// User repository for database operations
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user; duplicate emails surface as a conflict
    pub async fn create(&self, new: &NewUser) -> Result<User, StoreError> {
        let result = sqlx::query("INSERT INTO users (user_name, email) VALUES (?, ?)")
            .bind(&new.user_name)
            .bind(&new.email)
            .execute(&self.pool)
            .await
            .map_err(map_email_conflict)?;

        self.find_by_id(result.last_insert_rowid()).await
    }

    /// List all users
    pub async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query("SELECT id, user_name, email FROM users ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(map_user_row).collect())
    }

    /// Get a user by ID
    pub async fn find_by_id(&self, id: i64) -> Result<User, StoreError> {
        let row = sqlx::query("SELECT id, user_name, email FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(map_user_row).ok_or(StoreError::NotFound {
            entity: "User",
            id,
        })
    }

    /// Update a user; unset fields keep their current value
    pub async fn update(&self, id: i64, update: &UserUpdate) -> Result<User, StoreError> {
        let current = self.find_by_id(id).await?;

        let user_name = update.user_name.clone().unwrap_or(current.user_name);
        let email = update.email.clone().unwrap_or(current.email);

        sqlx::query("UPDATE users SET user_name = ?, email = ? WHERE id = ?")
            .bind(&user_name)
            .bind(&email)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_email_conflict)?;

        self.find_by_id(id).await
    }

    /// Delete a user; the FK cascades to their preferences
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "User",
                id,
            });
        }
        Ok(())
    }

    /// Check whether a user exists
    pub async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

fn map_email_conflict(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict("email");
        }
    }
    StoreError::Database(err)
}

fn map_user_row(row: sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        user_name: row.get("user_name"),
        email: row.get("email"),
    }
}
