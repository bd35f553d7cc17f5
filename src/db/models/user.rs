//! User model (credential store).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::DbPool;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

impl User {
    pub async fn find_by_username(pool: &DbPool, username: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as("SELECT id, username, password_hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// Insert a new user. Fails with a unique violation if the username is taken.
    pub async fn create(pool: &DbPool, username: &str, password_hash: &str) -> sqlx::Result<User> {
        sqlx::query_as(
            "INSERT INTO users (username, password_hash) VALUES (?, ?) \
             RETURNING id, username, password_hash",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(pool)
        .await
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub status: &'static str,
}

impl LoginResponse {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}
