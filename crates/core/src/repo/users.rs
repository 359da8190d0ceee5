//! User persistence: the query contracts the Credential Issuer (C1) and
//! the friendship surface (C11) call against.

use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult, is_unique_violation};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub hashed_password: String,
}

/// Look up a user by username, for login and duplicate-registration checks.
pub async fn find_by_username(pool: &PgPool, username: &str) -> AppResult<Option<UserRow>> {
    let row = sqlx::query("SELECT user_id, username, hashed_password FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| UserRow {
        user_id: r.get("user_id"),
        username: r.get("username"),
        hashed_password: r.get("hashed_password"),
    }))
}

/// Insert a new user, returning the generated `user_id`.
///
/// Fails with [`AppError::AlreadyExists`] if `username` is already taken.
pub async fn insert_user(pool: &PgPool, username: &str, hashed_password: &str) -> AppResult<i64> {
    let result = sqlx::query(
        "INSERT INTO users (username, hashed_password) VALUES ($1, $2) RETURNING user_id",
    )
    .bind(username)
    .bind(hashed_password)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(row.get("user_id")),
        Err(err) if is_unique_violation(&err, None) => {
            Err(AppError::AlreadyExists(format!("username {username} is taken")))
        }
        Err(err) => Err(err.into()),
    }
}
