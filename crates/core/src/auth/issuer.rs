//! Credential Issuer (C1): username/password registration and login.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::Argon2;
use sqlx::PgPool;

use crate::auth::bearer;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::repo::users;

pub struct LoginReply {
    pub user_id: i64,
    pub token: String,
    pub expires_at: i64,
}

/// `Register(username, password) -> user_id`.
///
/// Fails with [`AppError::AlreadyExists`] if the username is taken.
pub async fn register(pool: &PgPool, username: &str, password: &str) -> AppResult<i64> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(AppError::InvalidArgument(
            "username and password must not be empty".into(),
        ));
    }
    let hashed = hash_password(password)?;
    users::insert_user(pool, username, &hashed).await
}

/// `Login(username, password, device_id) -> (user_id, token, expires_at)`.
///
/// Fails with [`AppError::Unauthenticated`] on unknown user or a password
/// mismatch.
pub async fn login(
    pool: &PgPool,
    config: &Config,
    username: &str,
    password: &str,
    device_id: i64,
) -> AppResult<LoginReply> {
    let user = users::find_by_username(pool, username)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    if !verify_password(password, &user.hashed_password) {
        return Err(AppError::Unauthenticated);
    }

    let (token, expires_at) = bearer::issue(config, user.user_id, device_id)?;
    Ok(LoginReply {
        user_id: user.user_id,
        token,
        expires_at,
    })
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hashed: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hashed) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trips_through_hash_and_verify() {
        let hashed = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hashed));
        assert!(!verify_password("wrong password", &hashed));
    }
}
