//! `/v1/auth/*` handlers and the bearer-identity extractor shared by every
//! other authenticated route.

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::header::AUTHORIZATION;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::bearer::{self, Identity};
use crate::auth::issuer;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Extracts and verifies the bearer on any handler that takes it as an
/// argument; rejects with [`AppError::Unauthenticated`] on a missing or
/// invalid token before the handler body runs.
pub struct AuthUser(pub Identity);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer::extract_bearer)
            .ok_or(AppError::Unauthenticated)?;
        let identity = bearer::verify(&state.config, token)?;
        Ok(AuthUser(identity))
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<RegisterResponse>> {
    let user_id = issuer::register(&state.pool, &body.username, &body.password).await?;
    Ok(Json(RegisterResponse { user_id }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_id: i64,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub token: String,
    pub expires_at: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let reply = issuer::login(
        &state.pool,
        &state.config,
        &body.username,
        &body.password,
        body.device_id,
    )
    .await?;
    Ok(Json(LoginResponse {
        user_id: reply.user_id,
        token: reply.token,
        expires_at: reply.expires_at,
    }))
}
