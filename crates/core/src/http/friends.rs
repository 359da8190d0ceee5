//! Friendship Surface (C11): the CRUD surface gating C6 step 2 and
//! exposing the friend graph to clients.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::http::auth::AuthUser;
use crate::repo::friends;
use crate::state::AppState;

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SendFriendRequestBody {
    pub recipient_id: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendFriendRequestResponse {
    pub request_id: i64,
}

pub async fn send_friend_request(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Json(body): Json<SendFriendRequestBody>,
) -> AppResult<Json<SendFriendRequestResponse>> {
    let request_id = friends::create_friend_request(
        &state.pool,
        identity.user_id,
        body.recipient_id,
        &body.message,
    )
    .await?;
    Ok(Json(SendFriendRequestResponse { request_id }))
}

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<i16>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct FriendRequestDto {
    pub id: i64,
    pub requester_id: i64,
    pub recipient_id: i64,
    pub status: i16,
    pub message: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct FriendRequestListResponse {
    pub requests: Vec<FriendRequestDto>,
    pub total: i64,
}

impl From<friends::FriendRequestRow> for FriendRequestDto {
    fn from(row: friends::FriendRequestRow) -> Self {
        Self {
            id: row.id,
            requester_id: row.requester_id,
            recipient_id: row.recipient_id,
            status: row.status,
            message: row.message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn get_received_friend_requests(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListRequestsQuery>,
) -> AppResult<Json<FriendRequestListResponse>> {
    let (rows, total) = friends::get_received_friend_requests(
        &state.pool,
        identity.user_id,
        query.status,
        query.page,
        query.page_size,
    )
    .await?;
    Ok(Json(FriendRequestListResponse {
        requests: rows.into_iter().map(Into::into).collect(),
        total,
    }))
}

pub async fn get_sent_friend_requests(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListRequestsQuery>,
) -> AppResult<Json<FriendRequestListResponse>> {
    let (rows, total) = friends::get_sent_friend_requests(
        &state.pool,
        identity.user_id,
        query.status,
        query.page,
        query.page_size,
    )
    .await?;
    Ok(Json(FriendRequestListResponse {
        requests: rows.into_iter().map(Into::into).collect(),
        total,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HandleFriendRequestBody {
    pub action: i16,
}

#[derive(Debug, Serialize)]
pub struct HandleFriendRequestResponse {
    pub message: String,
}

pub async fn handle_friend_request(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<i64>,
    Json(body): Json<HandleFriendRequestBody>,
) -> AppResult<Json<HandleFriendRequestResponse>> {
    let request = friends::get_friend_request(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("friend request {id}")))?;

    if request.recipient_id != identity.user_id {
        return Err(AppError::PermissionDenied(
            "only the recipient may act on this request".into(),
        ));
    }
    if request.status != 0 {
        return Err(AppError::FailedPrecondition(
            "friend request has already been processed".into(),
        ));
    }

    let message = match body.action {
        1 => {
            friends::accept_friend_request(&state.pool, &request).await?;
            "accepted"
        }
        2 => {
            friends::reject_friend_request(&state.pool, id).await?;
            "rejected"
        }
        3 => {
            friends::ignore_friend_request(&state.pool, id).await?;
            "ignored"
        }
        other => {
            return Err(AppError::InvalidArgument(format!(
                "unknown action {other}"
            )));
        }
    };

    Ok(Json(HandleFriendRequestResponse {
        message: message.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct FriendListQuery {
    pub category_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FriendDto {
    pub user_id: i64,
    pub friend_id: i64,
    pub remark: String,
    pub category_id: i64,
    pub is_blocked: bool,
}

impl From<friends::FriendRow> for FriendDto {
    fn from(row: friends::FriendRow) -> Self {
        Self {
            user_id: row.user_id,
            friend_id: row.friend_id,
            remark: row.remark,
            category_id: row.category_id,
            is_blocked: row.is_blocked,
        }
    }
}

pub async fn get_friend_list(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<FriendListQuery>,
) -> AppResult<Json<Vec<FriendDto>>> {
    let rows = friends::get_friend_list(&state.pool, identity.user_id, query.category_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
