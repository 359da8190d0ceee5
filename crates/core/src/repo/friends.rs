//! Friendship graph persistence: the precondition table C6 step 2 reads,
//! and the CRUD surface C11 exposes.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult, is_unique_violation};

#[derive(Debug, Clone)]
pub struct FriendRequestRow {
    pub id: i64,
    pub requester_id: i64,
    pub recipient_id: i64,
    pub status: i16,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FriendRow {
    pub user_id: i64,
    pub friend_id: i64,
    pub remark: String,
    pub category_id: i64,
    pub is_blocked: bool,
}

/// Send-message precondition: does a friendship row exist from `from` to
/// `to`? (Directional; acceptance always creates both directions, so a
/// healthy pair satisfies this both ways.)
pub async fn check_friendship(pool: &PgPool, from: i64, to: i64) -> AppResult<bool> {
    let row = sqlx::query("SELECT 1 FROM friends WHERE user_id = $1 AND friend_id = $2")
        .bind(from)
        .bind(to)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

async fn has_pending_request(pool: &PgPool, requester_id: i64, recipient_id: i64) -> AppResult<bool> {
    let row = sqlx::query(
        "SELECT 1 FROM friend_requests \
         WHERE ((requester_id = $1 AND recipient_id = $2) OR (requester_id = $2 AND recipient_id = $1)) \
           AND status = 0",
    )
    .bind(requester_id)
    .bind(recipient_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// `SendFriendRequest(requester_id, recipient_id, message) -> request_id`.
pub async fn create_friend_request(
    pool: &PgPool,
    requester_id: i64,
    recipient_id: i64,
    message: &str,
) -> AppResult<i64> {
    if requester_id == recipient_id {
        return Err(AppError::InvalidArgument(
            "cannot send a friend request to yourself".into(),
        ));
    }
    if check_friendship(pool, requester_id, recipient_id).await? {
        return Err(AppError::AlreadyExists("already friends".into()));
    }
    if has_pending_request(pool, requester_id, recipient_id).await? {
        return Err(AppError::AlreadyExists(
            "a pending friend request already exists between these users".into(),
        ));
    }

    let result = sqlx::query(
        "INSERT INTO friend_requests (requester_id, recipient_id, message) \
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(requester_id)
    .bind(recipient_id)
    .bind(message)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(row.get("id")),
        Err(err) if is_unique_violation(&err, None) => {
            Err(AppError::AlreadyExists("a friend request already exists".into()))
        }
        Err(err) => Err(err.into()),
    }
}

fn row_to_request(row: sqlx::postgres::PgRow) -> FriendRequestRow {
    FriendRequestRow {
        id: row.get("id"),
        requester_id: row.get("requester_id"),
        recipient_id: row.get("recipient_id"),
        status: row.get("status"),
        message: row.get("message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// `GetReceivedFriendRequests(user_id, status?, page, page_size)`.
pub async fn get_received_friend_requests(
    pool: &PgPool,
    user_id: i64,
    status: Option<i16>,
    page: i64,
    page_size: i64,
) -> AppResult<(Vec<FriendRequestRow>, i64)> {
    let offset = (page.max(1) - 1) * page_size.max(1);
    let rows = sqlx::query(
        "SELECT id, requester_id, recipient_id, status, message, created_at, updated_at \
         FROM friend_requests WHERE recipient_id = $1 AND status = $2 \
         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
    )
    .bind(user_id)
    .bind(status.unwrap_or(0))
    .bind(page_size.max(1))
    .bind(offset)
    .fetch_all(pool)
    .await?;
    let total: i64 = sqlx::query(
        "SELECT count(*) AS count FROM friend_requests WHERE recipient_id = $1 AND status = $2",
    )
    .bind(user_id)
    .bind(status.unwrap_or(0))
    .fetch_one(pool)
    .await?
    .get("count");
    Ok((rows.into_iter().map(row_to_request).collect(), total))
}

/// `GetSentFriendRequests(user_id, status?, page, page_size)`.
pub async fn get_sent_friend_requests(
    pool: &PgPool,
    user_id: i64,
    status: Option<i16>,
    page: i64,
    page_size: i64,
) -> AppResult<(Vec<FriendRequestRow>, i64)> {
    let offset = (page.max(1) - 1) * page_size.max(1);
    let rows = sqlx::query(
        "SELECT id, requester_id, recipient_id, status, message, created_at, updated_at \
         FROM friend_requests WHERE requester_id = $1 AND status = $2 \
         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
    )
    .bind(user_id)
    .bind(status.unwrap_or(0))
    .bind(page_size.max(1))
    .bind(offset)
    .fetch_all(pool)
    .await?;
    let total: i64 = sqlx::query(
        "SELECT count(*) AS count FROM friend_requests WHERE requester_id = $1 AND status = $2",
    )
    .bind(user_id)
    .bind(status.unwrap_or(0))
    .fetch_one(pool)
    .await?
    .get("count");
    Ok((rows.into_iter().map(row_to_request).collect(), total))
}

pub async fn get_friend_request(pool: &PgPool, id: i64) -> AppResult<Option<FriendRequestRow>> {
    let row = sqlx::query(
        "SELECT id, requester_id, recipient_id, status, message, created_at, updated_at \
         FROM friend_requests WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(row_to_request))
}

/// `HandleFriendRequest(request_id, action)`. Caller has already verified
/// `request_id` exists, the caller is the recipient, and the request is
/// still `pending` — see `http::friend::handle_friend_request`.
pub async fn accept_friend_request(
    pool: &PgPool,
    request: &FriendRequestRow,
) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE friend_requests SET status = 1, updated_at = now() WHERE id = $1")
        .bind(request.id)
        .execute(&mut *tx)
        .await?;

    for (user_id, friend_id) in [
        (request.recipient_id, request.requester_id),
        (request.requester_id, request.recipient_id),
    ] {
        sqlx::query(
            "INSERT INTO friends (user_id, friend_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, friend_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(friend_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn reject_friend_request(pool: &PgPool, id: i64) -> AppResult<()> {
    sqlx::query("UPDATE friend_requests SET status = 2, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn ignore_friend_request(pool: &PgPool, id: i64) -> AppResult<()> {
    sqlx::query("UPDATE friend_requests SET status = 3, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// `GetFriendList(user_id, category_id?)`.
pub async fn get_friend_list(
    pool: &PgPool,
    user_id: i64,
    category_id: Option<i64>,
) -> AppResult<Vec<FriendRow>> {
    let rows = match category_id {
        Some(category_id) => {
            sqlx::query(
                "SELECT user_id, friend_id, remark, category_id, is_blocked \
                 FROM friends WHERE user_id = $1 AND category_id = $2 ORDER BY friend_id",
            )
            .bind(user_id)
            .bind(category_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT user_id, friend_id, remark, category_id, is_blocked \
                 FROM friends WHERE user_id = $1 ORDER BY friend_id",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows
        .into_iter()
        .map(|r| FriendRow {
            user_id: r.get("user_id"),
            friend_id: r.get("friend_id"),
            remark: r.get("remark"),
            category_id: r.get("category_id"),
            is_blocked: r.get("is_blocked"),
        })
        .collect())
}
