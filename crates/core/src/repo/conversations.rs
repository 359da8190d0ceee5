//! Conversation and membership upserts (C6 step 8a/b, and the Indexer's
//! identical backfill path in C10).

use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::AppResult;

/// Upsert the conversation row with the given participants and the
/// latest `(message_id, seq)` watermark.
pub async fn upsert_conversation(
    tx: &mut Transaction<'_, Postgres>,
    conversation_id: &str,
    participants: &[i64],
    last_message_id: &str,
    last_seq: i64,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO conversations (conversation_id, participants, last_message_id, last_seq) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (conversation_id) DO UPDATE SET \
           last_message_id = EXCLUDED.last_message_id, \
           last_seq = EXCLUDED.last_seq, \
           updated_at = now() \
         WHERE conversations.last_seq < EXCLUDED.last_seq",
    )
    .bind(conversation_id)
    .bind(participants)
    .bind(last_message_id)
    .bind(last_seq)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Ensure a `(user_id, conversation_id)` membership row exists. Does not
/// touch `unread_count` if the row already exists.
pub async fn upsert_user_conversation(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    conversation_id: &str,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO user_conversations (user_id, conversation_id) VALUES ($1, $2) \
         ON CONFLICT (user_id, conversation_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(conversation_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Increment `unread_count` for a recipient's membership row. Called only
/// when the paired `MessageIndex` insert was a genuinely new row.
pub async fn increment_unread(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    conversation_id: &str,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE user_conversations SET unread_count = unread_count + 1, updated_at = now() \
         WHERE user_id = $1 AND conversation_id = $2",
    )
    .bind(user_id)
    .bind(conversation_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Current `unread_count` for a `(user_id, conversation_id)` membership
/// row, or 0 if the membership doesn't exist yet.
pub async fn unread_count(pool: &PgPool, user_id: i64, conversation_id: &str) -> AppResult<i64> {
    let row = sqlx::query(
        "SELECT unread_count FROM user_conversations WHERE user_id = $1 AND conversation_id = $2",
    )
    .bind(user_id)
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.get("unread_count")).unwrap_or(0))
}
