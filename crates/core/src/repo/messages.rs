//! `MessageIndex` persistence: the relational row C6 step 8c inserts and
//! C10 backfills idempotently.

use sqlx::{Postgres, Transaction};

use crate::error::AppResult;

/// Insert a `message_index` row inside an open transaction.
///
/// Returns `Ok(true)` if this was a genuinely new row, `Ok(false)` if
/// `message_id` already existed (idempotency signal — the caller MUST
/// still commit the transaction's other upserts and must not increment
/// `unread_count` again).
///
/// Uses `ON CONFLICT DO NOTHING` rather than catching a unique-violation
/// error: a bare `INSERT` that errors poisons the rest of the open
/// transaction (Postgres aborts the whole block until `ROLLBACK`), which
/// would take down the conversation/membership upserts this call shares
/// a transaction with. `rows_affected` distinguishes a fresh insert from
/// a no-op conflict without ever raising.
pub async fn insert_message_index(
    tx: &mut Transaction<'_, Postgres>,
    message_id: &str,
    conversation_id: &str,
    sender_id: i64,
    recipient_id: i64,
    message_type: i32,
    seq: i64,
) -> AppResult<bool> {
    let result = sqlx::query(
        "INSERT INTO message_index \
           (message_id, conversation_id, sender_id, recipient_id, message_type, seq, status) \
         VALUES ($1, $2, $3, $4, $5, $6, 2) \
         ON CONFLICT (message_id) DO NOTHING",
    )
    .bind(message_id)
    .bind(conversation_id)
    .bind(sender_id)
    .bind(recipient_id)
    .bind(message_type)
    .bind(seq)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}
