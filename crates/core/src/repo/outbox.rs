//! Outbox persistence (C6 step 7/8d, C8): the durable queue co-located
//! with the relational store that decouples commit from broker
//! publication.

use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: i64,
    pub topic: String,
    pub partition_key: String,
    pub payload: Vec<u8>,
}

/// Append an outbox row inside an open relational transaction (C6 step
/// 8d, the inside-the-transaction write the Dispatcher relies on).
///
/// `partition_key` is the broker partition key the Dispatcher will
/// publish with; callers pass `conversation_id` so ordering survives
/// the relay through this table (see §5 on keying).
pub async fn append_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    topic: &str,
    partition_key: &str,
    payload: &[u8],
) -> AppResult<()> {
    sqlx::query("INSERT INTO outbox_events (topic, partition_key, payload) VALUES ($1, $2, $3)")
        .bind(topic)
        .bind(partition_key)
        .bind(payload)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Append an outbox row outside any transaction (C6 step 7, the
/// belt-and-suspenders best-effort write; see design notes on why both
/// paths are kept).
///
/// # Errors
/// Returns an error if the pool is unreachable; callers treat this as
/// non-fatal and log rather than abort the request.
pub async fn append_standalone(
    pool: &PgPool,
    topic: &str,
    partition_key: &str,
    payload: &[u8],
) -> AppResult<()> {
    sqlx::query("INSERT INTO outbox_events (topic, partition_key, payload) VALUES ($1, $2, $3)")
        .bind(topic)
        .bind(partition_key)
        .bind(payload)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetch up to `limit` `pending` rows ordered by `id`, for the Dispatcher's
/// poll tick.
pub async fn fetch_pending(pool: &PgPool, limit: i64) -> AppResult<Vec<OutboxRow>> {
    let rows = sqlx::query(
        "SELECT id, topic, partition_key, payload FROM outbox_events WHERE state = 'pending' \
         ORDER BY id LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| OutboxRow {
            id: r.get("id"),
            topic: r.get("topic"),
            partition_key: r.get("partition_key"),
            payload: r.get("payload"),
        })
        .collect())
}

pub async fn mark_sent(pool: &PgPool, id: i64) -> AppResult<()> {
    sqlx::query("UPDATE outbox_events SET state = 'sent', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, id: i64) -> AppResult<()> {
    sqlx::query("UPDATE outbox_events SET state = 'failed', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_row_carries_raw_payload_bytes() {
        let row = OutboxRow {
            id: 1,
            topic: "message.deliver".into(),
            partition_key: "p_1_2".into(),
            payload: b"{}".to_vec(),
        };
        assert_eq!(row.payload, b"{}");
    }
}
