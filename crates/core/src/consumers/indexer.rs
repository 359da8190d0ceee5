//! Indexer Consumer (C10): consumes `message.deliver` in consumer group
//! `indexer-backfill` and performs the same relational upserts as the
//! Message Writer's transaction (C6 step 8), using an `ON CONFLICT DO
//! NOTHING` no-op as the idempotency signal. Exists to bring relational
//! state into agreement when the Writer's document write outran its
//! relational transaction, and to rebuild derived state after outages.

use im_protocol::DeliverPayload;
use rdkafka::Message;
use rdkafka::consumer::StreamConsumer;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::repo::{conversations, messages};

pub const GROUP_ID: &str = "indexer-backfill";

/// Run the consumer loop until `shutdown` is cancelled. Poison-pill
/// tolerant, matching C9.
pub async fn run(consumer: StreamConsumer, pool: PgPool, shutdown: CancellationToken) {
    loop {
        let message = tokio::select! {
            result = consumer.recv() => result,
            () = shutdown.cancelled() => break,
        };

        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "indexer consumer read failed");
                continue;
            }
        };

        let Some(bytes) = message.payload() else {
            continue;
        };

        let payload: DeliverPayload = match serde_json::from_slice(bytes) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "dropping undecodable delivery event");
                continue;
            }
        };

        if let Err(err) = backfill(&pool, &payload).await {
            tracing::error!(error = %err, message_id = %payload.message_id, "indexer backfill failed");
        }
    }
}

/// Idempotent backfill of the relational state for one delivery event.
/// Mirrors [`crate::core::writer::Writer::commit_relational_state`]
/// exactly, so a replayed event is a no-op beyond the conversation
/// watermark upsert.
pub async fn backfill(pool: &PgPool, payload: &DeliverPayload) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    conversations::upsert_conversation(
        &mut tx,
        &payload.conversation_id,
        &[payload.sender_id, payload.recipient_id],
        &payload.message_id,
        payload.seq,
    )
    .await?;
    conversations::upsert_user_conversation(&mut tx, payload.sender_id, &payload.conversation_id)
        .await?;
    conversations::upsert_user_conversation(
        &mut tx,
        payload.recipient_id,
        &payload.conversation_id,
    )
    .await?;

    let is_new = messages::insert_message_index(
        &mut tx,
        &payload.message_id,
        &payload.conversation_id,
        payload.sender_id,
        payload.recipient_id,
        payload.message_type,
        payload.seq,
    )
    .await?;

    if is_new {
        conversations::increment_unread(&mut tx, payload.recipient_id, &payload.conversation_id)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}
