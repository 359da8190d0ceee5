//! Message Writer (C6): the send-message algorithm that crosses the
//! document-store/relational-store dual-write boundary and appends the
//! outbox event the Dispatcher (C8) will publish.

use std::time::{SystemTime, UNIX_EPOCH};

use im_protocol::{DeliverPayload, MessageContent};
use sqlx::PgPool;

use crate::broker::Producer;
use crate::core::idempotency::{IdempotencyCache, SendMessageReply};
use crate::core::sequencer::Sequencer;
use crate::documents::{DocumentStore, MessageBody};
use crate::error::{AppError, AppResult};
use crate::repo::{conversations, friends, messages, outbox};

const DELIVER_TOPIC: &str = "message.deliver";
const DIRECT_PUBLISH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub struct SendMessageRequest {
    pub recipient_id: i64,
    pub content: MessageContent,
    pub client_msg_id: String,
}

pub struct Writer {
    pool: PgPool,
    documents: DocumentStore,
    sequencer: Sequencer,
    idempotency: IdempotencyCache,
    producer: Option<Producer>,
}

impl Writer {
    #[must_use]
    pub fn new(
        pool: PgPool,
        documents: DocumentStore,
        sequencer: Sequencer,
        idempotency: IdempotencyCache,
        producer: Option<Producer>,
    ) -> Self {
        Self {
            pool,
            documents,
            sequencer,
            idempotency,
            producer,
        }
    }

    /// `SendMessage(sender_user_id, sender_device_id, request) -> reply`.
    ///
    /// Implements C6 steps 1-10; see the module docs for the full
    /// algorithm. Short version: idempotency short-circuit, friendship
    /// gate, seq reservation, document insert, relational transaction
    /// (conversation/membership/index/unread), best-effort direct
    /// publish, reply cached for replay.
    pub async fn send_message(
        &self,
        sender_user_id: i64,
        sender_device_id: i64,
        request: SendMessageRequest,
    ) -> AppResult<SendMessageReply> {
        if request.client_msg_id.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "client_msg_id must not be empty".into(),
            ));
        }

        if let Some(cached) = self
            .idempotency
            .get(sender_user_id, sender_device_id, &request.client_msg_id)
            .await?
        {
            return Ok(cached);
        }

        if !friends::check_friendship(&self.pool, sender_user_id, request.recipient_id).await? {
            return Err(AppError::PermissionDenied(
                "sender and recipient are not friends".into(),
            ));
        }

        let conversation_id = peer_conversation_id(sender_user_id, request.recipient_id);
        let seq = self.sequencer.next(&conversation_id).await?;
        let message_type = request.content.type_tag();
        let now = now_utc();
        let message_id = format!("{}-{}", now.timestamp_nanos_opt().unwrap_or_default(), seq);

        let body = MessageBody {
            message_id: message_id.clone(),
            conversation_id: conversation_id.clone(),
            sender_id: sender_user_id,
            recipient_id: request.recipient_id,
            message_type,
            body: request.content.to_body_bytes(),
            created_at: now,
        };
        // A duplicate `message_id` here would mean a fresh seq collided
        // with an existing document, which is only possible if a prior
        // attempt for this exact (timestamp, seq) pair got as far as the
        // document write and then crashed before reaching the cache put;
        // fall back to the stored body so the rest of the pipeline is
        // consistent with what was actually persisted.
        let body = if self.documents.insert(&body).await? {
            body
        } else {
            self.documents
                .find_by_message_id(&body.message_id)
                .await?
                .unwrap_or(body)
        };

        let payload = DeliverPayload {
            message_id: message_id.clone(),
            conversation_id: conversation_id.clone(),
            seq,
            sender_id: sender_user_id,
            recipient_id: request.recipient_id,
            message_type,
        };
        let payload_bytes = serde_json::to_vec(&payload)?;

        // Best-effort standalone outbox append (step 7); failure here is
        // logged but never aborts the request, because the relational
        // transaction below writes the same event again. See DESIGN.md
        // for why the redundancy is kept rather than collapsed.
        if let Err(err) = outbox::append_standalone(
            &self.pool,
            DELIVER_TOPIC,
            &conversation_id,
            &payload_bytes,
        )
        .await
        {
            tracing::warn!(error = %err, %message_id, "standalone outbox append failed");
        }

        self.commit_relational_state(&conversation_id, sender_user_id, &body, seq, &payload_bytes)
            .await?;

        // Best-effort direct publish (step 9); the Outbox Dispatcher
        // guarantees eventual delivery if this fails or the broker is
        // unreachable.
        if let Some(producer) = &self.producer {
            if let Err(err) = producer
                .publish(
                    DELIVER_TOPIC,
                    &conversation_id,
                    &payload_bytes,
                    DIRECT_PUBLISH_TIMEOUT,
                )
                .await
            {
                tracing::warn!(error = %err, %message_id, "direct publish failed, outbox will retry");
            }
        }

        let reply = SendMessageReply {
            message_id,
            conversation_id,
            seq,
            server_time: now.timestamp(),
            client_msg_id: request.client_msg_id.clone(),
        };
        self.idempotency
            .put(
                sender_user_id,
                sender_device_id,
                &request.client_msg_id,
                &reply,
            )
            .await?;

        Ok(reply)
    }

    /// C6 step 8: conversation upsert, membership upserts, message-index
    /// insert, and the conditional unread increment, all in one
    /// transaction. Returns whether the index insert was a fresh row.
    async fn commit_relational_state(
        &self,
        conversation_id: &str,
        sender_user_id: i64,
        body: &MessageBody,
        seq: i64,
        outbox_payload: &[u8],
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        conversations::upsert_conversation(
            &mut tx,
            conversation_id,
            &[sender_user_id, body.recipient_id],
            &body.message_id,
            seq,
        )
        .await?;
        conversations::upsert_user_conversation(&mut tx, sender_user_id, conversation_id).await?;
        conversations::upsert_user_conversation(&mut tx, body.recipient_id, conversation_id)
            .await?;

        let is_new = messages::insert_message_index(
            &mut tx,
            &body.message_id,
            conversation_id,
            sender_user_id,
            body.recipient_id,
            body.message_type,
            seq,
        )
        .await?;

        if is_new {
            conversations::increment_unread(&mut tx, body.recipient_id, conversation_id).await?;
        }

        outbox::append_in_tx(&mut tx, DELIVER_TOPIC, conversation_id, outbox_payload).await?;

        tx.commit().await?;
        Ok(is_new)
    }
}

/// The P2P conversation-id rule: `p_<min(a,b)>_<max(a,b)>`.
#[must_use]
pub fn peer_conversation_id(a: i64, b: i64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("p_{lo}_{hi}")
}

fn now_utc() -> chrono::DateTime<chrono::Utc> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    chrono::DateTime::from_timestamp(nanos / 1_000_000_000, (nanos % 1_000_000_000) as u32)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_conversation_id_is_order_independent() {
        assert_eq!(peer_conversation_id(1, 2), "p_1_2");
        assert_eq!(peer_conversation_id(2, 1), "p_1_2");
        assert_eq!(peer_conversation_id(5, 5), "p_5_5");
    }
}
