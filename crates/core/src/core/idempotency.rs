//! Idempotency Cache (C7): maps `(sender_user_id, sender_device_id,
//! client_msg_id)` to the previously returned `SendMessage` reply for a
//! bounded TTL. Authoritative only for replays of the identical key — it
//! must never cause divergence from the persistent seq allocation, which
//! is why the Writer skips seq reservation entirely on a cache hit rather
//! than reusing this cache to validate an allocated seq.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

const TTL_SECONDS: u64 = 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageReply {
    pub message_id: String,
    pub conversation_id: String,
    pub seq: i64,
    pub server_time: i64,
    pub client_msg_id: String,
}

#[derive(Clone)]
pub struct IdempotencyCache {
    redis: ConnectionManager,
}

impl IdempotencyCache {
    #[must_use]
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(sender_user_id: i64, sender_device_id: i64, client_msg_id: &str) -> String {
        format!("msg:{sender_user_id}:{sender_device_id}:{client_msg_id}")
    }

    /// Look up a cached reply for an identical idempotency key.
    ///
    /// # Errors
    /// Returns an error if the key-value store is unreachable.
    pub async fn get(
        &self,
        sender_user_id: i64,
        sender_device_id: i64,
        client_msg_id: &str,
    ) -> AppResult<Option<SendMessageReply>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn
            .get(Self::key(sender_user_id, sender_device_id, client_msg_id))
            .await?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    /// Cache `reply` for 24 hours under the idempotency key.
    ///
    /// # Errors
    /// Returns an error if the key-value store is unreachable.
    pub async fn put(
        &self,
        sender_user_id: i64,
        sender_device_id: i64,
        client_msg_id: &str,
        reply: &SendMessageReply,
    ) -> AppResult<()> {
        let serialized = serde_json::to_string(reply)?;
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(
            Self::key(sender_user_id, sender_device_id, client_msg_id),
            serialized,
            TTL_SECONDS,
        )
        .await?;
        Ok(())
    }
}
