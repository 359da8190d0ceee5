//! Sequencer (C5): a per-conversation monotonic counter backed by a
//! key-value store atomic increment. No per-conversation locking at the
//! caller; gaps are permitted because ordering, not contiguity, is the
//! contract consumers rely on.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::AppResult;

#[derive(Clone)]
pub struct Sequencer {
    redis: ConnectionManager,
}

impl Sequencer {
    #[must_use]
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Reserve the next strictly-increasing sequence number for
    /// `conversation_id`.
    ///
    /// # Errors
    /// Returns an error if the key-value store is unreachable.
    pub async fn next(&self, conversation_id: &str) -> AppResult<i64> {
        let key = format!("conv_seq:{conversation_id}");
        let mut conn = self.redis.clone();
        let seq: i64 = conn.incr(key, 1).await?;
        Ok(seq)
    }
}
