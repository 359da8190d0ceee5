//! Top-level service struct. Every component is an explicit collaborator
//! injected here rather than a process-wide singleton (§9 "Global
//! configuration and clients"); `AppState` is cloned per request/task and
//! every field is cheap to clone (pooled handles, `Arc`s, or connection
//! managers).

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use crate::broker::Producer;
use crate::config::Config;
use crate::core::idempotency::IdempotencyCache;
use crate::core::sequencer::Sequencer;
use crate::core::writer::Writer;
use crate::documents::DocumentStore;
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub documents: DocumentStore,
    pub sequencer: Sequencer,
    pub idempotency: IdempotencyCache,
    pub producer: Option<Producer>,
    pub registry: ConnectionRegistry,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        pool: PgPool,
        documents: DocumentStore,
        redis: ConnectionManager,
        producer: Option<Producer>,
    ) -> Self {
        Self {
            config,
            pool,
            documents,
            sequencer: Sequencer::new(redis.clone()),
            idempotency: IdempotencyCache::new(redis),
            producer,
            registry: ConnectionRegistry::new(),
        }
    }

    /// Build a [`Writer`] for one `SendMessage` call. Cheap: every field
    /// it captures is itself a cloned handle (pool, Mongo collection,
    /// Redis connection manager, Kafka producer).
    #[must_use]
    pub fn writer(&self) -> Writer {
        Writer::new(
            self.pool.clone(),
            self.documents.clone(),
            self.sequencer.clone(),
            self.idempotency.clone(),
            self.producer.clone(),
        )
    }
}
