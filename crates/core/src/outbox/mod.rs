//! Outbox Dispatcher (C8): a long-running polling worker that reads
//! `pending` outbox rows and publishes them to the broker with
//! at-least-once semantics.
//!
//! Single-instance per deployment; horizontal scaling would require a
//! row-level claim (see §4.7), which this implementation does not add —
//! the contract is "each row published at least once", not "published
//! by exactly one dispatcher".

use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::broker::Producer;
use crate::repo::outbox;

const BATCH_SIZE: i64 = 100;
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const EMPTY_BATCH_SLEEP: Duration = Duration::from_millis(500);
const FETCH_ERROR_SLEEP: Duration = Duration::from_secs(2);

/// Run the Dispatcher loop until `shutdown` is cancelled.
pub async fn run(pool: PgPool, producer: Producer, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let batch = match outbox::fetch_pending(&pool, BATCH_SIZE).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "outbox fetch failed");
                sleep_or_cancel(FETCH_ERROR_SLEEP, &shutdown).await;
                continue;
            }
        };

        if batch.is_empty() {
            sleep_or_cancel(EMPTY_BATCH_SLEEP, &shutdown).await;
            continue;
        }

        for row in batch {
            let publish = tokio::time::timeout(
                PUBLISH_TIMEOUT,
                producer.publish(&row.topic, &row.partition_key, &row.payload, PUBLISH_TIMEOUT),
            )
            .await;

            let outcome = match publish {
                Ok(Ok(())) => outbox::mark_sent(&pool, row.id).await,
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, outbox_id = row.id, "outbox publish failed");
                    outbox::mark_failed(&pool, row.id).await
                }
                Err(_) => {
                    tracing::warn!(outbox_id = row.id, "outbox publish timed out");
                    outbox::mark_failed(&pool, row.id).await
                }
            };
            if let Err(err) = outcome {
                tracing::error!(error = %err, outbox_id = row.id, "failed to update outbox row state");
            }
        }
    }
}

async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        () = tokio::time::sleep(duration) => {}
        () = shutdown.cancelled() => {}
    }
}
