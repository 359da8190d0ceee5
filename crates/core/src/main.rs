//! Service Runtime (C12): process entry point. Loads configuration, brings
//! up every backing store and the broker producer, resets stale device
//! state left over from an unclean prior shutdown, spawns the background
//! tasks, and serves HTTP/WS until signaled to shut down.

use std::sync::Arc;

use im_core::broker::Producer;
use im_core::config::Config;
use im_core::documents::DocumentStore;
use im_core::repo::devices;
use im_core::{broker, consumers, db, http, outbox, state::AppState};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_level.clone()))
        .init();

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let documents = DocumentStore::connect(&config.mongo_url, &config.mongo_database).await?;

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;

    let producer = Producer::new(&config.kafka_brokers, &config.kafka_topic_prefix).ok();
    if producer.is_none() {
        tracing::warn!("broker producer unavailable at startup; outbox dispatcher will retry connectivity");
    }

    let reset = devices::reset_all_offline(&pool).await?;
    if reset > 0 {
        tracing::info!(rows = reset, "cleared stale online state from a previous process");
    }

    let config = Arc::new(config);
    let state = AppState::new(
        Arc::clone(&config),
        pool.clone(),
        documents,
        redis,
        producer.clone(),
    );

    let shutdown = CancellationToken::new();

    let mut background = Vec::new();
    if let Some(producer) = producer {
        let pool = pool.clone();
        let token = shutdown.clone();
        background.push(tokio::spawn(async move {
            outbox::run(pool, producer, token).await;
        }));

        let delivery_consumer = broker::consumer(
            &config.kafka_brokers,
            consumers::delivery::GROUP_ID,
            &[&config.topic("message.deliver")],
        )?;
        let registry = state.registry.clone();
        let sync_sender_devices = config.sync_sender_devices;
        let token = shutdown.clone();
        background.push(tokio::spawn(async move {
            consumers::delivery::run(delivery_consumer, registry, sync_sender_devices, token).await;
        }));

        let indexer_consumer = broker::consumer(
            &config.kafka_brokers,
            consumers::indexer::GROUP_ID,
            &[&config.topic("message.deliver")],
        )?;
        let pool = pool.clone();
        let token = shutdown.clone();
        background.push(tokio::spawn(async move {
            consumers::indexer::run(indexer_consumer, pool, token).await;
        }));
    } else {
        tracing::warn!("broker unavailable; outbox dispatcher and consumers are not running");
    }

    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "im-core listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    for task in background {
        let _ = task.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
