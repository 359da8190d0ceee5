//! Process configuration, loaded once at startup from the environment and
//! threaded explicitly through [`crate::state::AppState`] rather than kept
//! behind a process-wide singleton.

use std::env;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub mongo_url: String,
    pub mongo_database: String,
    pub redis_url: String,
    pub kafka_brokers: String,
    pub kafka_topic_prefix: String,
    pub bearer_secret: String,
    pub bearer_issuer: String,
    pub bearer_audience: String,
    pub bearer_ttl_seconds: i64,
    pub log_level: String,
    /// Opt-in: also fan out delivery events to the sender's other online
    /// devices (derivable multi-device sync, not wired end to end in the
    /// source this was distilled from).
    pub sync_sender_devices: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] if a required variable is missing or
    /// a numeric/boolean variable cannot be parsed.
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            database_url: required_env("DATABASE_URL")?,
            mongo_url: env_or("MONGO_URL", "mongodb://localhost:27017"),
            mongo_database: env_or("MONGO_DATABASE", "im"),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            kafka_brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
            kafka_topic_prefix: env_or("KAFKA_TOPIC_PREFIX", ""),
            bearer_secret: required_env("BEARER_SECRET")?,
            bearer_issuer: env_or("BEARER_ISSUER", "im-core"),
            bearer_audience: env_or("BEARER_AUDIENCE", "im-clients"),
            bearer_ttl_seconds: parse_env("BEARER_TTL_SECONDS", 24 * 3600)?,
            log_level: env_or("LOG_LEVEL", "info"),
            sync_sender_devices: parse_bool_env("SYNC_SENDER_DEVICES", false)?,
        })
    }

    /// The effective broker topic name, honoring the configured prefix.
    #[must_use]
    pub fn topic(&self, name: &str) -> String {
        if self.kafka_topic_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{name}", self.kafka_topic_prefix)
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required_env(key: &str) -> AppResult<String> {
    env::var(key).map_err(|_| AppError::Internal(format!("missing required env var {key}")))
}

fn parse_env(key: &str, default: i64) -> AppResult<i64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Internal(format!("invalid integer for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Internal(format!("invalid bool for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}
