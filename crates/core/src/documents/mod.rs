//! Document store: the exclusive owner of `MessageBody`. A message's
//! payload is immutable once written; the unique index on `message_id`
//! turns a duplicate insert into the idempotent-replay signal C6 relies
//! on.

use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

const COLLECTION: &str = "messages";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: i64,
    pub recipient_id: i64,
    #[serde(rename = "type")]
    pub message_type: i32,
    pub body: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DocumentStore {
    collection: Collection<MessageBody>,
}

impl DocumentStore {
    /// Connect to the document store and ensure its indexes exist. Safe
    /// to call on every process boot.
    ///
    /// # Errors
    /// Returns [`crate::error::AppError::Internal`] if the client cannot
    /// connect or the indexes cannot be created.
    pub async fn connect(mongo_url: &str, database_name: &str) -> AppResult<Self> {
        let client = Client::with_uri_str(mongo_url).await?;
        let database: Database = client.database(database_name);
        let collection: Collection<MessageBody> = database.collection(COLLECTION);
        ensure_indexes(&collection).await?;
        Ok(Self { collection })
    }

    /// Insert a message body. Returns `Ok(true)` on a fresh insert,
    /// `Ok(false)` if `message_id` already exists (idempotent replay —
    /// not an error).
    pub async fn insert(&self, body: &MessageBody) -> AppResult<bool> {
        match self.collection.insert_one(body).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch a previously stored message body by id, used when a send
    /// request replays against an already-written document.
    pub async fn find_by_message_id(&self, message_id: &str) -> AppResult<Option<MessageBody>> {
        let result = self
            .collection
            .find_one(doc! { "message_id": message_id })
            .await?;
        Ok(result)
    }
}

async fn ensure_indexes(collection: &Collection<MessageBody>) -> AppResult<()> {
    let unique_message_id = IndexModel::builder()
        .keys(doc! { "message_id": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    let conversation_recency = IndexModel::builder()
        .keys(doc! { "conversation_id": 1, "created_at": -1 })
        .build();
    collection.create_index(unique_message_id).await?;
    collection.create_index(conversation_recency).await?;
    Ok(())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::ErrorKind;
    matches!(err.kind.as_ref(), ErrorKind::Write(write_failure) if write_failure_is_duplicate(write_failure))
}

fn write_failure_is_duplicate(failure: &mongodb::error::WriteFailure) -> bool {
    match failure {
        mongodb::error::WriteFailure::WriteError(write_error) => write_error.code == 11000,
        _ => false,
    }
}
