use crate::config::StoreConfig;
use crate::schema::{MessageStatus, ScheduledMessage};
use crate::services::{PgMessageStore, RestMessageStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid store response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The fields a dispatch attempt writes back to a claimed row.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageUpdate {
    /// Also sets `status = 'sent'` and clears `last_error`.
    Sent {
        provider_message_id: Option<String>,
        sent_at: DateTime<Utc>,
    },
    Attempted {
        status: MessageStatus,
        attempts: i32,
        last_error: String,
    },
}

#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Atomically claims up to `max_batch` due rows. No concurrent caller can
    /// receive the same row.
    async fn claim_due(&self, max_batch: i64) -> Result<Vec<ScheduledMessage>, StoreError>;
    async fn update(&self, id: Uuid, update: &MessageUpdate) -> Result<(), StoreError>;
}

pub async fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn MessageStore>> {
    match config {
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PgMessageStore::connect(database_url, *max_connections).await?;
            tracing::info!(max_connections, "store: connected to postgres");
            Ok(Arc::new(store))
        }
        StoreConfig::Rest { url, service_key } => {
            tracing::info!(url = %url, "store: using supabase rest");
            Ok(Arc::new(RestMessageStore::new(url.clone(), service_key.clone())?))
        }
    }
}
