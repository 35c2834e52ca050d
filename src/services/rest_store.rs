use crate::schema::ScheduledMessage;
use crate::services::store::{MessageStore, MessageUpdate, StoreError};
use uuid::Uuid;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);
const CLAIM_RPC: &str = "claim_due_scheduled_messages";
const TABLE: &str = "scheduled_messages";

/// Backing store reached through the Supabase PostgREST API with a service
/// role key.
pub struct RestMessageStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RestMessageStore {
    pub fn new(base_url: String, service_key: String) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Status { status, body });
    }
    Ok(response)
}

fn update_body(update: &MessageUpdate) -> serde_json::Value {
    match update {
        MessageUpdate::Sent {
            provider_message_id,
            sent_at,
        } => serde_json::json!({
            "status": "sent",
            "sent_at": sent_at,
            "provider_message_id": provider_message_id,
            "last_error": null,
        }),
        MessageUpdate::Attempted {
            status,
            attempts,
            last_error,
        } => serde_json::json!({
            "status": status,
            "attempts": attempts,
            "last_error": last_error,
        }),
    }
}

#[async_trait::async_trait]
impl MessageStore for RestMessageStore {
    async fn claim_due(&self, max_batch: i64) -> Result<Vec<ScheduledMessage>, StoreError> {
        let url = format!("{}/rest/v1/rpc/{CLAIM_RPC}", self.base_url);
        let response = self
            .authorized(self.client.post(url))
            .json(&serde_json::json!({ "p_limit": max_batch }))
            .send()
            .await?;
        let body = ensure_success(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn update(&self, id: Uuid, update: &MessageUpdate) -> Result<(), StoreError> {
        let url = format!("{}/rest/v1/{TABLE}", self.base_url);
        let response = self
            .authorized(self.client.patch(url))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(&update_body(update))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
