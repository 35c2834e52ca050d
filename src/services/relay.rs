use crate::services::provider::{
    MessageProvider, ProviderError, SendReceipt, http_client, read_receipt,
};
use std::time::Duration;

/// Generic bearer-authenticated endpoint taking `{to, message}`, e.g. a
/// send function deployed next to the CRM.
pub struct RelayProvider {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RelayProvider {
    pub fn new(url: String, token: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout)?,
            url,
            token,
        })
    }
}

fn message_id(json: &serde_json::Value) -> Option<String> {
    ["id", "message_id", "idMessage"]
        .iter()
        .find_map(|key| json[*key].as_str())
        .map(ToString::to_string)
}

#[async_trait::async_trait]
impl MessageProvider for RelayProvider {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<SendReceipt, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&serde_json::json!({ "to": chat_id, "message": text }))
            .send()
            .await?;
        read_receipt(response, message_id).await
    }
}
