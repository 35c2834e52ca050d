use crate::functions::format::CHAT_ID_SUFFIX;
use crate::services::provider::{
    MessageProvider, ProviderError, SendReceipt, http_client, read_receipt,
};
use std::time::Duration;

pub struct EvolutionProvider {
    client: reqwest::Client,
    api_url: String,
    instance: String,
    api_key: String,
}

impl EvolutionProvider {
    pub fn new(
        api_url: String,
        instance: String,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_url: api_url.trim_end_matches('/').to_string(),
            instance,
            api_key,
        })
    }
}

fn message_id(json: &serde_json::Value) -> Option<String> {
    json["key"]["id"].as_str().map(ToString::to_string)
}

#[async_trait::async_trait]
impl MessageProvider for EvolutionProvider {
    fn name(&self) -> &'static str {
        "evolution"
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<SendReceipt, ProviderError> {
        // evolution addresses recipients by bare number
        let number = chat_id.strip_suffix(CHAT_ID_SUFFIX).unwrap_or(chat_id);
        let response = self
            .client
            .post(format!("{}/message/sendText/{}", self.api_url, self.instance))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "number": number, "text": text }))
            .send()
            .await?;
        read_receipt(response, message_id).await
    }
}
