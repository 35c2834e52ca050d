use crate::services::provider::{
    MessageProvider, ProviderError, SendReceipt, http_client, read_receipt,
};
use std::time::Duration;

pub const GREEN_API_URL: &str = "https://api.green-api.com";

pub struct GreenApiProvider {
    client: reqwest::Client,
    api_url: String,
    id_instance: String,
    api_token: String,
}

impl GreenApiProvider {
    pub fn new(
        api_url: String,
        id_instance: String,
        api_token: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_url: api_url.trim_end_matches('/').to_string(),
            id_instance,
            api_token,
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/waInstance{}/sendMessage/{}",
            self.api_url, self.id_instance, self.api_token
        )
    }
}

fn message_id(json: &serde_json::Value) -> Option<String> {
    json["idMessage"].as_str().map(ToString::to_string)
}

#[async_trait::async_trait]
impl MessageProvider for GreenApiProvider {
    fn name(&self) -> &'static str {
        "greenapi"
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<SendReceipt, ProviderError> {
        let response = self
            .client
            .post(self.send_url())
            .json(&serde_json::json!({ "chatId": chat_id, "message": text }))
            .send()
            .await?;
        read_receipt(response, message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GreenApiProvider {
        GreenApiProvider::new(
            server.uri(),
            "1101000001".to_string(),
            "tok".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sends_chat_id_and_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/waInstance1101000001/sendMessage/tok"))
            .and(body_json(serde_json::json!({
                "chatId": "972545661640@c.us",
                "message": "Hello Dana!"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "idMessage": "BAE5F4886F6F2D05" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = provider(&server)
            .send("972545661640@c.us", "Hello Dana!")
            .await
            .unwrap();
        assert_eq!(receipt.provider_message_id.as_deref(), Some("BAE5F4886F6F2D05"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(466).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .send("972545661640@c.us", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Status { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .send("972545661640@c.us", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }
}
