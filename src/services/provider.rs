use crate::config::ProviderConfig;
use crate::services::{EvolutionProvider, GreenApiProvider, RelayProvider};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: Option<String>,
}

#[async_trait::async_trait]
pub trait MessageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sends `text` to a normalized `<digits>@c.us` chat id.
    async fn send(&self, chat_id: &str, text: &str) -> Result<SendReceipt, ProviderError>;
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Non-2xx is a failure; an empty 2xx body is a success without an id.
pub async fn read_receipt(
    response: reqwest::Response,
    extract_id: fn(&serde_json::Value) -> Option<String>,
) -> Result<SendReceipt, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::Status { status, body });
    }
    if body.trim().is_empty() {
        return Ok(SendReceipt::default());
    }
    let json: serde_json::Value = serde_json::from_str(&body)?;
    Ok(SendReceipt {
        provider_message_id: extract_id(&json),
    })
}

pub fn build_provider(config: &ProviderConfig) -> anyhow::Result<Arc<dyn MessageProvider>> {
    let provider: Arc<dyn MessageProvider> = match config {
        ProviderConfig::GreenApi {
            api_url,
            id_instance,
            api_token,
            timeout,
        } => Arc::new(GreenApiProvider::new(
            api_url.clone(),
            id_instance.clone(),
            api_token.clone(),
            *timeout,
        )?),
        ProviderConfig::Evolution {
            api_url,
            instance,
            api_key,
            timeout,
        } => Arc::new(EvolutionProvider::new(
            api_url.clone(),
            instance.clone(),
            api_key.clone(),
            *timeout,
        )?),
        ProviderConfig::Relay {
            url,
            token,
            timeout,
        } => Arc::new(RelayProvider::new(url.clone(), token.clone(), *timeout)?),
    };
    tracing::info!(provider = provider.name(), "provider initialized");
    Ok(provider)
}
