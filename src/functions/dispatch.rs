use crate::error::DispatchError;
use crate::functions::format::{render_template, to_chat_id};
use crate::schema::{MessageStatus, ScheduledMessage};
use crate::services::{MessageProvider, MessageStore, MessageUpdate, ProviderError, StoreError};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

pub const MAX_BATCH_SIZE: i64 = 50;
pub const MAX_DELIVERY_ATTEMPTS: i32 = 5;

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("recipient phone is missing")]
    MissingRecipient,
    #[error(transparent)]
    Send(#[from] ProviderError),
    #[error("message sent but status update failed: {0}")]
    Record(#[source] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageOutcome {
    pub id: Uuid,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub claimed_count: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub retry_count: usize,
    pub results: Vec<MessageOutcome>,
}

impl DispatchReport {
    fn record(&mut self, outcome: MessageOutcome) {
        match outcome.status {
            MessageStatus::Sent => self.sent_count += 1,
            MessageStatus::Failed => self.failed_count += 1,
            MessageStatus::Pending | MessageStatus::Processing => self.retry_count += 1,
        }
        self.results.push(outcome);
    }
}

/// Status a row lands in after its `attempts`-th prior failure plus this one.
pub fn status_after_failure(attempts: i32) -> (MessageStatus, i32) {
    let next_attempts = attempts.saturating_add(1);
    if next_attempts < MAX_DELIVERY_ATTEMPTS {
        (MessageStatus::Pending, next_attempts)
    } else {
        (MessageStatus::Failed, next_attempts)
    }
}

pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    provider: Arc<dyn MessageProvider>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn MessageStore>, provider: Arc<dyn MessageProvider>) -> Self {
        Self { store, provider }
    }

    /// Claims one batch of due messages and works through it in claim order,
    /// finishing each message's status write before starting the next one.
    pub async fn run_batch(&self) -> Result<DispatchReport, DispatchError> {
        let claimed = self
            .store
            .claim_due(MAX_BATCH_SIZE)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "dispatch: claim failed");
                DispatchError::Claim(e)
            })?;

        let mut report = DispatchReport {
            claimed_count: claimed.len(),
            ..Default::default()
        };
        if claimed.is_empty() {
            return Ok(report);
        }

        tracing::debug!(
            count = claimed.len(),
            provider = self.provider.name(),
            "dispatch: processing claimed messages"
        );

        for message in &claimed {
            let outcome = match self.deliver(message).await {
                Ok(()) => MessageOutcome {
                    id: message.id,
                    status: MessageStatus::Sent,
                    error: None,
                },
                Err(err) => self.record_failure(message, &err).await,
            };
            report.record(outcome);
        }

        tracing::info!(
            claimed = report.claimed_count,
            sent = report.sent_count,
            retry = report.retry_count,
            failed = report.failed_count,
            "dispatch: batch complete"
        );
        Ok(report)
    }

    async fn deliver(&self, message: &ScheduledMessage) -> Result<(), AttemptError> {
        let chat_id = to_chat_id(message.to_phone.as_deref());
        if chat_id.is_empty() {
            return Err(AttemptError::MissingRecipient);
        }
        let text = render_template(
            &message.message,
            message.contact_name.as_deref(),
            message.to_phone.as_deref(),
        );

        tracing::info!(
            message_id = %message.id,
            chat_id = %chat_id,
            attempt = message.attempts.saturating_add(1),
            "dispatch: sending message"
        );

        let receipt = self.provider.send(&chat_id, &text).await?;

        let update = MessageUpdate::Sent {
            provider_message_id: receipt.provider_message_id,
            sent_at: chrono::Utc::now(),
        };
        self.store.update(message.id, &update).await.map_err(|e| {
            tracing::error!(
                message_id = %message.id,
                error = %e,
                "dispatch: message delivered but sent status was not recorded"
            );
            AttemptError::Record(e)
        })
    }

    async fn record_failure(&self, message: &ScheduledMessage, err: &AttemptError) -> MessageOutcome {
        let (status, attempts) = status_after_failure(message.attempts);
        let last_error = err.to_string();

        tracing::warn!(
            message_id = %message.id,
            attempt = attempts,
            status = %status,
            error = %last_error,
            "dispatch: send failed"
        );

        let update = MessageUpdate::Attempted {
            status,
            attempts,
            last_error: last_error.clone(),
        };
        if let Err(e) = self.store.update(message.id, &update).await {
            tracing::error!(
                message_id = %message.id,
                error = %e,
                "dispatch: failed to record attempt"
            );
        }

        MessageOutcome {
            id: message.id,
            status,
            error: Some(last_error),
        }
    }
}
