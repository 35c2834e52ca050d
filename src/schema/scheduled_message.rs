use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown message status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for MessageStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for MessageStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A row of `scheduled_messages` as handed back by the claim procedure.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduledMessage {
    pub id: Uuid,
    #[sqlx(default)]
    #[serde(default)]
    pub to_phone: Option<String>,
    #[sqlx(default)]
    #[serde(default)]
    pub contact_name: Option<String>,
    pub message: String,
    #[sqlx(try_from = "String")]
    pub status: MessageStatus,
    pub attempts: i32,
    #[sqlx(default)]
    #[serde(default)]
    pub last_error: Option<String>,
    #[sqlx(default)]
    #[serde(default)]
    pub provider_message_id: Option<String>,
    #[sqlx(default)]
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}
