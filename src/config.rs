use crate::services::GREEN_API_URL;
use anyhow::{Context, bail};
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres {
        database_url: String,
        max_connections: u32,
    },
    Rest {
        url: String,
        service_key: String,
    },
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    GreenApi {
        api_url: String,
        id_instance: String,
        api_token: String,
        timeout: Duration,
    },
    Evolution {
        api_url: String,
        instance: String,
        api_key: String,
        timeout: Duration,
    },
    Relay {
        url: String,
        token: String,
        timeout: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct ClockConfig {
    pub schedule: String,
    pub timezone: String,
}

/// Everything the service reads from its environment, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub dispatch_secret: String,
    pub store: StoreConfig,
    pub provider: ProviderConfig,
    pub clock: Option<ClockConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{key} not set"));

        let dispatch_secret = require("DISPATCH_SECRET")?;

        let store = if let Some(database_url) = get("DATABASE_URL") {
            let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
                Some(raw) => raw
                    .parse::<u32>()
                    .with_context(|| format!("invalid DATABASE_MAX_CONNECTIONS: {raw}"))?,
                None => DEFAULT_MAX_CONNECTIONS,
            };
            StoreConfig::Postgres {
                database_url,
                max_connections,
            }
        } else if let Some(url) = get("SUPABASE_URL") {
            StoreConfig::Rest {
                url,
                service_key: require("SUPABASE_SERVICE_ROLE_KEY")?,
            }
        } else {
            bail!("no store configured: set DATABASE_URL or SUPABASE_URL");
        };

        let timeout = match get("PROVIDER_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .with_context(|| format!("invalid PROVIDER_TIMEOUT_SECS: {raw}"))?,
            ),
            None => Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        };

        let provider_name = get("MESSAGING_PROVIDER").unwrap_or_else(|| "greenapi".to_string());
        let provider = match provider_name.to_ascii_lowercase().as_str() {
            "greenapi" | "green-api" => ProviderConfig::GreenApi {
                api_url: get("GREENAPI_API_URL").unwrap_or_else(|| GREEN_API_URL.to_string()),
                id_instance: require("GREENAPI_ID_INSTANCE")?,
                api_token: require("GREENAPI_API_TOKEN")?,
                timeout,
            },
            "evolution" => ProviderConfig::Evolution {
                api_url: require("EVOLUTION_API_URL")?,
                instance: require("EVOLUTION_INSTANCE")?,
                api_key: require("EVOLUTION_API_KEY")?,
                timeout,
            },
            "relay" => ProviderConfig::Relay {
                url: require("RELAY_URL")?,
                token: require("RELAY_TOKEN")?,
                timeout,
            },
            other => bail!("unknown MESSAGING_PROVIDER: {other}"),
        };

        let clock = get("DISPATCH_SCHEDULE").map(|schedule| ClockConfig {
            schedule,
            timezone: get("DISPATCH_TIMEZONE").unwrap_or_else(|| "UTC".to_string()),
        });

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            dispatch_secret,
            store,
            provider,
            clock,
        })
    }
}
