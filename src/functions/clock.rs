use crate::config::ClockConfig;
use crate::functions::dispatch::Dispatcher;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

// the `cron` crate requires 6-field (second-granularity) expressions,
// so we prepend "0" to standard 5-field minute-granularity inputs
fn normalize_schedule(schedule: &str) -> String {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    let normalized = fields.join(" ");
    if fields.len() == 5 {
        format!("0 {normalized}")
    } else {
        normalized
    }
}

/// A parsed dispatch schedule bound to the timezone it is evaluated in.
#[derive(Debug, Clone)]
pub struct DispatchSchedule {
    schedule: cron::Schedule,
    timezone: chrono_tz::Tz,
}

impl DispatchSchedule {
    pub fn parse(config: &ClockConfig) -> anyhow::Result<Self> {
        let timezone: chrono_tz::Tz = config
            .timezone
            .parse()
            .map_err(|_| anyhow!("invalid timezone: {}", config.timezone))?;
        let normalized = normalize_schedule(&config.schedule);
        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| anyhow!("invalid cron expression `{normalized}`: {e}"))?;
        Ok(Self { schedule, timezone })
    }

    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let from_local = from.with_timezone(&self.timezone);
        self.schedule
            .after(&from_local)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }
}

/// Runs one batch per schedule tick until `shutdown` flips to true.
pub async fn run_clock(
    dispatcher: Arc<Dispatcher>,
    schedule: DispatchSchedule,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            tracing::warn!("clock: schedule has no future occurrences, stopping");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(next_run_at = %next, "clock: waiting for next tick");

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(wait) => {
                match dispatcher.run_batch().await {
                    Ok(report) if report.claimed_count > 0 => tracing::info!(
                        claimed = report.claimed_count,
                        sent = report.sent_count,
                        "clock tick"
                    ),
                    Err(e) => tracing::error!(error = %e, "clock tick failed"),
                    _ => {}
                }
            }
        }
    }
    tracing::info!("clock: stopped");
}
