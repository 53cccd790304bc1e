// src/notify/webhook.rs
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::{WebhookOverrides, WebhookPayload};
use crate::entry::NormalizedEntry;
use crate::error::RelayError;
use crate::shutdown::Shutdown;

/// Delay before retry number `attempt + 1`: `2 * 2^attempt` units.
pub fn backoff_delay(attempt: u32, unit: Duration) -> Duration {
    unit.saturating_mul(2u32.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX)))
}

/// Longest server-requested wait we honour.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Numeric `Retry-After` (seconds, fractional allowed), capped at [`MAX_RETRY_AFTER`].
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = raw.trim().parse().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    let wait = Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_AFTER);
    Some(wait.min(MAX_RETRY_AFTER))
}

/// Posts entries as embed payloads, retrying on 429 and timeouts.
#[derive(Clone)]
pub struct WebhookClient {
    client: Client,
    timeout: Duration,
    max_attempts: u32,
    backoff_unit: Duration,
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts, including the first one.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Deliver one entry. Failures are logged and reported as `false`.
    pub async fn send(
        &self,
        webhook_url: &str,
        entry: &NormalizedEntry,
        source_title: &str,
        overrides: &WebhookOverrides,
        shutdown: &Shutdown,
    ) -> bool {
        match self
            .try_send(webhook_url, entry, source_title, overrides, shutdown)
            .await
        {
            Ok(()) => {
                tracing::info!(title = %entry.title, source = %source_title, "sent to webhook");
                true
            }
            Err(e) => {
                tracing::error!(title = %entry.title, source = %source_title, error = %e, "webhook delivery failed");
                false
            }
        }
    }

    pub async fn try_send(
        &self,
        webhook_url: &str,
        entry: &NormalizedEntry,
        source_title: &str,
        overrides: &WebhookOverrides,
        shutdown: &Shutdown,
    ) -> Result<(), RelayError> {
        let payload = WebhookPayload::for_entry(entry, source_title, overrides);

        for attempt in 0..self.max_attempts {
            let last = attempt + 1 >= self.max_attempts;
            let res = self
                .client
                .post(webhook_url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let delay = match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) if rsp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if last {
                        return Err(RelayError::Delivery(format!(
                            "rate limited, gave up after {} attempts",
                            self.max_attempts
                        )));
                    }
                    let delay = retry_after(rsp.headers())
                        .unwrap_or_else(|| backoff_delay(attempt, self.backoff_unit));
                    tracing::warn!(attempt = attempt + 1, ?delay, "webhook rate limited");
                    delay
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    let body = rsp.text().await.unwrap_or_default();
                    let snippet: String = body.chars().take(200).collect();
                    return Err(RelayError::Delivery(format!("HTTP {status}: {snippet}")));
                }
                Err(e) if e.is_timeout() => {
                    if last {
                        return Err(RelayError::Delivery(format!(
                            "timed out, gave up after {} attempts",
                            self.max_attempts
                        )));
                    }
                    let delay = backoff_delay(attempt, self.backoff_unit);
                    tracing::warn!(attempt = attempt + 1, ?delay, "webhook request timed out");
                    delay
                }
                Err(e) => return Err(RelayError::Delivery(format!("request failed: {e}"))),
            };

            if !shutdown.sleep(delay).await {
                return Err(RelayError::Delivery("shutdown during retry backoff".into()));
            }
        }

        Err(RelayError::Delivery("no delivery attempts configured".into()))
    }
}
