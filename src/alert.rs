//! Optional forwarding of fatal errors to a webhook.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    text: &'a str,
    source: &'a str,
}

/// Posts `{"text": ..., "source": "ledgerwatch"}` to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookAlerter {
    client: Client,
    url: SecretString,
}

impl WebhookAlerter {
    pub fn new(url: SecretString, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for alerts")?;
        Ok(Self { client, url })
    }

    pub async fn notify(&self, message: &str) -> Result<()> {
        self.client
            .post(self.url.expose_secret())
            .json(&AlertPayload {
                text: message,
                source: "ledgerwatch",
            })
            .send()
            .await
            .context("Failed to send alert")?
            .error_for_status()
            .context("Alert webhook rejected the message")?;
        Ok(())
    }
}

/// Forward `message` if an alerter is configured. Alerting failures are
/// logged and otherwise ignored.
pub async fn notify_failure(alerter: Option<&WebhookAlerter>, message: &str) {
    let Some(alerter) = alerter else {
        return;
    };
    match alerter.notify(message).await {
        Ok(()) => tracing::debug!("forwarded failure to alert webhook"),
        Err(err) => tracing::warn!(error = %format!("{err:#}"), "failed to forward alert"),
    }
}
