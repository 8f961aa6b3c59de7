//! InfluxDB v2 HTTP write API sink.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use super::{line_protocol_body, Fields, PointBuffer, ReportSink, Tags};
use crate::clock::Clock;
use crate::config::InfluxConfig;
use crate::error::{Error, Result};

/// Writes buffered points to `{url}/api/v2/write` on flush.
pub struct InfluxSink {
    client: Client,
    base_url: String,
    org: String,
    bucket: String,
    token: SecretString,
    buffer: PointBuffer,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig, token: SecretString, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Sink(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, config, token, clock))
    }

    /// Creates a sink with a custom HTTP client.
    pub fn with_client(
        client: Client,
        config: &InfluxConfig,
        token: SecretString,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token,
            buffer: PointBuffer::new(config.measurement.clone(), clock),
        }
    }
}

#[async_trait]
impl ReportSink for InfluxSink {
    fn record(&mut self, tags: Tags, fields: Fields) {
        self.buffer.push(tags, fields);
    }

    async fn flush(&mut self) -> Result<usize> {
        if self.buffer.pending().is_empty() {
            return Ok(0);
        }

        let body = line_protocol_body(self.buffer.pending());
        let url = format!("{}/api/v2/write", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.token.expose_secret()),
            )
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Sink(format!("write request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Sink(format!(
                "write rejected with {status}: {}",
                detail.trim()
            )));
        }

        let written = self.buffer.take().len();
        tracing::debug!(points = written, bucket = %self.bucket, "flushed points to InfluxDB");
        Ok(written)
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await?;
        self.buffer.mark_closed();
        Ok(())
    }
}
