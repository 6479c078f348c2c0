//! HTTP ingestion sink
//!
//! Each enriched page is POSTed as a JSON array. The event type travels in
//! the `X-Event-Type` header so one endpoint can route several record kinds.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::client::DetectionSink;
use crate::config::SinkConfig;
use crate::errors::{Error, Result};
use crate::models::Detection;

const EVENT_TYPE_HEADER: &str = "X-Event-Type";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Posts detection batches to an ingestion endpoint
pub struct HttpSink {
    http: Client,
    url: String,
    token: Option<String>,
}

impl HttpSink {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("IngestionUrl is required".to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Sink(e.to_string()))?;

        Ok(Self {
            http,
            url,
            token: config.token.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DetectionSink for HttpSink {
    async fn post_data(&self, detections: &[Detection], event_type: &str) -> Result<()> {
        if detections.is_empty() {
            debug!(event_type = %event_type, "No detections to post");
            return Ok(());
        }

        let mut request = self
            .http
            .post(&self.url)
            .header(EVENT_TYPE_HEADER, event_type)
            .json(detections);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Sink(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
            return Err(Error::Sink(format!("HTTP {}: {}", status, body)));
        }

        info!(
            event_type = %event_type,
            count = detections.len(),
            "Posted detections"
        );
        Ok(())
    }
}
