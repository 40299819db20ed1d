//! HTTP delivery client over reqwest.
//!
//! Posts the batch as a JSON array to the collector endpoint. Any non-2xx
//! status fails the batch as a whole. The keepalive path spawns the send
//! as a detached task on the current runtime, so it is attempted even when
//! the caller tears down right after dispatch.

use std::time::Duration;

use async_trait::async_trait;
use hearth_core::EventRecord;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use hearth_settings::DeliverySettings;

use crate::client::{DeliveryClient, KeepaliveDispatch};
use crate::errors::TransportError;

/// Production collector client.
#[derive(Debug)]
pub struct HttpDeliveryClient {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpDeliveryClient {
    /// Build a client from delivery settings.
    pub fn new(settings: &DeliverySettings) -> Result<Self, TransportError> {
        let endpoint = reqwest::Url::parse(&settings.endpoint)
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;

        Ok(Self { client, endpoint })
    }

    /// The configured collector endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn deliver(&self, batch: &[EventRecord]) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        debug!(count = batch.len(), "batch delivered");
        Ok(())
    }

    fn deliver_keepalive(&self, batch: Vec<EventRecord>) -> KeepaliveDispatch {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return KeepaliveDispatch::Unsupported;
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        drop(handle.spawn(async move {
            if let Err(e) = client.post(endpoint).json(&batch).send().await {
                // Nothing to do: the teardown path never retries.
                warn!(error = %e, "keepalive send failed");
            }
        }));

        KeepaliveDispatch::Dispatched
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
