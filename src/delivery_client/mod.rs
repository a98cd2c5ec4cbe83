//! DeliveryClient - Collector API adapter
//!
//! Sends a SlotBatch (live or replayed from the delayed queue) to the
//! collector in a single request. Success means HTTP 200; anything else,
//! including transport errors and timeouts, is reported as `false` and the
//! caller decides what to do with the batch.

pub mod types;

use crate::delayed_slot_store::SlotBatch;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use types::CollectorPayload;

/// Anything that can accept a batch of slots
#[async_trait]
pub trait SlotSink: Send + Sync {
    /// Deliver `slots`; `live` is false when replaying the delayed queue.
    /// Returns true only when the receiver acknowledged the whole batch.
    async fn deliver(&self, slots: &SlotBatch, live: bool) -> bool;
}

/// HTTP client for `POST <collector>/process_data`
#[derive(Clone)]
pub struct CollectorClient {
    http: Client,
    endpoint: String,
    site_id: String,
    project_id: String,
}

impl CollectorClient {
    /// Create new CollectorClient
    ///
    /// # Arguments
    /// * `collector_url` - collector base URL (e.g. http://collector:8000)
    /// * `site_id` - sent as WAREHOUSE_ID
    /// * `project_id` - sent as PROJECT_ID
    /// * `timeout` - total request timeout
    pub fn new(
        collector_url: &str,
        site_id: impl Into<String>,
        project_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/process_data", collector_url.trim_end_matches('/')),
            site_id: site_id.into(),
            project_id: project_id.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, slots: &SlotBatch, live: bool) -> Result<()> {
        let payload = CollectorPayload {
            time_slots: slots,
            live,
            warehouse_id: &self.site_id,
            project_id: &self.project_id,
        };

        debug!(
            url = %self.endpoint,
            live = live,
            slots = slots.slot_count(),
            "CollectorClient: Posting slots"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header("accept", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::DeliveryFailed(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body
        )))
    }
}

#[async_trait]
impl SlotSink for CollectorClient {
    async fn deliver(&self, slots: &SlotBatch, live: bool) -> bool {
        match self.post(slots, live).await {
            Ok(()) => {
                info!(
                    live = live,
                    entities = slots.entity_count(),
                    slots = slots.slot_count(),
                    "CollectorClient: Slots delivered"
                );
                true
            }
            Err(e) => {
                warn!(
                    live = live,
                    batch = ?slots,
                    error = %e,
                    "CollectorClient: Delivery failed"
                );
                false
            }
        }
    }
}
