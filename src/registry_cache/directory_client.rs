//! Directory API client
//!
//! `GET <directory>/cameras?site={site_id}` returns the cameras attached to a
//! site. Every failure mode (transport, status, body) is reported as
//! `Error::DirectoryUnavailable`.

use super::types::{DeviceRecord, DirectoryResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Source of a site's camera list
#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn fetch_devices(&self, site_id: &str) -> Result<Vec<DeviceRecord>>;
}

/// HTTP implementation of DirectorySource
#[derive(Clone)]
pub struct HttpDirectoryClient {
    http: Client,
    base_url: String,
}

impl HttpDirectoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DirectorySource for HttpDirectoryClient {
    async fn fetch_devices(&self, site_id: &str) -> Result<Vec<DeviceRecord>> {
        let url = format!("{}/cameras", self.base_url);
        debug!(url = %url, site_id = %site_id, "DirectoryClient: Fetching cameras");

        let response = self
            .http
            .get(&url)
            .query(&[("site", site_id)])
            .send()
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DirectoryUnavailable(format!(
                "unexpected status {}",
                status.as_u16()
            )));
        }

        let body: DirectoryResponse = response
            .json()
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("invalid response body: {}", e)))?;

        debug!(
            site_id = %site_id,
            count = body.data.device_data.len(),
            "DirectoryClient: Got cameras"
        );

        Ok(body.data.device_data)
    }
}
