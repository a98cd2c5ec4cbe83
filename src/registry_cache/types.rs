//! RegistryCache types
//!
//! Wire types of the directory API and the cached snapshot built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// RTSP port used for synthesized camera endpoints
pub const RTSP_PORT: u16 = 554;

/// `GET /cameras?site=...` response
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryResponse {
    pub data: DirectoryData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryData {
    #[serde(rename = "deviceData", default)]
    pub device_data: Vec<DeviceRecord>,
}

/// One camera as returned by the directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub device_ip: String,
    /// Preferred LAN address; empty string means "not set"
    #[serde(rename = "device_local_IP", default)]
    pub device_local_ip: Option<String>,
    pub device_channel: DeviceChannel,
}

/// Channel number, which the directory sends either as number or string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DeviceChannel {
    Number(u64),
    Text(String),
}

impl fmt::Display for DeviceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceChannel::Number(n) => write!(f, "{}", n),
            DeviceChannel::Text(s) => f.write_str(s),
        }
    }
}

impl DeviceRecord {
    /// Address to probe: local IP when present and non-empty, else device IP
    pub fn probe_ip(&self) -> &str {
        self.device_local_ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .unwrap_or(&self.device_ip)
    }

    /// `rtsp://<cred>@{ip}:554/Streaming/Channels/{channel}02`
    pub fn probe_endpoint(&self, credentials: Option<&str>) -> String {
        let userinfo = match credentials {
            Some(cred) if !cred.is_empty() => format!("{}@", cred),
            _ => String::new(),
        };
        format!(
            "rtsp://{}{}:{}/Streaming/Channels/{}02",
            userinfo,
            self.probe_ip(),
            RTSP_PORT,
            self.device_channel
        )
    }
}

/// The registry cache's current view of the site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub site_id: String,
    /// entity_id -> probe endpoint
    pub entities: BTreeMap<String, String>,
    pub fetched_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    /// Build a snapshot from directory records
    pub fn from_records(
        site_id: &str,
        records: &[DeviceRecord],
        credentials: Option<&str>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            site_id: site_id.to_string(),
            entities: records
                .iter()
                .map(|record| (record.id.clone(), record.probe_endpoint(credentials)))
                .collect(),
            fetched_at,
        }
    }

    /// Valid while `now - fetched_at < ttl`
    ///
    /// A `fetched_at` in the future (clock stepped back) counts as stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.fetched_at).to_std() {
            Ok(age) => age < ttl,
            Err(_) => false,
        }
    }
}

/// On-disk form of the snapshot (`device_details.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(rename = "deviceData", default)]
    pub device_data: BTreeMap<String, String>,
    /// Unix seconds of the fetch
    #[serde(default)]
    pub timestamp: i64,
}

impl SnapshotFile {
    pub fn from_snapshot(snapshot: &RegistrySnapshot) -> Self {
        Self {
            device_data: snapshot.entities.clone(),
            timestamp: snapshot.fetched_at.timestamp(),
        }
    }

    pub fn into_snapshot(self, site_id: &str) -> RegistrySnapshot {
        RegistrySnapshot {
            site_id: site_id.to_string(),
            entities: self.device_data,
            fetched_at: DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default(),
        }
    }
}
