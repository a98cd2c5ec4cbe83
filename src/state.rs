//! Agent configuration and wiring
//!
//! Configuration comes from the environment (a `.env` file is honoured) with
//! field-proven defaults; the site identity comes from the externally
//! provisioned `warehouse_details.json` in the agent directory.

use crate::delayed_slot_store::DelayedSlotStore;
use crate::delivery_client::CollectorClient;
use crate::error::{Error, Result};
use crate::json_file::read_json;
use crate::liveness_prober::{NetworkProber, DEFAULT_PROBE_TIMEOUT};
use crate::registry_cache::{HttpDirectoryClient, RegistryCache};
use crate::scheduler::Scheduler;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const WAREHOUSE_DETAILS_FILE: &str = "warehouse_details.json";
pub const DEVICE_DETAILS_FILE: &str = "device_details.json";
pub const DELAYED_FILE: &str = "delayed.json";

/// Tick cadences and thresholds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Registry snapshot validity window
    pub registry_ttl: Duration,
    /// Forced registry refresh cadence
    pub registry_interval: Duration,
    /// Delayed queue retry cadence
    pub drain_interval: Duration,
    /// Liveness sampling cadence
    pub sample_interval: Duration,
    /// Minimum sustained uptime before a host slot is reported
    pub dwell_threshold: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            registry_ttl: Duration::from_secs(24 * 60 * 60),
            registry_interval: Duration::from_secs(60 * 60),
            drain_interval: Duration::from_secs(5 * 60),
            sample_interval: Duration::from_secs(15 * 60),
            dwell_threshold: Duration::from_secs(10 * 60),
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory holding warehouse_details.json, device_details.json, delayed.json
    pub base_dir: PathBuf,
    /// Directory API base URL
    pub directory_url: String,
    /// Collector API base URL
    pub collector_url: String,
    /// Sent as PROJECT_ID
    pub project_id: String,
    /// `user:password` for camera RTSP endpoints
    pub camera_credentials: Option<String>,
    /// Probe registry cameras on each sample tick
    pub probe_cameras: bool,
    /// Endpoint probed for host liveness (`tcp://host:port`)
    pub host_probe_endpoint: Option<String>,
    pub schedule: ScheduleConfig,
    pub probe_timeout: Duration,
    /// Directory/collector request timeout
    pub http_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let defaults = ScheduleConfig::default();
        Self {
            base_dir: std::env::var("BEACON_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_base_dir()),
            directory_url: std::env::var("DIRECTORY_URL")
                .unwrap_or_else(|_| "https://backend.app-assertai.com/api/v1".to_string()),
            collector_url: std::env::var("COLLECTOR_URL")
                .unwrap_or_else(|_| "http://34.131.49.157:8000".to_string()),
            project_id: std::env::var("PROJECT_ID")
                .unwrap_or_else(|_| "66065de7f49aa74f9a63dd39".to_string()),
            camera_credentials: std::env::var("CAMERA_CREDENTIALS")
                .ok()
                .filter(|c| !c.is_empty()),
            probe_cameras: env_bool("PROBE_CAMERAS", false),
            host_probe_endpoint: std::env::var("HOST_PROBE_ENDPOINT")
                .ok()
                .filter(|e| !e.is_empty()),
            schedule: ScheduleConfig {
                registry_ttl: env_secs("REGISTRY_TTL_SECS", defaults.registry_ttl),
                registry_interval: env_secs("REGISTRY_INTERVAL_SECS", defaults.registry_interval),
                drain_interval: env_secs("DRAIN_INTERVAL_SECS", defaults.drain_interval),
                sample_interval: env_secs("SAMPLE_INTERVAL_SECS", defaults.sample_interval),
                dwell_threshold: env_secs("DWELL_THRESHOLD_SECS", defaults.dwell_threshold),
            },
            probe_timeout: env_secs("PROBE_TIMEOUT_SECS", DEFAULT_PROBE_TIMEOUT),
            http_timeout: env_secs("HTTP_TIMEOUT_SECS", Duration::from_secs(30)),
        }
    }
}

impl AgentConfig {
    pub fn warehouse_details_path(&self) -> PathBuf {
        self.base_dir.join(WAREHOUSE_DETAILS_FILE)
    }

    pub fn device_details_path(&self) -> PathBuf {
        self.base_dir.join(DEVICE_DETAILS_FILE)
    }

    pub fn delayed_path(&self) -> PathBuf {
        self.base_dir.join(DELAYED_FILE)
    }

    /// Reject zero intervals (tokio intervals cannot be zero) and probes that
    /// could not finish within one sample tick
    pub fn validate(&self) -> Result<()> {
        let s = &self.schedule;
        for (name, value) in [
            ("registry_interval", s.registry_interval),
            ("drain_interval", s.drain_interval),
            ("sample_interval", s.sample_interval),
            ("probe_timeout", self.probe_timeout),
            ("http_timeout", self.http_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.probe_timeout >= s.sample_interval {
            return Err(Error::Config(
                "probe_timeout must be shorter than sample_interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// `$HOME/ALPHA/BEACON`
fn default_base_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join("ALPHA").join("BEACON")
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Site identity, provisioned out of band
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteIdentity {
    pub site_id: String,
}

#[derive(Debug, Deserialize)]
struct WarehouseDetails {
    #[serde(rename = "warehouseID")]
    warehouse_id: Option<serde_json::Value>,
}

impl SiteIdentity {
    /// Read `warehouse_details.json`; `warehouseID` may be a string or number
    pub async fn load(path: &Path) -> Result<Self> {
        let details: WarehouseDetails = read_json(path).await?.ok_or_else(|| {
            Error::Config(format!("{} not found", path.display()))
        })?;

        let site_id = match details.warehouse_id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => id,
            Some(serde_json::Value::Number(id)) => id.to_string(),
            other => {
                return Err(Error::Config(format!(
                    "warehouseID missing or invalid in {}: {:?}",
                    path.display(),
                    other
                )))
            }
        };

        Ok(Self { site_id })
    }
}

/// Wired components of a running agent
pub struct AgentState {
    pub config: AgentConfig,
    pub site: SiteIdentity,
    pub registry: Arc<RegistryCache>,
    pub store: Arc<DelayedSlotStore>,
    pub collector: Arc<CollectorClient>,
    pub prober: Arc<NetworkProber>,
}

impl AgentState {
    /// Load the site identity and construct every component
    pub async fn build(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let site = SiteIdentity::load(&config.warehouse_details_path()).await?;

        let directory = Arc::new(HttpDirectoryClient::new(
            &config.directory_url,
            config.http_timeout,
        )?);
        let registry = Arc::new(
            RegistryCache::open(
                site.site_id.clone(),
                directory,
                config.device_details_path(),
                config.camera_credentials.clone(),
                config.schedule.registry_ttl,
            )
            .await,
        );

        let store = Arc::new(DelayedSlotStore::new(config.delayed_path()));
        let collector = Arc::new(CollectorClient::new(
            &config.collector_url,
            site.site_id.clone(),
            config.project_id.clone(),
            config.http_timeout,
        )?);

        Ok(Self {
            config,
            site,
            registry,
            store,
            collector,
            prober: Arc::new(NetworkProber::new()),
        })
    }

    /// Scheduler over these components
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.site.site_id.clone(),
            self.config.schedule.clone(),
            self.registry.clone(),
            self.prober.clone(),
            self.store.clone(),
            self.collector.clone(),
            self.config.probe_timeout,
        )
        .with_camera_probing(self.config.probe_cameras)
        .with_host_endpoint(self.config.host_probe_endpoint.clone())
    }
}
