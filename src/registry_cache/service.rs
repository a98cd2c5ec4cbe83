//! RegistryCache Service
//!
//! ## Responsibilities
//! - Hold the site's camera list with a TTL (24h by default)
//! - Refresh from the directory API when stale or when forced
//! - Persist every successful refresh to `device_details.json`
//!
//! A failed refresh never discards the previous snapshot; callers that get an
//! error fall back to `last_known()`.

use super::directory_client::DirectorySource;
use super::repository::SnapshotRepository;
use super::types::RegistrySnapshot;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// TTL-controlled cache of the site's device registry
pub struct RegistryCache {
    site_id: String,
    source: Arc<dyn DirectorySource>,
    repository: SnapshotRepository,
    credentials: Option<String>,
    ttl: Duration,
    current: RwLock<Option<RegistrySnapshot>>,
    /// One directory fetch at a time
    refresh_lock: Mutex<()>,
}

impl RegistryCache {
    /// Create the cache, seeding it from the persisted snapshot if any
    ///
    /// # Arguments
    /// * `site_id` - site whose cameras are listed
    /// * `source` - directory API
    /// * `snapshot_path` - `device_details.json`
    /// * `credentials` - `user:password` embedded in camera endpoints
    /// * `ttl` - snapshot validity window
    pub async fn open(
        site_id: impl Into<String>,
        source: Arc<dyn DirectorySource>,
        snapshot_path: PathBuf,
        credentials: Option<String>,
        ttl: Duration,
    ) -> Self {
        let site_id = site_id.into();
        let repository = SnapshotRepository::new(snapshot_path);

        let persisted = match repository.load(&site_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    path = %repository.path().display(),
                    error = %e,
                    "RegistryCache: Persisted snapshot unusable, starting empty"
                );
                None
            }
        };

        if let Some(ref snapshot) = persisted {
            info!(
                site_id = %site_id,
                entities = snapshot.entities.len(),
                fetched_at = %snapshot.fetched_at,
                "RegistryCache: Loaded persisted snapshot"
            );
        }

        Self {
            site_id,
            source,
            repository,
            credentials,
            ttl,
            current: RwLock::new(persisted),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last snapshot held, fresh or not
    pub async fn last_known(&self) -> Option<RegistrySnapshot> {
        self.current.read().await.clone()
    }

    /// Cached snapshot, refreshed first if stale
    pub async fn get(&self) -> Result<RegistrySnapshot> {
        self.get_at(Utc::now()).await
    }

    /// `get` evaluated at `now`
    pub async fn get_at(&self, now: DateTime<Utc>) -> Result<RegistrySnapshot> {
        if let Some(snapshot) = self.fresh_snapshot(now).await {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(snapshot) = self.fresh_snapshot(now).await {
            return Ok(snapshot);
        }

        debug!(site_id = %self.site_id, "RegistryCache: Snapshot stale, refreshing");
        self.fetch_and_store(now).await
    }

    /// Unconditional refresh from the directory API
    pub async fn refresh(&self) -> Result<RegistrySnapshot> {
        self.refresh_at(Utc::now()).await
    }

    /// `refresh` stamped with `now`
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> Result<RegistrySnapshot> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store(now).await
    }

    async fn fresh_snapshot(&self, now: DateTime<Utc>) -> Option<RegistrySnapshot> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|snapshot| snapshot.is_fresh(now, self.ttl))
            .cloned()
    }

    /// Caller holds `refresh_lock`
    async fn fetch_and_store(&self, now: DateTime<Utc>) -> Result<RegistrySnapshot> {
        let records = match self.source.fetch_devices(&self.site_id).await {
            Ok(records) => records,
            Err(e) => {
                let e = match e {
                    Error::DirectoryUnavailable(_) => e,
                    other => Error::DirectoryUnavailable(other.to_string()),
                };
                let has_previous = self.current.read().await.is_some();
                warn!(
                    site_id = %self.site_id,
                    has_previous = has_previous,
                    error = %e,
                    "RegistryCache: Refresh failed, keeping previous snapshot"
                );
                return Err(e);
            }
        };

        let snapshot = RegistrySnapshot::from_records(
            &self.site_id,
            &records,
            self.credentials.as_deref(),
            now,
        );

        if let Err(e) = self.repository.save(&snapshot).await {
            warn!(
                path = %self.repository.path().display(),
                error = %e,
                "RegistryCache: Failed to persist snapshot"
            );
        }

        *self.current.write().await = Some(snapshot.clone());

        info!(
            site_id = %self.site_id,
            entities = snapshot.entities.len(),
            "RegistryCache: Device details updated"
        );

        Ok(snapshot)
    }
}
