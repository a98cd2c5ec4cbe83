//! RegistrySnapshot file persistence (`device_details.json`)

use super::types::{RegistrySnapshot, SnapshotFile};
use crate::error::Result;
use crate::json_file::{read_json, write_json_atomic};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SnapshotRepository {
    path: PathBuf,
}

impl SnapshotRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted snapshot, `None` when never fetched
    pub async fn load(&self, site_id: &str) -> Result<Option<RegistrySnapshot>> {
        let file: Option<SnapshotFile> = read_json(&self.path).await?;
        Ok(file.map(|f| f.into_snapshot(site_id)))
    }

    pub async fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        write_json_atomic(&self.path, &SnapshotFile::from_snapshot(snapshot)).await
    }
}
