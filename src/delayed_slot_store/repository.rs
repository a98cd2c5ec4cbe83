//! DelayedQueue file persistence (`delayed.json`)

use super::types::SlotBatch;
use crate::error::Result;
use crate::json_file::{preserve_corrupt, read_json, write_json_atomic};
use std::path::{Path, PathBuf};

/// File-backed DelayedQueue artifact
#[derive(Debug, Clone)]
pub struct DelayedQueueRepository {
    path: PathBuf,
}

impl DelayedQueueRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the queue; a missing file is an empty queue
    pub async fn load(&self) -> Result<SlotBatch> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    /// Durably replace the queue content
    pub async fn save(&self, queue: &SlotBatch) -> Result<()> {
        write_json_atomic(&self.path, queue).await
    }

    /// Durably replace the queue with the empty queue
    pub async fn clear(&self) -> Result<()> {
        self.save(&SlotBatch::new()).await
    }

    /// Keep a copy of an unparseable artifact before it is overwritten
    pub async fn preserve_corrupt(&self) -> Result<PathBuf> {
        preserve_corrupt(&self.path).await
    }
}
