//! DelayedSlotStore Service
//!
//! Single-writer owner of the DelayedQueue. `append` and
//! `drain_and_deliver` take the same async mutex for their whole
//! read-modify-write, so they never interleave on the artifact. The drain
//! keeps the lock across the delivery call: a batch appended while a drain is
//! in flight waits and lands after the clear, never inside the cleared set.

use super::repository::DelayedQueueRepository;
use super::types::{DrainOutcome, SlotBatch};
use crate::delivery_client::SlotSink;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Durable, mergeable queue of undelivered observation slots
pub struct DelayedSlotStore {
    repository: DelayedQueueRepository,
    write_lock: Mutex<()>,
}

impl DelayedSlotStore {
    /// Create a store over `path` (usually `<agent dir>/delayed.json`)
    pub fn new(path: PathBuf) -> Self {
        Self {
            repository: DelayedQueueRepository::new(path),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        self.repository.path()
    }

    /// Current durable content (unreadable or malformed reads as empty)
    pub async fn load(&self) -> SlotBatch {
        let _guard = self.write_lock.lock().await;
        self.read_current().await.0
    }

    /// Merge `batch` into the queue and persist before returning
    pub async fn append(&self, batch: SlotBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let (mut queue, unreadable) = self.read_current().await;

        if unreadable {
            self.preserve_unreadable().await;
        }

        let added = batch.slot_count();
        let entities: Vec<String> = batch.entity_ids().map(String::from).collect();
        queue.merge(batch);

        if let Err(e) = self.repository.save(&queue).await {
            error!(
                path = %self.path().display(),
                entities = ?entities,
                error = %e,
                "DelayedSlotStore: Failed to persist slots"
            );
            return Err(e);
        }

        info!(
            added = added,
            entities = ?entities,
            queued_slots = queue.slot_count(),
            "DelayedSlotStore: Slots queued for retry"
        );

        Ok(())
    }

    /// Replay the whole queue through `sink` and clear it on acknowledgement
    ///
    /// An empty queue makes no delivery call. A rejected delivery leaves the
    /// artifact untouched for the next drain.
    pub async fn drain_and_deliver(&self, sink: &dyn SlotSink) -> Result<DrainOutcome> {
        let _guard = self.write_lock.lock().await;
        let (queue, _) = self.read_current().await;

        if queue.is_empty() {
            debug!("DelayedSlotStore: No delayed slots found");
            return Ok(DrainOutcome::Empty);
        }

        let entities = queue.entity_count();
        let slots = queue.slot_count();

        if !sink.deliver(&queue, false).await {
            warn!(
                entities = entities,
                slots = slots,
                "DelayedSlotStore: Unable to push delayed slots, keeping queue"
            );
            return Ok(DrainOutcome::Retained { entities, slots });
        }

        if let Err(e) = self.repository.clear().await {
            // Delivered but still on disk: the next drain re-sends (at-least-once)
            error!(
                path = %self.path().display(),
                error = %e,
                "DelayedSlotStore: Delivered but failed to clear queue"
            );
            return Err(e);
        }

        info!(
            entities = entities,
            slots = slots,
            "DelayedSlotStore: Delayed slots delivered, queue cleared"
        );

        Ok(DrainOutcome::Delivered { entities, slots })
    }

    /// Read the artifact; the flag is true when it exists but cannot be used
    async fn read_current(&self) -> (SlotBatch, bool) {
        match self.repository.load().await {
            Ok(queue) => (queue, false),
            Err(e) => {
                error!(
                    path = %self.path().display(),
                    error = %e,
                    "DelayedSlotStore: Queue unreadable, treating as empty"
                );
                (SlotBatch::new(), true)
            }
        }
    }

    async fn preserve_unreadable(&self) {
        match self.repository.preserve_corrupt().await {
            Ok(backup) => warn!(
                path = %self.path().display(),
                backup = %backup.display(),
                "DelayedSlotStore: Unreadable queue copied aside before rewrite"
            ),
            Err(e) => error!(
                path = %self.path().display(),
                error = %e,
                "DelayedSlotStore: Could not copy unreadable queue aside"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Records every delivery and answers with a fixed result
    struct RecordingSink {
        accept: bool,
        calls: StdMutex<Vec<(SlotBatch, bool)>>,
    }

    impl RecordingSink {
        fn new(accept: bool) -> Self {
            Self {
                accept,
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(SlotBatch, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SlotSink for RecordingSink {
        async fn deliver(&self, slots: &SlotBatch, live: bool) -> bool {
            self.calls.lock().unwrap().push((slots.clone(), live));
            self.accept
        }
    }

    fn create_store() -> (DelayedSlotStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = DelayedSlotStore::new(temp.path().join("delayed.json"));
        (store, temp)
    }

    #[tokio::test]
    async fn test_append_merges_batches() {
        let (store, _temp) = create_store();

        store.append(SlotBatch::from([("cam1", vec![100])])).await.unwrap();
        store
            .append(SlotBatch::from([("cam1", vec![200]), ("cam2", vec![150])]))
            .await
            .unwrap();

        assert_eq!(
            store.load().await,
            SlotBatch::from([("cam1", vec![100, 200]), ("cam2", vec![150])])
        );
    }

    #[tokio::test]
    async fn test_append_many_is_loss_free() {
        let (store, _temp) = create_store();
        let mut expected = SlotBatch::new();

        for tick in 0..20i64 {
            let mut batch = SlotBatch::new();
            batch.push("host", tick * 60);
            if tick % 3 == 0 {
                batch.push("cam7", tick * 60 + 1);
            }
            expected.merge(batch.clone());
            store.append(batch).await.unwrap();
        }

        assert_eq!(store.load().await, expected);
        assert_eq!(store.load().await.get("host").unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_drain_failure_leaves_file_unchanged() {
        let (store, _temp) = create_store();
        store.append(SlotBatch::from([("cam1", vec![100])])).await.unwrap();
        store
            .append(SlotBatch::from([("cam1", vec![200]), ("cam2", vec![150])]))
            .await
            .unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let sink = RecordingSink::new(false);
        let outcome = store.drain_and_deliver(&sink).await.unwrap();

        assert_eq!(outcome, DrainOutcome::Retained { entities: 2, slots: 3 });
        assert_eq!(std::fs::read(store.path()).unwrap(), before);

        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].1, "replayed slots are not live");
        assert_eq!(
            calls[0].0,
            SlotBatch::from([("cam1", vec![100, 200]), ("cam2", vec![150])])
        );
    }

    #[tokio::test]
    async fn test_drain_success_clears_and_next_drain_skips_delivery() {
        let (store, _temp) = create_store();
        store.append(SlotBatch::from([("cam1", vec![100])])).await.unwrap();

        let sink = RecordingSink::new(true);
        let outcome = store.drain_and_deliver(&sink).await.unwrap();
        assert_eq!(outcome, DrainOutcome::Delivered { entities: 1, slots: 1 });
        assert!(store.load().await.is_empty());

        let outcome = store.drain_and_deliver(&sink).await.unwrap();
        assert_eq!(outcome, DrainOutcome::Empty);
        assert_eq!(sink.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_on_missing_file_makes_no_call() {
        let (store, _temp) = create_store();
        let sink = RecordingSink::new(true);

        assert_eq!(store.drain_and_deliver(&sink).await.unwrap(), DrainOutcome::Empty);
        assert!(sink.calls().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_reopen_reproduces_queue() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("delayed.json");
        let batch = SlotBatch::from([("wh-1", vec![1_700_000_000, 1_700_000_900])]);

        DelayedSlotStore::new(path.clone())
            .append(batch.clone())
            .await
            .unwrap();

        let reopened = DelayedSlotStore::new(path);
        assert_eq!(reopened.load().await, batch);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_empty_and_is_kept_until_write() {
        let (store, temp) = create_store();
        std::fs::write(store.path(), b"{\"cam1\": [100,").unwrap();

        assert!(store.load().await.is_empty());
        let sink = RecordingSink::new(true);
        assert_eq!(store.drain_and_deliver(&sink).await.unwrap(), DrainOutcome::Empty);
        assert_eq!(std::fs::read(store.path()).unwrap(), b"{\"cam1\": [100,");

        store.append(SlotBatch::from([("cam2", vec![300])])).await.unwrap();

        assert_eq!(store.load().await, SlotBatch::from([("cam2", vec![300])]));
        let backups: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.to_string_lossy().contains("delayed.json.corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read(&backups[0]).unwrap(), b"{\"cam1\": [100,");
    }

    #[tokio::test]
    async fn test_empty_append_does_not_create_file() {
        let (store, _temp) = create_store();
        store.append(SlotBatch::new()).await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let (store, _temp) = create_store();
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..10i64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.append(SlotBatch::from([("cam1", vec![i])])).await.unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut slots = store.load().await.get("cam1").unwrap().to_vec();
        slots.sort();
        assert_eq!(slots, (0..10).collect::<Vec<_>>());
    }
}
