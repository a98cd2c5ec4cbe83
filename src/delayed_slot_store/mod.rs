//! DelayedSlotStore Module
//!
//! Everything observed but not yet acknowledged by the collector lives here,
//! in `delayed.json`, until a drain delivers it.
//!
//! ## Module layout
//! - `types`: SlotBatch, DrainOutcome
//! - `repository`: atomic file persistence
//! - `service`: single-writer append / drain
//!
//! ## Guarantees
//! - append is loss-free: sequences only grow, in append order
//! - the queue is cleared only after the collector acknowledged all of it
//! - a rejected drain leaves the file byte-for-byte unchanged

pub mod repository;
pub mod service;
pub mod types;

pub use repository::DelayedQueueRepository;
pub use service::DelayedSlotStore;
pub use types::{DrainOutcome, SlotBatch, SlotTimestamp};
