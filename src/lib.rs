//! Beacon Agent Library
//!
//! Edge heartbeat agent: samples host (and optionally camera) liveness and
//! reports uptime slots to a collector. Slots the collector did not
//! acknowledge are kept on disk and replayed until delivered.
//!
//! ## Components
//!
//! 1. RegistryCache - site camera list from the directory API, 24h TTL
//! 2. LivenessProber - bounded TCP / RTSP reachability checks
//! 3. DelayedSlotStore - durable single-writer queue of undelivered slots
//! 4. DeliveryClient - collector API adapter
//! 5. Scheduler - registry / drain / sample ticks
//!
//! ## Persisted files (agent directory)
//!
//! - `warehouse_details.json` - site identity (read-only)
//! - `device_details.json` - registry snapshot
//! - `delayed.json` - delayed queue

pub mod delayed_slot_store;
pub mod delivery_client;
pub mod error;
pub mod json_file;
pub mod liveness_prober;
pub mod registry_cache;
pub mod scheduler;
pub mod state;

pub use error::{Error, Result};
pub use state::{AgentConfig, AgentState};
