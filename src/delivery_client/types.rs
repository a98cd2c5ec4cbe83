//! Collector API wire types

use crate::delayed_slot_store::SlotBatch;
use serde::Serialize;

/// `POST /process_data` body
#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CollectorPayload<'a> {
    pub time_slots: &'a SlotBatch,
    pub live: bool,
    pub warehouse_id: &'a str,
    pub project_id: &'a str,
}
