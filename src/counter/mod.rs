//! Shared click counter
//!
//! - `reconciler`: optimistic local counter, batched flushes, polling, offline fallback
//! - `service`: counter operations with seeding, retries and fallbacks
//! - `store`: store interface plus an in-memory implementation
//! - `upstash`: Redis-over-REST store client
//! - `parse`: lenient value parsing

pub mod parse;
pub mod reconciler;
pub mod service;
pub mod store;
pub mod upstash;

use serde::{Deserialize, Serialize};

use crate::consts::*;

pub use parse::parse_counter;
pub use reconciler::{
    CounterReconciler, CounterState, RemoteCompletion, RemoteRequest, SyncPhase, merge_counts,
};
pub use service::{CounterService, NoSleep, RetryPolicy, Sleeper};
pub use store::{CounterStore, MemoryStore, StoreError};
pub use upstash::{Transport, UpstashStore};

/// Counter tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Store key holding the shared tally
    pub key: String,
    /// Value a missing key is seeded with
    pub store_floor: i64,
    /// Minimum shown after a successful read
    pub display_floor: i64,
    /// Minimum shown while the store is unreachable
    pub offline_floor: i64,
    pub flush_debounce_ms: u64,
    pub poll_interval_ms: u64,
    /// Minimum gap between two issued polls
    pub poll_throttle_ms: u64,
    /// Counter "pop" animation length
    pub pulse_ms: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            key: COUNTER_KEY.to_string(),
            store_floor: STORE_FLOOR,
            display_floor: DISPLAY_FLOOR,
            offline_floor: OFFLINE_FLOOR,
            flush_debounce_ms: FLUSH_DEBOUNCE_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            poll_throttle_ms: POLL_THROTTLE_MS,
            pulse_ms: COUNTER_PULSE_MS,
        }
    }
}
