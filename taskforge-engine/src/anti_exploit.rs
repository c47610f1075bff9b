//! Placement tracking that tells natural world state from recent manipulation.
//!
//! Each tracked location moves `Natural -> Placed -> Natural` as its
//! placement ages past the configured natural-time window. Expired records
//! are evicted lazily on query and eagerly by a periodic sweep; both paths
//! take the same lock, so evicting a key twice is harmless.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::Clock;
use crate::persistence::PersistenceQueue;
use crate::time::{is_window_elapsed, remaining_millis};

/// World coordinates of a tracked resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey {
    pub world: String,
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl LocationKey {
    #[must_use]
    pub fn new(world: impl Into<String>, x: i64, y: i64, z: i64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.world, self.x, self.y, self.z)
    }
}

/// Decaying exclusion windows keyed by location.
#[derive(Debug)]
pub struct PlacementTracker {
    records: Mutex<HashMap<LocationKey, u64>>,
    natural_time: u64,
    audit: Option<PersistenceQueue>,
}

impl PlacementTracker {
    #[must_use]
    pub fn new(natural_time: u64) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            natural_time,
            audit: None,
        }
    }

    /// Mirror placements into the store's audit table.
    #[must_use]
    pub fn with_audit(mut self, queue: PersistenceQueue) -> Self {
        self.audit = Some(queue);
        self
    }

    #[must_use]
    pub const fn natural_time(&self) -> u64 {
        self.natural_time
    }

    /// Start (or restart) the exclusion window for `key`.
    pub fn record_placement(&self, key: &LocationKey, now: u64) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), now);
        if let Some(audit) = &self.audit {
            audit.record_placement(key.to_string(), now);
        }
    }

    /// Whether `key` is natural at `now` for the given window.
    ///
    /// An expired record is evicted as part of the query.
    pub fn is_natural(&self, key: &LocationKey, now: u64, threshold: u64) -> bool {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(&placed_at) = records.get(key) else {
            return true;
        };
        if !is_window_elapsed(placed_at, threshold, now) {
            return false;
        }
        records.remove(key);
        drop(records);
        self.clear_audit(key);
        true
    }

    /// Query against the configured natural-time window.
    pub fn is_natural_now(&self, key: &LocationKey, now: u64) -> bool {
        self.is_natural(key, now, self.natural_time)
    }

    /// Milliseconds until `key` becomes natural, `None` if it already is.
    #[must_use]
    pub fn remaining_exclusion(&self, key: &LocationKey, now: u64) -> Option<u64> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let placed_at = *records.get(key)?;
        let remaining = remaining_millis(placed_at, self.natural_time, now);
        (remaining > 0).then_some(remaining)
    }

    /// Forget a placement regardless of age.
    pub fn forget(&self, key: &LocationKey) -> bool {
        let removed = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            self.clear_audit(key);
        }
        removed
    }

    /// Evict every record whose window has elapsed; returns how many were dropped.
    pub fn sweep(&self, now: u64) -> usize {
        let mut expired = Vec::new();
        {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            records.retain(|key, placed_at| {
                let keep = !is_window_elapsed(*placed_at, self.natural_time, now);
                if !keep {
                    expired.push(key.clone());
                }
                keep
            });
        }
        for key in &expired {
            self.clear_audit(key);
        }
        if !expired.is_empty() {
            log::debug!("anti-exploit sweep evicted {} placements", expired.len());
        }
        expired.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear_audit(&self, key: &LocationKey) {
        if let Some(audit) = &self.audit {
            audit.clear_placement(key.to_string());
        }
    }

    /// Run [`Self::sweep`] every `period` on `handle` until aborted.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        clock: Arc<dyn Clock>,
        handle: &Handle,
        period: Duration,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tracker.sweep(clock.now_millis());
            }
        })
    }
}
