//! Time-bounded single-slot cache
//!
//! Provides a `SlotCache` that keeps the last successfully fetched value along
//! with its fetch timestamp, measured against an injectable `Clock`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// The cached value and when it was fetched
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    /// The cached data
    data: T,
    /// When the data was fetched
    fetched_at: DateTime<Utc>,
}

/// Snapshot of the cache slot for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    /// Whether a fresh entry is present
    pub has_cache: bool,
    /// Age of the fresh entry in milliseconds
    pub age: Option<i64>,
}

/// Holds at most one value, valid for a fixed duration after it was stored
///
/// The slot lock is held only while reading or replacing the entry, never
/// across an await point.
pub struct SlotCache<T> {
    slot: Mutex<Option<CacheEntry<T>>>,
    /// How long an entry may be served, in milliseconds
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> SlotCache<T> {
    /// Creates an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            clock,
        }
    }

    /// Returns the cached value if it is still fresh
    ///
    /// An expired entry is dropped from the slot and `None` is returned.
    pub fn get(&self) -> Option<T> {
        let now = self.clock.now();
        let mut slot = self.slot.lock();

        match slot.as_ref() {
            Some(entry) if self.is_fresh(entry, now) => Some(entry.data.clone()),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    /// Replaces the slot with `data`, stamped with the current time
    pub fn store(&self, data: T) {
        let entry = CacheEntry {
            data,
            fetched_at: self.clock.now(),
        };
        *self.slot.lock() = Some(entry);
    }

    /// Empties the slot
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    /// Describes the slot; an expired entry is reported as no cache
    pub fn info(&self) -> CacheInfo {
        let now = self.clock.now();
        let slot = self.slot.lock();

        match slot.as_ref() {
            Some(entry) if self.is_fresh(entry, now) => CacheInfo {
                has_cache: true,
                age: Some(Self::age_ms(entry, now)),
            },
            _ => CacheInfo::default(),
        }
    }

    /// An entry stamped in the future (the clock stepped backward) is stale
    fn is_fresh(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        (0..self.ttl_ms).contains(&Self::age_ms(entry, now))
    }

    fn age_ms(entry: &CacheEntry<T>, now: DateTime<Utc>) -> i64 {
        (now - entry.fetched_at).num_milliseconds()
    }
}
