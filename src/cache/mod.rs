//! Single-slot cache for the most recent flag status
//!
//! Holds at most one entry stamped with the time it was fetched. Entries are
//! served only while younger than the configured duration; an expired entry
//! behaves exactly like an empty slot.

mod manager;

pub use manager::{CacheInfo, SlotCache};
