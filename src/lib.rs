//! BessZone kill switch gate
//!
//! This module exposes the flag manager, the HTTP gate and the backup poller
//! for use by the binary and integration tests.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod killswitch;
pub mod server;
pub mod watcher;
