//! Remote kill switch
//!
//! The kill switch is a JSON document hosted somewhere the site operator can
//! edit (a gist by default). When its `killSwitch` field is truthy, every page
//! request is redirected to `redirectUrl`.
//!
//! `FlagStatusManager` fetches and caches that document. The edge middleware
//! and the client poller both consume it through `StatusProvider`, so caching,
//! fetching and the fail-open fallback live in one place.

pub mod manager;
pub mod status;

pub use manager::{FlagStatusManager, ManagerConfig, DEFAULT_FLAG_URL, DEFAULT_REDIRECT_URL};
pub use status::{FlagStatus, StatusReport, UNAVAILABLE_MESSAGE};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::CacheInfo;

/// Errors that can occur when fetching the remote flag document
///
/// None of these escape the manager: each one is logged and turned into the
/// disabled fallback status.
#[derive(Debug, Error)]
pub enum FlagError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// No response within the fetch timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Remote answered with a non-success status
    #[error("Flag source returned HTTP {0}")]
    HttpStatus(u16),

    /// Body was not valid JSON
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Body was JSON but not a flag document
    #[error("Malformed flag document: {0}")]
    MalformedResponse(String),
}

/// Anything that can report the current kill switch status
///
/// `check_status` never fails; implementations resolve every error to
/// `FlagStatus::unavailable()`.
#[async_trait]
pub trait StatusProvider: Send + Sync {
    /// Returns the current status, possibly from cache
    async fn check_status(&self) -> FlagStatus;

    /// Describes any cached status
    fn cache_info(&self) -> CacheInfo {
        CacheInfo::default()
    }

    /// Drops any cached status so the next check goes to the source
    ///
    /// Returns `false` when the provider keeps no cache, so there was nothing
    /// to clear.
    fn clear_cache(&self) -> bool {
        false
    }
}
