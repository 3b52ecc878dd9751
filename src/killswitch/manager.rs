//! Flag status manager
//!
//! Fetches the operator's flag document over HTTP, caches the normalized
//! status for a bounded time, and falls back to a disabled status whenever the
//! document cannot be read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use reqwest::Client;
use serde_json::Value;

use super::{FlagError, FlagStatus, StatusProvider};
use crate::cache::{CacheInfo, SlotCache};
use crate::clock::{Clock, SystemClock};

/// Flag document used when no override is configured
pub const DEFAULT_FLAG_URL: &str =
    "https://gist.githubusercontent.com/jibon8161/4995d64b8c27d3f5fece51d09e371b5f/raw/kill-switch.json";

/// Redirect target used when the document enables the switch without one
pub const DEFAULT_REDIRECT_URL: &str = "https://google.com";

/// How long a fetched status is served before refetching
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(60);

/// Upper bound on a single fetch, body included
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a `FlagStatusManager`
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// URL of the flag document
    pub source_url: String,
    /// How long a fetched status stays fresh
    pub cache_duration: Duration,
    /// Abort a fetch after this long
    pub fetch_timeout: Duration,
    /// Redirect target when the document omits one
    pub fallback_redirect: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_FLAG_URL.to_string(),
            cache_duration: DEFAULT_CACHE_DURATION,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            fallback_redirect: DEFAULT_REDIRECT_URL.to_string(),
        }
    }
}

/// Fetches and caches the remote kill switch status
///
/// Construct one per process and share it behind an `Arc`. Concurrent callers
/// that all miss the cache each fetch; the last successful fetch wins the slot.
pub struct FlagStatusManager {
    client: Client,
    source_url: String,
    fetch_timeout: Duration,
    fallback_redirect: String,
    cache: SlotCache<FlagStatus>,
}

impl FlagStatusManager {
    /// Creates a manager using wall-clock time for expiry
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a manager with a custom clock
    pub fn with_clock(config: ManagerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: Client::new(),
            source_url: config.source_url,
            fetch_timeout: config.fetch_timeout,
            fallback_redirect: config.fallback_redirect,
            cache: SlotCache::new(config.cache_duration, clock),
        }
    }

    /// URL of the flag document
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Returns the current status
    ///
    /// # Behavior
    /// - Serves a fresh cached status without touching the network
    /// - Otherwise fetches the document and caches the result
    /// - On any failure logs it, leaves the cache alone and returns
    ///   `FlagStatus::unavailable()`
    pub async fn check_status(&self) -> FlagStatus {
        if let Some(cached) = self.cache.get() {
            tracing::debug!(enabled = cached.enabled, "kill switch status served from cache");
            return cached;
        }

        match self.fetch_remote().await {
            Ok(status) => {
                tracing::debug!(
                    enabled = status.enabled,
                    redirect = %status.redirect_target,
                    "fetched kill switch status"
                );
                self.cache.store(status.clone());
                status
            }
            Err(error) => {
                tracing::warn!(%error, url = %self.source_url, "Failed to check kill switch");
                FlagStatus::unavailable()
            }
        }
    }

    /// Drops the cached status, forcing the next check to refetch
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Describes the cached status
    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    /// Fetches the flag document directly from the source
    async fn fetch_remote(&self) -> Result<FlagStatus, FlagError> {
        let request = self
            .client
            .get(&self.source_url)
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(PRAGMA, "no-cache")
            .header(EXPIRES, "0");

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FlagError::HttpStatus(status.as_u16()));
            }
            Ok::<_, FlagError>(response.text().await?)
        };

        let body = tokio::time::timeout(self.fetch_timeout, exchange)
            .await
            .map_err(|_| FlagError::Timeout(self.fetch_timeout))??;

        let document: Value = serde_json::from_str(&body)?;
        FlagStatus::from_remote(&document, &self.fallback_redirect)
    }
}

#[async_trait]
impl StatusProvider for FlagStatusManager {
    async fn check_status(&self) -> FlagStatus {
        FlagStatusManager::check_status(self).await
    }

    fn cache_info(&self) -> CacheInfo {
        FlagStatusManager::cache_info(self)
    }

    fn clear_cache(&self) -> bool {
        FlagStatusManager::clear_cache(self);
        true
    }
}
