//! Backup kill switch poller
//!
//! Covers pages that were served without passing through the edge gate (a
//! cached response, a CDN edge case). A background task polls the
//! status-reporting endpoint and signals a navigation over a tokio channel as
//! soon as the switch is seen active.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;

use crate::killswitch::{FlagError, FlagStatus, StatusProvider, StatusReport};

/// Path of the status-reporting endpoint
pub const STATUS_PATH: &str = "/api/kill-switch-status";

/// Messages sent from the poller to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A check completed without triggering a redirect
    Checked { enabled: bool },
    /// The switch is active; navigate to `target`. No events follow.
    Redirect { target: String },
}

/// Configuration for the poller
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Time between checks
    pub interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Handle for a running poller
///
/// Dropping the handle stops the poller.
pub struct WatchHandle {
    /// Channel for receiving poll results
    pub receiver: mpsc::Receiver<WatchEvent>,
    shutdown_tx: mpsc::Sender<()>,
}

impl WatchHandle {
    /// Spawns a poller that checks immediately and then on every interval tick
    ///
    /// # Arguments
    /// * `provider` - Where to read the status from
    /// * `config` - Poll interval; must be non-zero
    pub fn spawn(provider: Arc<dyn StatusProvider>, config: WatchConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let status = provider.check_status().await;

                        if status.should_redirect() {
                            tracing::info!(
                                redirect = %status.redirect_target,
                                "Client-side kill switch triggered"
                            );
                            let _ = event_tx
                                .send(WatchEvent::Redirect { target: status.redirect_target })
                                .await;
                            break;
                        }

                        // A slow reader only misses intermediate results
                        if let Err(TrySendError::Closed(_)) =
                            event_tx.try_send(WatchEvent::Checked { enabled: status.enabled })
                        {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            tracing::debug!("kill switch watcher stopped");
        });

        Self {
            receiver: event_rx,
            shutdown_tx,
        }
    }

    /// Waits for the next poll result
    ///
    /// Returns `None` once the poller has stopped.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.receiver.recv().await
    }

    /// Stops the poller
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Checks for a pending poll result without blocking
pub fn try_recv(handle: &mut WatchHandle) -> Option<WatchEvent> {
    handle.receiver.try_recv().ok()
}

/// Reads the kill switch from a running site's status endpoint
#[derive(Debug, Clone)]
pub struct StatusEndpointClient {
    client: Client,
    status_url: String,
    timeout: Duration,
}

impl StatusEndpointClient {
    /// Creates a client for the full URL of the status endpoint
    pub fn new(status_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            status_url: status_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Creates a client for the site at `base_url`
    pub fn for_site(base_url: &str) -> Self {
        Self::new(format!("{}{}", base_url.trim_end_matches('/'), STATUS_PATH))
    }

    /// Sets the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL being polled
    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    /// Fetches the full status report, bypassing any HTTP cache
    pub async fn fetch_report(&self) -> Result<StatusReport, FlagError> {
        let response = self
            .client
            .get(&self.status_url)
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache")
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlagError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl StatusProvider for StatusEndpointClient {
    async fn check_status(&self) -> FlagStatus {
        match self.fetch_report().await {
            Ok(report) => report.kill_switch,
            Err(error) => {
                tracing::warn!(
                    %error,
                    url = %self.status_url,
                    "Client-side kill switch check failed"
                );
                FlagStatus::unavailable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that replays a fixed status and counts calls
    struct FixedProvider {
        status: FlagStatus,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(status: FlagStatus) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StatusProvider for FixedProvider {
        async fn check_status(&self) -> FlagStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.status.clone()
        }
    }

    fn active() -> FlagStatus {
        FlagStatus {
            enabled: true,
            redirect_target: "https://elsewhere.example".to_string(),
            message: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_watch_config_default() {
        let config = WatchConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
    }

    #[test]
    fn test_for_site_appends_status_path() {
        let client = StatusEndpointClient::for_site("http://localhost:3000/");
        assert_eq!(client.status_url(), "http://localhost:3000/api/kill-switch-status");
    }

    #[tokio::test]
    async fn test_redirects_on_first_check_and_stops() {
        let provider = FixedProvider::new(active());
        let mut handle = WatchHandle::spawn(provider.clone(), WatchConfig::default());

        let event = handle.next_event().await;

        assert_eq!(
            event,
            Some(WatchEvent::Redirect {
                target: "https://elsewhere.example".to_string()
            })
        );
        assert_eq!(handle.next_event().await, None, "poller stops after redirecting");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enabled_without_target_does_not_redirect() {
        let provider = FixedProvider::new(FlagStatus {
            redirect_target: String::new(),
            ..active()
        });
        let mut handle = WatchHandle::spawn(provider, WatchConfig::default());

        assert_eq!(handle.next_event().await, Some(WatchEvent::Checked { enabled: true }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval() {
        let provider = FixedProvider::new(FlagStatus::unavailable());
        let mut handle = WatchHandle::spawn(provider.clone(), WatchConfig::default());

        assert_eq!(handle.next_event().await, Some(WatchEvent::Checked { enabled: false }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // Paused time auto-advances to the next tick while we wait
        assert_eq!(handle.next_event().await, Some(WatchEvent::Checked { enabled: false }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_polling() {
        let provider = FixedProvider::new(FlagStatus::unavailable());
        let mut handle = WatchHandle::spawn(provider.clone(), WatchConfig::default());
        assert!(handle.next_event().await.is_some());

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let provider = FixedProvider::new(FlagStatus::unavailable());
        let mut handle = WatchHandle::spawn(provider.clone(), WatchConfig::default());
        assert!(handle.next_event().await.is_some());

        drop(handle);
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_try_recv_empty_before_first_check() {
        let provider = FixedProvider::new(FlagStatus::unavailable());
        let mut handle = WatchHandle::spawn(provider, WatchConfig::default());

        // The poller has not been scheduled yet
        assert!(try_recv(&mut handle).is_none());
        assert!(handle.next_event().await.is_some());
    }

    #[tokio::test]
    async fn test_endpoint_client_unreachable_is_safe_default() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = StatusEndpointClient::for_site(&format!("http://{}", addr))
            .with_timeout(Duration::from_secs(1));

        assert!(client.fetch_report().await.is_err());
        assert_eq!(client.check_status().await, FlagStatus::unavailable());
    }
}
