//! Edge enforcement of the kill switch
//!
//! Runs before any handler. While the switch is active every request that is
//! not a diagnostic endpoint or a static asset is answered with a 307 to the
//! configured target, carrying the original path as `from`.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use futures::FutureExt;
use reqwest::Url;
use thiserror::Error;

use super::AppState;

/// Path prefixes that never go through the kill switch
pub const BYPASS_PREFIXES: &[&str] = &[
    "/api/health",
    "/api/kill-switch-status",
    "/api/test-kill-switch",
    "/_next",
    "/static",
    "/favicon.ico",
    "/public",
];

/// File extensions served without a kill switch check
pub const STATIC_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "ico", "css", "js", "svg"];

/// Errors building the redirect response
#[derive(Debug, Error)]
pub enum GateError {
    /// The configured target is not an absolute URL
    #[error("Invalid redirect target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
}

/// Whether `path` skips the kill switch entirely
pub fn should_bypass(path: &str) -> bool {
    if BYPASS_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return true;
    }

    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| STATIC_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Builds the redirect location for an active kill switch
///
/// `from` and `message` replace any parameters of the same name already on
/// the target; other parameters are kept in order.
///
/// # Arguments
/// * `target` - Absolute URL to redirect to
/// * `from` - Path and query of the blocked request
/// * `message` - Optional reason to forward
pub fn redirect_url(target: &str, from: &str, message: Option<&str>) -> Result<Url, GateError> {
    let mut url = Url::parse(target).map_err(|e| GateError::InvalidTarget {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "from" && key != "message")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        pairs.append_pair("from", from);
        if let Some(message) = message {
            pairs.append_pair("message", message);
        }
    }

    Ok(url)
}

/// Axum middleware that redirects away from the site while the switch is on
///
/// Fails open: an unusable target or a panic inside the status provider is
/// logged and the request continues to its handler.
pub async fn kill_switch_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if should_bypass(&path) {
        return next.run(request).await;
    }

    let status = match AssertUnwindSafe(state.status.check_status())
        .catch_unwind()
        .await
    {
        Ok(status) => status,
        Err(panic) => {
            tracing::error!(
                %path,
                reason = panic_reason(panic.as_ref()),
                "Kill switch middleware error"
            );
            return next.run(request).await;
        }
    };

    if status.should_redirect() {
        let from = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(&path);

        match redirect_url(&status.redirect_target, from, status.message.as_deref()) {
            Ok(location) => {
                tracing::info!(redirect = %location, from, "Kill switch active, redirecting");
                return Redirect::temporary(location.as_str()).into_response();
            }
            Err(error) => {
                tracing::warn!(%error, "Kill switch active but redirect target is unusable");
            }
        }
    }

    next.run(request).await
}

fn panic_reason(panic: &(dyn Any + Send)) -> &str {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason
    } else {
        "unknown panic"
    }
}
