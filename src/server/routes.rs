//! Route handlers
//!
//! Diagnostic endpoints for the kill switch plus the placeholder site page.

use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::killswitch::{FlagStatus, StatusReport};

/// Header carrying the admin token for cache clearing
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Reported in place of the source URL when no override is configured
pub const DEFAULT_SOURCE_LABEL: &str = "Using default";

const PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>BessZone</title></head>
<body><main><h1>BessZone</h1></main></body>
</html>
"#;

/// Body of `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub timestamp: String,
    pub kill_switch: HealthKillSwitch,
}

/// Kill switch summary inside `HealthReport`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthKillSwitch {
    pub enabled: bool,
    pub last_checked: String,
    pub gist_url: String,
}

/// Body of `GET /api/test-kill-switch`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchTestReport {
    pub test: String,
    pub current_status: FlagStatus,
    pub instructions: Instructions,
    pub gist_url: String,
}

/// Operator instructions for flipping the switch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instructions {
    pub activate: String,
    pub deactivate: String,
    pub change_redirect: String,
}

/// Body of `GET /api/test`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTestReport {
    pub status: String,
    pub environment: String,
    pub timestamp: String,
}

/// Current time in the ISO-8601 form browsers produce
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let status = state.status.check_status().await;
    let now = iso_now();

    let gist_url = if state.source_overridden {
        state.source_url.clone()
    } else {
        DEFAULT_SOURCE_LABEL.to_string()
    };

    Json(HealthReport {
        status: "ok".to_string(),
        timestamp: now.clone(),
        kill_switch: HealthKillSwitch {
            enabled: status.enabled,
            last_checked: now,
            gist_url,
        },
    })
}

/// `GET /api/kill-switch-status`, polled by the client watcher
pub async fn kill_switch_status(State(state): State<AppState>) -> impl IntoResponse {
    let kill_switch = state.status.check_status().await;

    let report = StatusReport {
        kill_switch,
        server_time: iso_now(),
        cache_info: state.status.cache_info(),
    };

    ([(CACHE_CONTROL, "no-store")], Json(report))
}

/// `GET /api/test-kill-switch`
pub async fn test_kill_switch(State(state): State<AppState>) -> Json<KillSwitchTestReport> {
    let current_status = state.status.check_status().await;

    Json(KillSwitchTestReport {
        test: "Kill Switch Test".to_string(),
        current_status,
        instructions: Instructions {
            activate: r#"Set "killSwitch": true in the flag document"#.to_string(),
            deactivate: r#"Set "killSwitch": false in the flag document"#.to_string(),
            change_redirect: r#"Update "redirectUrl" in the flag document"#.to_string(),
        },
        gist_url: state.source_url.clone(),
    })
}

/// `GET /api/test`
pub async fn api_test(State(state): State<AppState>) -> Json<ApiTestReport> {
    Json(ApiTestReport {
        status: "API is working".to_string(),
        environment: state.environment.clone(),
        timestamp: iso_now(),
    })
}

/// `POST /api/kill-switch-status/clear`
///
/// Only mounted when an admin token is configured. Answers 204 once the cache
/// is dropped, 401 for a missing or wrong token and 501 when the status
/// provider keeps no cache.
pub async fn clear_cache(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    match (state.admin_token.as_deref(), presented) {
        (Some(expected), Some(given)) if tokens_match(expected, given) => {
            if state.status.clear_cache() {
                tracing::info!("kill switch cache cleared");
                StatusCode::NO_CONTENT
            } else {
                tracing::warn!("kill switch provider has no cache to clear");
                StatusCode::NOT_IMPLEMENTED
            }
        }
        _ => {
            tracing::warn!("rejected kill switch cache clear");
            StatusCode::UNAUTHORIZED
        }
    }
}

/// Compares tokens in time that depends only on their lengths
fn tokens_match(expected: &str, given: &str) -> bool {
    if expected.len() != given.len() {
        return false;
    }

    let diff = expected
        .bytes()
        .zip(given.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    std::hint::black_box(diff) == 0
}

/// Placeholder for every site page
pub async fn page() -> Html<&'static str> {
    Html(PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_now_has_millis_and_zulu() {
        let now = iso_now();
        assert!(now.ends_with('Z'), "{now}");
        // 2026-01-01T00:00:00.000Z
        assert_eq!(now.len(), 24, "{now}");
    }

    #[tokio::test]
    async fn test_page_is_html() {
        let response = page().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3creT"));
        assert!(!tokens_match("s3cret", "s3cre"));
        assert!(!tokens_match("s3cret", ""));
        assert!(tokens_match("", ""));
    }

    #[test]
    fn test_health_report_wire_names() {
        let report = HealthReport {
            status: "ok".to_string(),
            timestamp: "t".to_string(),
            kill_switch: HealthKillSwitch {
                enabled: false,
                last_checked: "t".to_string(),
                gist_url: DEFAULT_SOURCE_LABEL.to_string(),
            },
        };

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["killSwitch"]["lastChecked"], "t");
        assert_eq!(json["killSwitch"]["gistUrl"], "Using default");
    }
}
