//! Kill switch status types and remote document normalization

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FlagError;
use crate::cache::CacheInfo;

/// Message carried by the fallback status when the source cannot be read
pub const UNAVAILABLE_MESSAGE: &str = "Unable to verify kill switch status";

/// Normalized kill switch state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagStatus {
    /// Whether traffic should be diverted
    pub enabled: bool,
    /// Where to send traffic; empty when the status is unknown
    #[serde(rename = "redirectUrl", default)]
    pub redirect_target: String,
    /// Human-readable reason, forwarded on redirect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Informational timestamp from the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl FlagStatus {
    /// The fail-open status returned whenever the source cannot be read
    pub fn unavailable() -> Self {
        Self {
            enabled: false,
            redirect_target: String::new(),
            message: Some(UNAVAILABLE_MESSAGE.to_string()),
            updated_at: None,
        }
    }

    /// Whether this status calls for a redirect
    pub fn should_redirect(&self) -> bool {
        self.enabled && !self.redirect_target.is_empty()
    }

    /// Builds a status from the operator's JSON document
    ///
    /// # Arguments
    /// * `document` - Parsed response body
    /// * `fallback_redirect` - Target used when `redirectUrl` is missing or empty
    ///
    /// # Returns
    /// * `Ok(FlagStatus)` for any JSON object
    /// * `Err(FlagError::MalformedResponse)` if the document is not an object
    pub fn from_remote(document: &Value, fallback_redirect: &str) -> Result<Self, FlagError> {
        let fields = document.as_object().ok_or_else(|| {
            FlagError::MalformedResponse(format!("expected a JSON object, got {}", kind(document)))
        })?;

        let redirect_target = match fields.get("redirectUrl").and_then(Value::as_str) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => fallback_redirect.to_string(),
        };

        Ok(Self {
            enabled: fields.get("killSwitch").map(is_truthy).unwrap_or(false),
            redirect_target,
            message: string_field(document, "message"),
            updated_at: string_field(document, "updatedAt"),
        })
    }
}

/// Payload of the status-reporting endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Current status
    pub kill_switch: FlagStatus,
    /// Server time in ISO-8601
    pub server_time: String,
    /// State of the server's cache
    pub cache_info: CacheInfo,
}

/// Coerces a flag value to a boolean
///
/// Follows loose truthiness, except that the strings operators commonly type
/// to mean "off" count as false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty()
                || ["false", "0", "no", "off"]
                    .iter()
                    .any(|off| s.eq_ignore_ascii_case(off)))
        }
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_field(document: &Value, key: &str) -> Option<String> {
    document.get(key).and_then(Value::as_str).map(str::to_string)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
