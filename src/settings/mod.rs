//! Engine-wide toggles exposed through the control surface.
//!
//! Writes are whitelist-keyed partial updates: recognized names are
//! applied and reported back as the changed subset, unrecognized names
//! (and recognized names carrying a value of the wrong shape) are logged
//! and silently ignored. That leniency is deliberate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// The toggle set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Interception filter expression; `None` disables interception.
    pub intercept: Option<String>,
    /// Rewrite displayed hosts using the Host header.
    pub showhost: bool,
    /// Do not fetch upstream certificates.
    pub no_upstream_cert: bool,
    /// Forward unrecognized protocols as raw TCP.
    pub rawtcp: bool,
    /// Negotiate HTTP/2 upstream.
    pub http2: bool,
    /// Strip cache-control request headers.
    pub anticache: bool,
    /// Strip accept-encoding request headers.
    pub anticomp: bool,
    /// Sticky-auth filter expression.
    pub stickyauth: Option<String>,
    /// Sticky-cookie filter expression.
    pub stickycookie: Option<String>,
    /// Stream bodies larger than this many bytes instead of buffering.
    #[serde(rename = "stream")]
    pub stream_large_bodies: Option<u64>,
}

fn take_opt_string(key: &str, value: &Value) -> Result<Option<String>, ()> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => {
            warn!("ignoring setting {key}: expected a string or null");
            Err(())
        }
    }
}

fn take_bool(key: &str, value: &Value) -> Result<bool, ()> {
    match value.as_bool() {
        Some(b) => Ok(b),
        None => {
            warn!("ignoring setting {key}: expected a boolean");
            Err(())
        }
    }
}

impl Settings {
    /// Apply a partial update, returning exactly the toggles that were
    /// applied (name → new value).
    ///
    /// Unrecognized names and mistyped values are logged and skipped.
    pub fn apply(&mut self, patch: &Map<String, Value>) -> Map<String, Value> {
        let mut changed = Map::new();
        for (key, value) in patch {
            let applied = match key.as_str() {
                "intercept" => take_opt_string(key, value)
                    .map(|v| self.intercept = v)
                    .is_ok(),
                "showhost" => take_bool(key, value).map(|v| self.showhost = v).is_ok(),
                "no_upstream_cert" => take_bool(key, value)
                    .map(|v| self.no_upstream_cert = v)
                    .is_ok(),
                "rawtcp" => take_bool(key, value).map(|v| self.rawtcp = v).is_ok(),
                "http2" => take_bool(key, value).map(|v| self.http2 = v).is_ok(),
                "anticache" => take_bool(key, value).map(|v| self.anticache = v).is_ok(),
                "anticomp" => take_bool(key, value).map(|v| self.anticomp = v).is_ok(),
                "stickyauth" => take_opt_string(key, value)
                    .map(|v| self.stickyauth = v)
                    .is_ok(),
                "stickycookie" => take_opt_string(key, value)
                    .map(|v| self.stickycookie = v)
                    .is_ok(),
                "stream" => match value {
                    Value::Null => {
                        self.stream_large_bodies = None;
                        true
                    }
                    _ => match value.as_u64() {
                        Some(n) => {
                            self.stream_large_bodies = Some(n);
                            true
                        }
                        None => {
                            warn!("ignoring setting stream: expected a byte count or null");
                            false
                        }
                    },
                },
                _ => {
                    warn!("ignoring unrecognized setting {key}");
                    false
                }
            };
            if applied {
                changed.insert(key.clone(), value.clone());
            }
        }
        changed
    }
}

/// Payload of a settings read: the toggles plus read-only context.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsReport {
    /// Crate version.
    pub version: String,
    /// Engine operating mode, e.g. `regular`.
    pub mode: String,
    /// The toggle set.
    #[serde(flatten)]
    pub settings: Settings,
    /// Registered content-transform names.
    #[serde(rename = "contentViews")]
    pub content_views: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_apply_reports_exactly_the_changed_subset() {
        let mut settings = Settings::default();
        let changed = settings.apply(&patch(json!({
            "http2": true,
            "intercept": "~d example.com",
            "does_not_exist": 42
        })));

        assert!(settings.http2);
        assert_eq!(settings.intercept.as_deref(), Some("~d example.com"));
        assert_eq!(changed.len(), 2);
        assert!(changed.contains_key("http2"));
        assert!(changed.contains_key("intercept"));
        assert!(!changed.contains_key("does_not_exist"));
    }

    #[test]
    fn test_mistyped_value_is_skipped_not_rejected() {
        let mut settings = Settings::default();
        let changed = settings.apply(&patch(json!({"showhost": "yes", "rawtcp": true})));

        assert!(!settings.showhost);
        assert!(settings.rawtcp);
        assert_eq!(changed.len(), 1);
    }

    #[test]
    fn test_null_clears_optional_settings() {
        let mut settings = Settings {
            intercept: Some("~u /api".into()),
            stream_large_bodies: Some(1024),
            ..Default::default()
        };
        let changed = settings.apply(&patch(json!({"intercept": null, "stream": null})));

        assert!(settings.intercept.is_none());
        assert!(settings.stream_large_bodies.is_none());
        assert_eq!(changed.len(), 2);
    }

    #[test]
    fn test_report_flattens_toggles() {
        let report = SettingsReport {
            version: "0.1.0".into(),
            mode: "regular".into(),
            settings: Settings {
                http2: true,
                ..Default::default()
            },
            content_views: vec!["auto".into(), "raw".into()],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["http2"], true);
        assert_eq!(value["mode"], "regular");
        assert_eq!(value["contentViews"][0], "auto");
    }
}
