//! Request and response messages carried by a flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered header list. Duplicate names are permitted and insertion order
/// is preserved, matching what was seen on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from name/value pairs, preserving order.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Append a header.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Remove all headers.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Replace the whole list with `pairs`.
    pub fn replace_all(&mut self, pairs: Vec<(String, String)>) {
        self.0 = pairs;
    }

    /// Iterate name/value pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers, duplicates counted.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Owned name/value pairs, for wire summaries.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0.clone()
    }
}

/// Which message of a flow an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePart {
    /// The client request.
    Request,
    /// The server response.
    Response,
}

impl MessagePart {
    /// Path-segment spelling, as used on the wire surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagePart::Request => "request",
            MessagePart::Response => "response",
        }
    }

    /// Parse a path segment; anything but `request`/`response` is `None`.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "request" => Some(MessagePart::Request),
            "response" => Some(MessagePart::Response),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessagePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// HTTP method.
    pub method: String,
    /// URL scheme (`http`, `https`).
    pub scheme: String,
    /// Target host.
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Request path, including query string.
    pub path: String,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub http_version: String,
    /// Ordered header list.
    pub headers: Headers,
    /// Raw body bytes.
    pub body: Vec<u8>,
    /// When the first byte was seen.
    pub timestamp_start: Option<DateTime<Utc>>,
    /// When the last byte was seen.
    pub timestamp_end: Option<DateTime<Utc>>,
    /// Whether this request was re-issued by the engine.
    pub is_replay: bool,
}

/// A captured server response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version, e.g. `HTTP/1.1`.
    pub http_version: String,
    /// Status code.
    pub status_code: u16,
    /// Reason phrase.
    pub reason: String,
    /// Ordered header list.
    pub headers: Headers,
    /// Raw body bytes.
    pub body: Vec<u8>,
    /// When the first byte was seen.
    pub timestamp_start: Option<DateTime<Utc>>,
    /// When the last byte was seen.
    pub timestamp_end: Option<DateTime<Utc>>,
    /// Whether this response came from a replayed request.
    pub is_replay: bool,
}
