//! Content-transform registry: human-readable renderings of message bodies.
//!
//! A transform turns a raw body into a description plus line-oriented
//! text. Clients pick a transform by name; `auto` chooses one from the
//! message's `Content-Type`. A transform that fails on a given body falls
//! back to the raw rendering rather than erroring the request.

use crate::flow::Headers;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// A rendered message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    /// Short description of the transform applied, e.g. `JSON`.
    pub description: String,
    /// Line-oriented text.
    pub lines: Vec<String>,
}

/// A transform could not interpret a body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct RenderError(String);

/// One registered transform.
pub trait ContentView: Send + Sync {
    /// Registry name, as used in request paths.
    fn name(&self) -> &'static str;

    /// Render `body`; `headers` are the owning message's headers.
    fn render(&self, headers: &Headers, body: &[u8]) -> Result<Rendered, RenderError>;
}

/// Pass the body through as (lossily decoded) text.
struct RawView;

impl ContentView for RawView {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn render(&self, _headers: &Headers, body: &[u8]) -> Result<Rendered, RenderError> {
        Ok(Rendered {
            description: "Raw".to_string(),
            lines: String::from_utf8_lossy(body).lines().map(str::to_owned).collect(),
        })
    }
}

const HEX_ROW: usize = 16;

/// Classic hexdump: offset, hex bytes, printable-ASCII gutter.
struct HexView;

impl ContentView for HexView {
    fn name(&self) -> &'static str {
        "hex"
    }

    fn render(&self, _headers: &Headers, body: &[u8]) -> Result<Rendered, RenderError> {
        let lines = body
            .chunks(HEX_ROW)
            .enumerate()
            .map(|(i, chunk)| {
                let hex_part: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
                let ascii: String = chunk
                    .iter()
                    .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
                    .collect();
                format!("{:08x}  {:<47}  |{}|", i * HEX_ROW, hex_part.join(" "), ascii)
            })
            .collect();
        Ok(Rendered {
            description: "Hex".to_string(),
            lines,
        })
    }
}

/// Pretty-printed JSON.
struct JsonView;

impl ContentView for JsonView {
    fn name(&self) -> &'static str {
        "json"
    }

    fn render(&self, _headers: &Headers, body: &[u8]) -> Result<Rendered, RenderError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| RenderError(format!("invalid JSON: {e}")))?;
        let pretty = serde_json::to_string_pretty(&value)
            .map_err(|e| RenderError(format!("cannot render JSON: {e}")))?;
        Ok(Rendered {
            description: "JSON".to_string(),
            lines: pretty.lines().map(str::to_owned).collect(),
        })
    }
}

/// Name of the content-type-driven transform.
pub const AUTO_VIEW: &str = "auto";

/// Registry of named transforms.
pub struct ContentViewRegistry {
    views: Vec<Box<dyn ContentView>>,
}

impl Default for ContentViewRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ContentViewRegistry {
    /// Registry with the built-in transforms (`raw`, `hex`, `json`).
    pub fn with_defaults() -> Self {
        Self {
            views: vec![Box::new(RawView), Box::new(HexView), Box::new(JsonView)],
        }
    }

    /// Add a transform. Later registrations shadow earlier names.
    pub fn register(&mut self, view: Box<dyn ContentView>) {
        self.views.insert(0, view);
    }

    /// All transform names, `auto` first.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![AUTO_VIEW.to_string()];
        names.extend(self.views.iter().map(|v| v.name().to_string()));
        names
    }

    fn pick_auto(&self, headers: &Headers) -> &'static str {
        let content_type = headers.get("content-type").unwrap_or("");
        if content_type.contains("json") {
            "json"
        } else {
            "raw"
        }
    }

    /// Render `body` with the named transform.
    ///
    /// `None` for an unknown name. A transform failure falls back to the
    /// raw rendering, with the failure noted in the description.
    pub fn render(&self, name: &str, headers: &Headers, body: &[u8]) -> Option<Rendered> {
        let resolved = if name == AUTO_VIEW {
            self.pick_auto(headers)
        } else {
            name
        };
        let view = self.views.iter().find(|v| v.name() == resolved)?;
        match view.render(headers, body) {
            Ok(rendered) => Some(rendered),
            Err(e) => {
                debug!(view = resolved, "transform failed, falling back to raw: {e}");
                let mut fallback = RawView.render(headers, body).ok()?;
                fallback.description = format!("{} (couldn't parse, falling back to Raw)", resolved);
                Some(fallback)
            }
        }
    }
}
