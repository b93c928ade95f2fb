//! Typed partial edits of a flow's request/response.
//!
//! The wire surface accepts a JSON field map (`PUT /flows/{id}`); that map
//! is parsed here into a closed set of typed edit operations. Recognized
//! keys are whitelisted per sub-object; unrecognized keys are collected,
//! logged and ignored, never rejected outright. Recognized keys with a
//! value of the wrong shape are a malformed payload.

use super::{Flow, Headers};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Parse or apply failure for an edit payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatchError {
    /// The payload (or a sub-object) was not a JSON object.
    #[error("edit payload must be a JSON object")]
    NotAnObject,
    /// A recognized key carried a value of the wrong shape.
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// One request field replacement.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestField {
    /// Replace the method.
    Method(String),
    /// Replace the scheme.
    Scheme(String),
    /// Replace the host.
    Host(String),
    /// Replace the port.
    Port(u16),
    /// Replace the path.
    Path(String),
    /// Replace the protocol version.
    HttpVersion(String),
    /// Replace the whole header list.
    Headers(Vec<(String, String)>),
    /// Replace the body with this text.
    Content(String),
}

/// One response field replacement.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseField {
    /// Replace the status code (wire key `code`).
    StatusCode(u16),
    /// Replace the reason phrase (wire key `msg`).
    Reason(String),
    /// Replace the protocol version.
    HttpVersion(String),
    /// Replace the whole header list.
    Headers(Vec<(String, String)>),
    /// Replace the body with this text.
    Content(String),
}

/// One typed edit operation against a flow.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    /// Targets the request sub-object.
    Request(RequestField),
    /// Targets the response sub-object.
    Response(ResponseField),
}

/// A parsed partial edit: the ops to apply plus the keys that were
/// ignored as unrecognized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowPatch {
    /// Typed operations, in payload order.
    pub ops: Vec<EditOp>,
    /// Dotted names of unrecognized keys, e.g. `request.foo`.
    pub ignored: Vec<String>,
}

fn expect_str(target: &str, key: &str, value: &Value) -> Result<String, PatchError> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| PatchError::InvalidValue(format!("{target}.{key}"), "expected a string".into()))
}

fn expect_port(target: &str, key: &str, value: &Value) -> Result<u16, PatchError> {
    value
        .as_u64()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| {
            PatchError::InvalidValue(format!("{target}.{key}"), "expected a port number".into())
        })
}

fn expect_headers(target: &str, value: &Value) -> Result<Vec<(String, String)>, PatchError> {
    let invalid = || {
        PatchError::InvalidValue(
            format!("{target}.headers"),
            "expected an array of [name, value] pairs".into(),
        )
    };
    let rows = value.as_array().ok_or_else(invalid)?;
    let mut pairs = Vec::with_capacity(rows.len());
    for row in rows {
        let pair = row.as_array().ok_or_else(invalid)?;
        if pair.len() != 2 {
            return Err(invalid());
        }
        let name = pair[0].as_str().ok_or_else(invalid)?;
        let value = pair[1].as_str().ok_or_else(invalid)?;
        pairs.push((name.to_owned(), value.to_owned()));
    }
    Ok(pairs)
}

impl FlowPatch {
    /// Parse a JSON field map into typed ops.
    ///
    /// Unknown keys (top-level or nested) land in [`FlowPatch::ignored`];
    /// recognized keys with malformed values are an error.
    pub fn from_json(payload: &Value) -> Result<FlowPatch, PatchError> {
        let map = payload.as_object().ok_or(PatchError::NotAnObject)?;
        let mut patch = FlowPatch::default();

        for (target, fields) in map {
            match target.as_str() {
                "request" => {
                    let fields = fields.as_object().ok_or(PatchError::NotAnObject)?;
                    for (key, value) in fields {
                        let op = match key.as_str() {
                            "method" => RequestField::Method(expect_str("request", key, value)?),
                            "scheme" => RequestField::Scheme(expect_str("request", key, value)?),
                            "host" => RequestField::Host(expect_str("request", key, value)?),
                            "port" => RequestField::Port(expect_port("request", key, value)?),
                            "path" => RequestField::Path(expect_str("request", key, value)?),
                            "http_version" => {
                                RequestField::HttpVersion(expect_str("request", key, value)?)
                            }
                            "headers" => RequestField::Headers(expect_headers("request", value)?),
                            "content" => RequestField::Content(expect_str("request", key, value)?),
                            _ => {
                                patch.ignored.push(format!("request.{key}"));
                                continue;
                            }
                        };
                        patch.ops.push(EditOp::Request(op));
                    }
                }
                "response" => {
                    let fields = fields.as_object().ok_or(PatchError::NotAnObject)?;
                    for (key, value) in fields {
                        let op = match key.as_str() {
                            "code" => {
                                let code =
                                    value.as_u64().and_then(|n| u16::try_from(n).ok()).ok_or_else(
                                        || {
                                            PatchError::InvalidValue(
                                                "response.code".into(),
                                                "expected a status code".into(),
                                            )
                                        },
                                    )?;
                                ResponseField::StatusCode(code)
                            }
                            "msg" => ResponseField::Reason(expect_str("response", key, value)?),
                            "http_version" => {
                                ResponseField::HttpVersion(expect_str("response", key, value)?)
                            }
                            "headers" => {
                                ResponseField::Headers(expect_headers("response", value)?)
                            }
                            "content" => ResponseField::Content(expect_str("response", key, value)?),
                            _ => {
                                patch.ignored.push(format!("response.{key}"));
                                continue;
                            }
                        };
                        patch.ops.push(EditOp::Response(op));
                    }
                }
                _ => patch.ignored.push(target.clone()),
            }
        }

        Ok(patch)
    }

    /// Whether the patch carries no ops at all.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply the ops to `flow`.
    ///
    /// Ops addressed at an absent sub-object are skipped with a
    /// diagnostic; the returned count is the number of ops applied.
    pub fn apply(&self, flow: &mut Flow) -> usize {
        let mut applied = 0;
        for op in &self.ops {
            match op {
                EditOp::Request(field) => match flow.request.as_mut() {
                    Some(req) => {
                        match field {
                            RequestField::Method(v) => req.method = v.clone(),
                            RequestField::Scheme(v) => req.scheme = v.clone(),
                            RequestField::Host(v) => req.host = v.clone(),
                            RequestField::Port(v) => req.port = *v,
                            RequestField::Path(v) => req.path = v.clone(),
                            RequestField::HttpVersion(v) => req.http_version = v.clone(),
                            RequestField::Headers(pairs) => {
                                req.headers = Headers::from_pairs(pairs.clone())
                            }
                            RequestField::Content(text) => req.body = text.clone().into_bytes(),
                        }
                        applied += 1;
                    }
                    None => warn!(flow = %flow.id, ?field, "edit targets absent request; skipped"),
                },
                EditOp::Response(field) => match flow.response.as_mut() {
                    Some(resp) => {
                        match field {
                            ResponseField::StatusCode(v) => resp.status_code = *v,
                            ResponseField::Reason(v) => resp.reason = v.clone(),
                            ResponseField::HttpVersion(v) => resp.http_version = v.clone(),
                            ResponseField::Headers(pairs) => {
                                resp.headers = Headers::from_pairs(pairs.clone())
                            }
                            ResponseField::Content(text) => resp.body = text.clone().into_bytes(),
                        }
                        applied += 1;
                    }
                    None => warn!(flow = %flow.id, ?field, "edit targets absent response; skipped"),
                },
            }
        }
        applied
    }
}
