//! Client-facing error taxonomy for the control surface.
//!
//! Every control-surface operation resolves to either a success payload or
//! one of these variants. Component-local errors (`CodecError`,
//! `RenderError`, `EngineError`) are converted at the surface boundary.

use thiserror::Error;

/// Unified error type for control-surface operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The referenced flow id is unknown.
    #[error("flow not found")]
    NotFound,

    /// Malformed request: bad edit payload, unknown transform, missing
    /// upload body.
    #[error("{0}")]
    BadRequest(String),

    /// Credential check failed. Applies uniformly to every endpoint and
    /// the update channel before any handler logic runs.
    #[error("authentication required")]
    Unauthorized,

    /// The capture engine synchronously refused an instruction.
    #[error("engine rejected instruction: {0}")]
    EngineRejected(String),

    /// Unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status code this error maps to.
    ///
    /// `EngineRejected` maps to 400 alongside `BadRequest`: both are
    /// client-visible refusals that must not be retried automatically.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::NotFound => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized => 401,
            ApiError::EngineRejected(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }
}

impl From<crate::engine::EngineError> for ApiError {
    fn from(err: crate::engine::EngineError) -> Self {
        ApiError::EngineRejected(err.to_string())
    }
}

impl From<crate::flow::PatchError> for ApiError {
    fn from(err: crate::flow::PatchError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ApiError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        ApiError::Internal("control plane unavailable".to_string())
    }
}

/// Result type for control-surface operations.
pub type ApiResult<T> = Result<T, ApiError>;
