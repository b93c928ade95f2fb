//! The consumed capture-engine interface.
//!
//! The engine performs the actual traffic interception and owns flow
//! lifecycle; the control plane reaches it only through [`CaptureEngine`].
//! All instructions are fire-and-request: the call returns as soon as the
//! instruction is accepted or synchronously rejected, never waiting for
//! the engine to finish acting. "Kill" in particular is best-effort, not
//! a guaranteed-synchronous abort.
//!
//! Inbound traffic from the engine arrives through the [`bridge`].

pub mod bridge;

pub use bridge::{EngineBridge, EngineEvent};

use crate::flow::{Flow, FlowId};
use thiserror::Error;

/// Synchronous refusal of an engine instruction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine looked at the instruction and refused it, e.g. a replay
    /// target it cannot reach.
    #[error("{0}")]
    Rejected(String),

    /// No engine is in a state to take instructions at all.
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// Outbound instruction surface of the capture engine.
pub trait CaptureEngine: Send + Sync {
    /// Continue processing a paused flow.
    fn resume(&self, id: FlowId) -> Result<(), EngineError>;

    /// Continue processing every paused flow.
    fn resume_all(&self) -> Result<(), EngineError>;

    /// Abort a flow's in-flight processing. Best-effort.
    fn kill(&self, id: FlowId) -> Result<(), EngineError>;

    /// Re-issue a flow's request against its original target.
    fn replay(&self, flow: &Flow) -> Result<(), EngineError>;
}

/// Engine stand-in for standalone operation (e.g. viewing a loaded
/// capture file without a live interception engine).
///
/// Resume and kill instructions are accepted and discarded; replay is
/// rejected, since there is nothing to re-issue requests with.
#[derive(Debug, Default)]
pub struct DetachedEngine;

impl CaptureEngine for DetachedEngine {
    fn resume(&self, _id: FlowId) -> Result<(), EngineError> {
        Ok(())
    }

    fn resume_all(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn kill(&self, _id: FlowId) -> Result<(), EngineError> {
        Ok(())
    }

    fn replay(&self, _flow: &Flow) -> Result<(), EngineError> {
        Err(EngineError::Rejected(
            "replay unavailable: no capture engine attached".to_string(),
        ))
    }
}
