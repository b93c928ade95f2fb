//! flowdeck: live web control plane for intercepted traffic flows.
//!
//! flowdeck maintains the working set of captured request/response
//! exchanges ("flows"), lets web clients observe and mutate that set in
//! real time, and keeps every observer consistent with the authoritative
//! state produced by a separate capture engine.
//!
//! # Architecture
//!
//! ```text
//! capture engine ──► EngineBridge ──┐
//!                                   ▼
//!                          control-plane loop ──► flow store (View)
//!                                   ▲    │
//! web clients ──► HTTP surface ─────┘    └──► broadcast registry ──► /updates
//! ```
//!
//! All store mutations, whether client- or engine-originated, are
//! serialized through the control-plane loop's one command channel; the
//! store is single-writer by construction. Every successful mutation is
//! broadcast to all `/updates` subscribers as exactly one signal, in
//! mutation order, so control-surface-originated and engine-originated
//! changes are indistinguishable to observers once committed.
//!
//! - **flow**: the captured-exchange data model, with one-slot undo
//! - **view**: the ordered, filter-predicated store
//! - **bus**: the mutation path and its signals
//! - **broadcast**: the update-channel subscriber registry
//! - **plane**: the single-writer loop and its typed client handle
//! - **engine**: the consumed capture-engine interface and bridge
//! - **web**: the HTTP + WebSocket surface
//! - **codec**: the opaque capture-format seam
//! - **contentview**: named body-rendering transforms
//! - **settings**: engine-wide toggles

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod broadcast;
pub mod bus;
pub mod cli;
pub mod codec;
pub mod contentview;
pub mod engine;
pub mod error;
pub mod events;
pub mod flow;
pub mod plane;
pub mod settings;
pub mod view;
pub mod web;
