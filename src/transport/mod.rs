// src/transport/mod.rs

//! Failure transport across the worker process boundary.
//!
//! A live error (or panic payload) cannot be sent to the coordinator, and
//! neither can the stack it unwound through. Instead the worker renders the
//! full diagnostic text at the moment of capture into a [`RemoteFailure`],
//! which is plain data and crosses the pipe as JSON. On the coordinator side
//! [`RemoteFailure::rebuild`] produces a local [`RemoteError`] whose
//! `source()` is a [`RemoteTraceback`] that renders the captured text
//! verbatim.
//!
//! - [`failure`] holds the wire value and the rebuilt error types.
//! - [`panic`] installs the panic hook that snapshots the backtrace before
//!   the stack unwinds, and the `catch_unwind` helpers built on it.

pub mod failure;
pub mod panic;

pub use failure::{RemoteError, RemoteFailure, RemoteTraceback, kind};
pub use panic::{CapturedPanic, catch_panic, install_capture_hook, peek_captured};
