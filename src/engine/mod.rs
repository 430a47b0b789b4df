// src/engine/mod.rs

//! Coordinator session for greenpool.
//!
//! A session dispatches test targets, collects the progress each target
//! streams back and tallies a [`Summary`]. The pure bookkeeping lives in
//! [`core`]; the async shell that talks to a [`Dispatcher`] and a
//! [`Reporter`] is in [`session`].

use crate::transport::RemoteFailure;
use crate::types::{ProgressEvent, ProtoTest, TestOutcome};

/// Dotted target id as given on the command line.
pub type Target = String;

/// Events flowing into the session from dispatched targets.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A target streamed a progress event.
    Progress { target: Target, event: ProgressEvent },
    /// The execution task for a target returned. `failure` is set when the
    /// task itself failed, as opposed to tests inside it.
    TargetCompleted {
        target: Target,
        failure: Option<RemoteFailure>,
    },
    /// The target's result will never arrive (worker crash, pool shutdown).
    TargetLost { target: Target, reason: String },
}

/// What the core wants reported, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    TestStarted {
        target: Target,
        test: ProtoTest,
    },
    TestFinished {
        target: Target,
        test: ProtoTest,
        outcome: TestOutcome,
        diagnostic: String,
    },
    TargetFailed {
        target: Target,
        failure: RemoteFailure,
    },
    TargetLost {
        target: Target,
        reason: String,
    },
    /// A target finished without its end-of-stream marker.
    StreamIncomplete { target: Target },
}

pub mod core;
pub mod dispatch;
pub mod report;
pub mod session;

pub use core::{SessionCore, Summary};
pub use dispatch::{Dispatcher, PoolDispatcher};
pub use report::{PlainReporter, Reporter};
pub use session::Session;
