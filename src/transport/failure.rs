// src/transport/failure.rs

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::panic::CapturedPanic;
use crate::worker::registry::HookError;

/// Well-known kind tags carried by [`RemoteFailure::kind`].
pub mod kind {
    pub const ERROR: &str = "Error";
    pub const PANIC: &str = "Panic";
    pub const HOOK: &str = "HookError";
    pub const IO: &str = "IoError";
    pub const DECODE: &str = "DecodeError";
    pub const UNKNOWN_FUNCTION: &str = "UnknownFunction";
    pub const ENCODING: &str = "MaybeEncodingError";
}

/// Serializable snapshot of a failure raised inside a worker.
///
/// `trace` is rendered when the failure is captured, while the original
/// error and its stack are still available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub kind: String,
    pub message: String,
    pub trace: String,
}

impl RemoteFailure {
    pub fn new(
        kind: impl Into<String>,
        message: impl Into<String>,
        trace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: trace.into(),
        }
    }

    /// Capture an `anyhow` error: message is the `: `-joined cause chain,
    /// trace is the debug rendering (chain plus backtrace when one was
    /// captured).
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            kind: kind_of(err).to_string(),
            message: format!("{err:#}"),
            trace: format!("{err:?}"),
        }
    }

    /// Capture a panic payload, using the hook snapshot when one exists.
    pub fn from_panic(payload: &(dyn Any + Send), captured: Option<CapturedPanic>) -> Self {
        match captured {
            Some(c) => Self {
                kind: kind::PANIC.to_string(),
                message: c.message.clone(),
                trace: c.render(),
            },
            None => {
                let message = panic_message(payload);
                Self {
                    kind: kind::PANIC.to_string(),
                    trace: format!("panicked: {message}\n(no backtrace captured)"),
                    message,
                }
            }
        }
    }

    /// Substitute envelope for a result value that could not be encoded.
    pub fn encoding(value_repr: &str, reason: &dyn fmt::Display) -> Self {
        let message = format!("Error sending result: '{value_repr}'. Reason: '{reason}'");
        Self {
            kind: kind::ENCODING.to_string(),
            trace: message.clone(),
            message,
        }
    }

    /// Reconstruct a local error whose cause renders the captured text.
    pub fn rebuild(&self) -> RemoteError {
        RemoteError {
            kind: self.kind.clone(),
            message: self.message.clone(),
            traceback: RemoteTraceback::new(self.trace.clone()),
        }
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Local stand-in for an error raised in another process.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
    #[source]
    traceback: RemoteTraceback,
}

impl RemoteError {
    pub fn traceback(&self) -> &RemoteTraceback {
        &self.traceback
    }
}

/// Placeholder cause whose only job is to print the remote trace text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct RemoteTraceback {
    text: String,
}

impl RemoteTraceback {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for RemoteTraceback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\n\"\"\"\n{}", self.text)?;
        if !self.text.ends_with('\n') {
            f.write_str("\n")?;
        }
        f.write_str("\"\"\"")
    }
}

fn kind_of(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if cause.is::<HookError>() {
            return kind::HOOK;
        }
        if cause.is::<std::io::Error>() {
            return kind::IO;
        }
        if cause.is::<serde_json::Error>() {
            return kind::DECODE;
        }
    }
    kind::ERROR
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use anyhow::Context;

    use super::*;

    #[test]
    fn from_error_keeps_full_chain() {
        let err = std::fs::read("/definitely/not/here")
            .context("loading fixture")
            .unwrap_err();
        let failure = RemoteFailure::from_error(&err);

        assert_eq!(failure.kind, kind::IO);
        assert!(failure.message.starts_with("loading fixture: "));
        assert!(failure.trace.contains("Caused by"));
    }

    #[test]
    fn rebuilt_error_renders_trace_through_source() {
        let failure = RemoteFailure::new("Error", "boom", "frame 1\nframe 2\n");
        let rebuilt = failure.rebuild();

        assert_eq!(rebuilt.to_string(), "Error: boom");
        let source = rebuilt.source().expect("rebuilt error must have a cause");
        assert_eq!(source.to_string(), "\n\"\"\"\nframe 1\nframe 2\n\"\"\"");
    }

    #[test]
    fn failure_survives_json_round_trip_with_trace() {
        let failure = RemoteFailure::new(kind::PANIC, "index out of bounds", "at src/lib.rs:3");
        let json = serde_json::to_string(&failure).unwrap();
        let back: RemoteFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rebuild().traceback().text(), "at src/lib.rs:3");
    }

    #[test]
    fn encoding_failure_names_value_and_reason() {
        let failure = RemoteFailure::encoding("{1: 2}", &"key must be a string");
        assert_eq!(failure.kind, kind::ENCODING);
        assert!(failure.message.contains("{1: 2}"));
        assert!(failure.message.contains("key must be a string"));
    }
}
