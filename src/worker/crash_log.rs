// src/worker/crash_log.rs

//! Crash logging for task functions.
//!
//! [`ProcessLogger`] wraps a registered callable. Anything that escapes it,
//! an `Err` or a panic, is written to the process-level diagnostic log
//! first and then propagated unchanged, so even a worker that dies right
//! afterwards leaves a trace on stderr.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use serde_json::Value;
use tracing::error;
use tracing_subscriber::fmt;

use super::context::TaskContext;
use super::registry::{TaskFn, TaskValue};
use crate::transport::failure::panic_message;
use crate::transport::peek_captured;

static DIAGNOSTIC_LOG: Once = Once::new();

/// Make sure a process-wide log sink exists.
///
/// Worker processes normally call `init_logging` at startup; if nothing was
/// installed, a plain stderr subscriber is set up on first use.
pub fn diagnostic_log() {
    DIAGNOSTIC_LOG.call_once(|| {
        if !tracing::dispatcher::has_been_set() {
            let _ = fmt()
                .with_writer(std::io::stderr)
                .with_target(true)
                .try_init();
        }
    });
}

/// Log `text` as a crash report for `function`.
pub fn log_crash(function: &str, text: &str) {
    diagnostic_log();
    error!(
        target: "greenpool::crash",
        pid = std::process::id(),
        function,
        "uncaught failure in task function:\n{text}"
    );
}

/// Callable wrapper that logs before re-raising.
pub struct ProcessLogger {
    name: String,
    inner: TaskFn,
}

impl ProcessLogger {
    pub fn new(name: impl Into<String>, inner: TaskFn) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    pub fn call(&self, args: Value, ctx: &TaskContext) -> anyhow::Result<Box<dyn TaskValue>> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.inner)(args, ctx))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                log_crash(&self.name, &format!("{err:?}"));
                Err(err)
            }
            Err(payload) => {
                let text = match peek_captured() {
                    Some(captured) => captured.render(),
                    None => format!("panicked: {}", panic_message(payload.as_ref())),
                };
                log_crash(&self.name, &text);
                panic::resume_unwind(payload)
            }
        }
    }
}
