// src/worker/mod.rs

//! The worker side of the pool: everything that runs inside a child
//! process spawned with `--internal-worker`.

pub mod context;
pub mod control_loop;
pub mod crash_log;
pub mod protocol;
pub mod registry;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::error;

pub use context::{MessageWriter, ProgressSink, TaskContext};
pub use control_loop::{ExitReason, WorkerLoop, WorkerState};
pub use protocol::{Hook, Outcome, PoolMessage, ResultEnvelope, Task, WorkerMessage, WorkerSpec};
pub use registry::{HookError, TaskRegistry, TaskValue};

use crate::transport::install_capture_hook;

/// Run the worker loop over this process's stdin/stdout.
///
/// Stdout carries protocol messages only; diagnostics go to stderr.
pub fn run_worker_process(registry: Arc<TaskRegistry>, spec: WorkerSpec) -> ExitCode {
    install_capture_hook();

    let stdin = io::stdin();
    let output = MessageWriter::new(Box::new(io::stdout()));
    let mut worker = WorkerLoop::new(registry, spec);

    match worker.run(stdin.lock(), output) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(pid = std::process::id(), "worker aborted: {err:#}");
            eprintln!("greenpool worker aborted: {err:#}");
            ExitCode::FAILURE
        }
    }
}
