// src/worker/control_loop.rs

//! The loop that runs inside every pool worker process.
//!
//! ```text
//! initializing -> idle -> running -> idle -> ... -> finalizing -> exited
//! ```
//!
//! - A `HookError` from the initializer is reported and the worker goes idle
//!   anyway; any other initializer error is returned (fatal).
//! - End-of-stream, a read error, an undecodable message or the `Shutdown`
//!   sentinel all lead straight to finalizing.
//! - Task failures never escape: they become `Outcome::Failure` envelopes.
//! - The finalizer runs exactly once, errors are reported and swallowed.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use super::context::{MessageWriter, TaskContext};
use super::crash_log::ProcessLogger;
use super::protocol::{Hook, Outcome, PoolMessage, ResultEnvelope, Task, WorkerMessage, WorkerSpec};
use super::registry::{HookError, TaskRegistry};
use crate::transport::{RemoteFailure, catch_panic, kind};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Initializing,
    Idle,
    Running,
    Finalizing,
    Exited,
}

#[derive(Debug, Clone, Copy)]
enum HookPhase {
    Initializer,
    Finalizer,
}

impl HookPhase {
    fn as_str(self) -> &'static str {
        match self {
            HookPhase::Initializer => "initializer",
            HookPhase::Finalizer => "finalizer",
        }
    }
}

/// Why the loop stopped taking tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Sentinel,
    EndOfStream,
    ReadError,
    Retired,
    OutputClosed,
}

/// Parameterized worker loop with optional pre/post hooks.
#[derive(Debug)]
pub struct WorkerLoop {
    registry: Arc<TaskRegistry>,
    spec: WorkerSpec,
    state: WorkerState,
    completed: usize,
    pid: u32,
}

impl WorkerLoop {
    pub fn new(registry: Arc<TaskRegistry>, spec: WorkerSpec) -> Self {
        Self {
            registry,
            spec,
            state: WorkerState::Initializing,
            completed: 0,
            pid: std::process::id(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Run the loop to completion.
    ///
    /// Returns why the loop stopped; an `Err` means the initializer failed
    /// with a non-hook error and the worker must not continue.
    pub fn run<R: BufRead>(&mut self, mut input: R, output: MessageWriter) -> anyhow::Result<ExitReason> {
        self.state = WorkerState::Initializing;
        if let Some(hook) = self.spec.initializer.clone() {
            self.run_hook(&hook, HookPhase::Initializer)?;
        }

        let reason = self.serve(&mut input, &output);
        info!(
            pid = self.pid,
            worker_id = self.spec.worker_id,
            completed = self.completed,
            ?reason,
            "worker leaving task loop"
        );

        self.state = WorkerState::Finalizing;
        if let Some(hook) = self.spec.finalizer.clone() {
            if let Err(err) = self.run_hook(&hook, HookPhase::Finalizer) {
                error!(pid = self.pid, error = %format!("{err:#}"), "finalizer failed");
            }
        }

        let _ = output.send(&WorkerMessage::Exiting {
            pid: self.pid,
            completed: self.completed,
        });
        self.state = WorkerState::Exited;
        debug!(pid = self.pid, "worker exiting after {} tasks", self.completed);
        Ok(reason)
    }

    fn retired(&self) -> bool {
        matches!(self.spec.max_tasks, Some(max) if self.completed >= max)
    }

    fn serve<R: BufRead>(&mut self, input: &mut R, output: &MessageWriter) -> ExitReason {
        loop {
            if self.retired() {
                return ExitReason::Retired;
            }

            self.state = WorkerState::Idle;
            if output.send(&WorkerMessage::Ready { pid: self.pid }).is_err() {
                return ExitReason::OutputClosed;
            }

            let task = match read_message(input) {
                Ok(Some(PoolMessage::Task(task))) => task,
                Ok(Some(PoolMessage::Shutdown)) => {
                    debug!(pid = self.pid, "worker got sentinel -- exiting");
                    return ExitReason::Sentinel;
                }
                Ok(None) => {
                    debug!(pid = self.pid, "worker got end of stream -- exiting");
                    return ExitReason::EndOfStream;
                }
                Err(err) => {
                    debug!(pid = self.pid, error = %err, "worker got read error -- exiting");
                    return ExitReason::ReadError;
                }
            };

            self.state = WorkerState::Running;
            let envelope = self.execute(task, output);
            let sent = output.send(&WorkerMessage::Result(envelope));
            self.completed += 1;

            if let Err(err) = sent {
                warn!(pid = self.pid, error = %err, "could not deliver result; output closed");
                return ExitReason::OutputClosed;
            }
        }
    }

    /// Run one task and build its envelope. Never fails.
    fn execute(&self, task: Task, output: &MessageWriter) -> ResultEnvelope {
        let Task {
            job_id,
            sequence_index,
            function,
            args,
        } = task;
        debug!(pid = self.pid, job_id, seq = sequence_index, %function, "running task");

        let outcome = match self.registry.task(&function) {
            None => Outcome::Failure(RemoteFailure::new(
                kind::UNKNOWN_FUNCTION,
                format!("no task function named `{function}` is registered in this worker"),
                format!("known functions: {:?}", self.registry.task_names().collect::<Vec<_>>()),
            )),
            Some(f) => {
                let logger = ProcessLogger::new(function.clone(), f);
                let ctx = TaskContext::new(job_id, sequence_index, output.clone());
                match catch_panic(|| logger.call(args, &ctx)) {
                    Ok(Ok(value)) => match value.encode() {
                        Ok(encoded) => Outcome::Success(encoded),
                        Err(err) => {
                            debug!(
                                job_id,
                                seq = sequence_index,
                                error = %err,
                                "possible encoding error while sending result"
                            );
                            Outcome::Failure(RemoteFailure::encoding(&value.describe(), &err))
                        }
                    },
                    Ok(Err(err)) => Outcome::Failure(RemoteFailure::from_error(&err)),
                    Err(failure) => Outcome::Failure(failure),
                }
            }
        };

        ResultEnvelope {
            job_id,
            sequence_index,
            outcome,
        }
    }

    fn run_hook(&self, hook: &Hook, phase: HookPhase) -> anyhow::Result<()> {
        let result = match self.registry.hook(&hook.function) {
            None => Err(anyhow!(HookError::new(format!(
                "no {} hook named `{}` is registered",
                phase.as_str(),
                hook.function
            )))),
            Some(f) => {
                let args = hook.args.clone();
                match catch_panic(|| f(args)) {
                    Ok(result) => result,
                    Err(failure) => Err(anyhow!(failure.rebuild())),
                }
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.chain().any(|cause| cause.is::<HookError>()) => {
                eprintln!("{err}");
                warn!(
                    pid = self.pid,
                    phase = phase.as_str(),
                    error = %err,
                    "hook reported a non-fatal error"
                );
                Ok(())
            }
            Err(err) => Err(err.context(format!("worker {} failed", phase.as_str()))),
        }
    }
}

/// Read the next message, skipping blank lines. `Ok(None)` on EOF.
fn read_message<R: BufRead>(input: &mut R) -> anyhow::Result<Option<PoolMessage>> {
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }
        return Ok(Some(PoolMessage::from_line(&line)?));
    }
}
