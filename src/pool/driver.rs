// src/pool/driver.rs

//! Coordinator-side driver for one worker process.
//!
//! The driver owns the child process. It only takes a task off the shared
//! queue after the worker has announced `Ready`, writes it to the worker's
//! stdin, and routes everything the worker writes back (progress, results)
//! into the pending table. When the worker's stdout closes, the driver
//! reaps the process and reports the exit to the supervisor.

use std::process::ExitStatus;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tracing::{debug, error, info, warn};

use super::Shared;
use super::pending::TaskKey;
use crate::worker::{PoolMessage, Task, WorkerMessage};

/// Report sent to the supervisor when a worker's driver finishes.
#[derive(Debug)]
pub(crate) struct WorkerExit {
    pub worker_id: usize,
    pub pid: u32,
    pub status: Option<ExitStatus>,
    /// Task that was running when the worker went away, if any.
    pub lost: Option<TaskKey>,
}

enum Step {
    Line(std::io::Result<Option<String>>),
    Dispatch(Option<Task>),
}

/// Drive `child` until its stdout closes, then reap it.
pub(crate) async fn drive_worker(shared: Arc<Shared>, worker_id: usize, mut child: Child) {
    let pid = child.id().unwrap_or(0);
    let lost = match drive_inner(&shared, worker_id, pid, &mut child).await {
        Ok(lost) => lost,
        Err(err) => {
            error!(worker_id, pid, error = %format!("{err:#}"), "worker driver error");
            None
        }
    };

    let status = match child.wait().await {
        Ok(status) => Some(status),
        Err(err) => {
            warn!(worker_id, pid, error = %err, "failed to reap worker process");
            None
        }
    };

    if let Some(key) = lost {
        warn!(
            worker_id,
            pid,
            job_id = key.0,
            seq = key.1,
            ?status,
            "worker died while running a task; result is lost"
        );
        shared.pending.lose(key, pid);
    } else {
        debug!(worker_id, pid, ?status, "worker process exited");
    }

    let _ = shared.exit_tx.send(WorkerExit {
        worker_id,
        pid,
        status,
        lost,
    });
}

/// Returns the key of the task in flight when the worker went away.
async fn drive_inner(
    shared: &Shared,
    worker_id: usize,
    pid: u32,
    child: &mut Child,
) -> Result<Option<TaskKey>> {
    let mut stdin = child
        .stdin
        .take()
        .context("worker stdin was not captured")?;
    let stdout = child
        .stdout
        .take()
        .context("worker stdout was not captured")?;
    let mut lines = BufReader::new(stdout).lines();

    let mut idle = false;
    let mut shutdown_sent = false;
    let mut in_flight: Option<TaskKey> = None;

    loop {
        let step = if idle && !shutdown_sent {
            tokio::select! {
                line = lines.next_line() => Step::Line(line),
                task = shared.next_task() => Step::Dispatch(task),
            }
        } else {
            Step::Line(lines.next_line().await)
        };

        match step {
            Step::Dispatch(Some(task)) => {
                idle = false;
                let key = (task.job_id, task.sequence_index);
                in_flight = Some(key);
                debug!(worker_id, pid, job_id = key.0, seq = key.1, "dispatching task");
                if let Err(err) = write_message(&mut stdin, &PoolMessage::Task(task)).await {
                    // The worker is gone; end-of-stream follows and reports the loss.
                    warn!(worker_id, pid, error = %err, "failed to hand task to worker");
                }
            }
            Step::Dispatch(None) => {
                idle = false;
                shutdown_sent = true;
                debug!(worker_id, pid, "queue closed; sending sentinel");
                if let Err(err) = write_message(&mut stdin, &PoolMessage::Shutdown).await {
                    debug!(worker_id, pid, error = %err, "worker already gone at shutdown");
                }
            }
            Step::Line(Ok(Some(line))) => {
                if line.trim().is_empty() {
                    continue;
                }
                let msg = match WorkerMessage::from_line(&line) {
                    Ok(msg) => msg,
                    Err(err) => {
                        warn!(worker_id, pid, error = %err, line = %line, "ignoring non-protocol line from worker");
                        continue;
                    }
                };
                match msg {
                    WorkerMessage::Ready { .. } => idle = true,
                    WorkerMessage::Progress {
                        job_id,
                        sequence_index,
                        event,
                    } => shared.pending.progress((job_id, sequence_index), event),
                    WorkerMessage::Result(envelope) => {
                        let key = (envelope.job_id, envelope.sequence_index);
                        if in_flight == Some(key) {
                            in_flight = None;
                        }
                        shared.pending.complete(envelope);
                    }
                    WorkerMessage::Exiting { completed, .. } => {
                        info!(worker_id, pid, completed, "worker finalized");
                    }
                }
            }
            Step::Line(Ok(None)) => break,
            Step::Line(Err(err)) => {
                warn!(worker_id, pid, error = %err, "error reading from worker");
                break;
            }
        }
    }

    Ok(in_flight)
}

async fn write_message(stdin: &mut ChildStdin, msg: &PoolMessage) -> Result<()> {
    let line = msg.to_line()?;
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}
