// src/worker/context.rs

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::protocol::WorkerMessage;
use crate::types::{JobId, ProgressEvent};

/// Line writer for [`WorkerMessage`]s, shared between the control loop and
/// the running task. Every message is flushed as soon as it is written.
#[derive(Clone)]
pub struct MessageWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl MessageWriter {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// A writer that discards everything.
    pub fn sink() -> Self {
        Self::new(Box::new(io::sink()))
    }

    pub fn send(&self, message: &WorkerMessage) -> io::Result<()> {
        let line = message.to_line().map_err(io::Error::other)?;
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }
}

/// Live progress channel for the task currently running in this worker.
#[derive(Clone)]
pub struct ProgressSink {
    job_id: JobId,
    sequence_index: usize,
    writer: MessageWriter,
}

impl ProgressSink {
    /// Deliver one event to the coordinator immediately.
    pub fn emit(&self, event: ProgressEvent) -> io::Result<()> {
        self.writer.send(&WorkerMessage::Progress {
            job_id: self.job_id,
            sequence_index: self.sequence_index,
            event,
        })
    }

    /// Like [`emit`](Self::emit), but a broken pipe is only logged; the
    /// result envelope will hit the same error and end the loop.
    pub fn emit_or_log(&self, event: ProgressEvent) {
        if let Err(err) = self.emit(event) {
            warn!(
                job_id = self.job_id,
                seq = self.sequence_index,
                error = %err,
                "failed to deliver progress event"
            );
        }
    }
}

/// Everything a task function gets to see besides its arguments.
pub struct TaskContext {
    job_id: JobId,
    sequence_index: usize,
    pid: u32,
    progress: ProgressSink,
}

impl TaskContext {
    pub fn new(job_id: JobId, sequence_index: usize, writer: MessageWriter) -> Self {
        Self {
            job_id,
            sequence_index,
            pid: std::process::id(),
            progress: ProgressSink {
                job_id,
                sequence_index,
                writer,
            },
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn progress(&self) -> &ProgressSink {
        &self.progress
    }
}
