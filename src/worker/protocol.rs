// src/worker/protocol.rs

//! Wire protocol between the pool and its worker processes.
//!
//! Messages are JSON-serialized and newline-delimited. The pool writes
//! [`PoolMessage`]s to a worker's stdin; the worker writes
//! [`WorkerMessage`]s to its stdout.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::{RemoteError, RemoteFailure};
use crate::types::{JobId, ProgressEvent};

/// A unit of work. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub job_id: JobId,
    pub sequence_index: usize,
    /// Name of the callable in the worker's task registry.
    pub function: String,
    #[serde(default)]
    pub args: Value,
}

/// Named hook plus its arguments, run once per worker at start or exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub function: String,
    #[serde(default)]
    pub args: Value,
}

impl Hook {
    pub fn new(function: impl Into<String>, args: Value) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }
}

/// Per-worker settings handed over at spawn time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    #[serde(default)]
    pub worker_id: usize,
    #[serde(default)]
    pub initializer: Option<Hook>,
    #[serde(default)]
    pub finalizer: Option<Hook>,
    /// Retire after this many completed tasks (`None` = never).
    #[serde(default)]
    pub max_tasks: Option<usize>,
}

impl WorkerSpec {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// `(success, value_or_error)` for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Failure(RemoteFailure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn failure(&self) -> Option<&RemoteFailure> {
        match self {
            Outcome::Failure(f) => Some(f),
            Outcome::Success(_) => None,
        }
    }

    /// Turn a failure into a rebuilt local error.
    pub fn into_result(self) -> Result<Value, RemoteError> {
        match self {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(f) => Err(f.rebuild()),
        }
    }

    /// Decode a successful value into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> anyhow::Result<T> {
        let value = self.into_result()?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Result of one task, keyed by `(job_id, sequence_index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub job_id: JobId,
    pub sequence_index: usize,
    pub outcome: Outcome,
}

/// Message from the pool to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolMessage {
    Task(Task),
    /// Sentinel: finish up and exit.
    Shutdown,
}

/// Message from a worker to the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Worker is idle and will read exactly one more message.
    Ready { pid: u32 },
    /// Live progress for the task currently running.
    Progress {
        job_id: JobId,
        sequence_index: usize,
        event: ProgressEvent,
    },
    Result(ResultEnvelope),
    /// Worker finished finalizing and is about to exit.
    Exiting { pid: u32, completed: usize },
}

impl PoolMessage {
    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

impl WorkerMessage {
    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}
