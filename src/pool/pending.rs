// src/pool/pending.rs

//! Table of results the coordinator is still waiting for.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::errors::PoolError;
use crate::types::{JobId, ProgressEvent};
use crate::worker::{Outcome, ResultEnvelope};

pub type TaskKey = (JobId, usize);

type Delivery = Result<Outcome, PoolError>;

struct Pending {
    result_tx: oneshot::Sender<Delivery>,
    progress_tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

/// `(job_id, sequence_index)` -> waiting receiver.
#[derive(Default)]
pub(crate) struct PendingTable {
    inner: Mutex<HashMap<TaskKey, Pending>>,
}

impl PendingTable {
    /// Register a new key. A key that is already pending is rejected.
    pub fn insert(
        &self,
        key: TaskKey,
        with_progress: bool,
    ) -> Result<(ResultHandle, Option<ProgressStream>), PoolError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.contains_key(&key) {
            return Err(PoolError::DuplicateTask {
                job_id: key.0,
                sequence_index: key.1,
            });
        }

        let (result_tx, result_rx) = oneshot::channel();
        let (progress_tx, progress) = if with_progress {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(ProgressStream { rx }))
        } else {
            (None, None)
        };

        inner.insert(
            key,
            Pending {
                result_tx,
                progress_tx,
            },
        );
        let handle = ResultHandle {
            job_id: key.0,
            sequence_index: key.1,
            rx: result_rx,
        };
        Ok((handle, progress))
    }

    pub fn progress(&self, key: TaskKey, event: ProgressEvent) {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.get(&key).and_then(|p| p.progress_tx.as_ref()) {
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => trace!(job_id = key.0, seq = key.1, "progress for untracked task dropped"),
        }
    }

    /// Deliver an envelope. Closes the task's progress stream.
    pub fn complete(&self, envelope: ResultEnvelope) {
        let key = (envelope.job_id, envelope.sequence_index);
        self.resolve(key, Ok(envelope.outcome));
    }

    /// The worker running `key` went away before reporting.
    pub fn lose(&self, key: TaskKey, pid: u32) {
        self.resolve(
            key,
            Err(PoolError::WorkerLost {
                job_id: key.0,
                sequence_index: key.1,
                pid,
            }),
        );
    }

    pub fn abandon(&self, key: TaskKey) {
        self.resolve(
            key,
            Err(PoolError::Abandoned {
                job_id: key.0,
                sequence_index: key.1,
            }),
        );
    }

    /// Abandon everything still pending; returns how many were dropped.
    pub fn abandon_all(&self) -> usize {
        let keys: Vec<TaskKey> = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.keys().copied().collect()
        };
        for key in &keys {
            self.abandon(*key);
        }
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn resolve(&self, key: TaskKey, delivery: Delivery) {
        let entry = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        match entry {
            Some(pending) => {
                if pending.result_tx.send(delivery).is_err() {
                    debug!(job_id = key.0, seq = key.1, "result handle dropped before delivery");
                }
            }
            None => debug!(job_id = key.0, seq = key.1, "result for unknown task ignored"),
        }
    }
}

/// Resolves to the task's outcome once its envelope arrives.
#[derive(Debug)]
pub struct ResultHandle {
    job_id: JobId,
    sequence_index: usize,
    rx: oneshot::Receiver<Delivery>,
}

impl ResultHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }
}

impl Future for ResultHandle {
    type Output = Result<Outcome, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let job_id = self.job_id;
        let sequence_index = self.sequence_index;
        Pin::new(&mut self.rx).poll(cx).map(|r| {
            r.unwrap_or(Err(PoolError::Abandoned {
                job_id,
                sequence_index,
            }))
        })
    }
}

/// Live progress events for one task, in the order the worker wrote them.
///
/// The stream ends when the task's result is delivered or the task is lost.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressStream {
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}
