// src/engine/dispatch.rs

//! Pluggable dispatcher abstraction.
//!
//! The session talks to a `Dispatcher` instead of the pool directly, so
//! tests can provide a fake that emits [`SessionEvent`]s without spawning
//! any processes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::SessionEvent;
use crate::errors::Result;
use crate::pool::Pool;
use crate::runner::RunTargetArgs;
use crate::worker::Outcome;

/// Trait abstracting how targets get executed.
pub trait Dispatcher: Send {
    /// Start running `target`.
    ///
    /// The implementation reports everything about the target through
    /// `events`, ending with exactly one `TargetCompleted` or `TargetLost`,
    /// and drops its clones of the sender once done.
    fn dispatch(
        &mut self,
        target: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production dispatcher: one execution task per target on the pool.
pub struct PoolDispatcher {
    pool: Arc<Pool>,
    coverage: bool,
    omit_patterns: Vec<String>,
    next_coverage_number: u32,
}

impl PoolDispatcher {
    pub fn new(pool: Arc<Pool>) -> Self {
        Self {
            pool,
            coverage: false,
            omit_patterns: Vec::new(),
            next_coverage_number: 1,
        }
    }

    /// Give every dispatched run its own numbered coverage session.
    pub fn with_coverage(mut self, omit_patterns: Vec<String>) -> Self {
        self.coverage = true;
        self.omit_patterns = omit_patterns;
        self
    }
}

impl Dispatcher for PoolDispatcher {
    fn dispatch(
        &mut self,
        target: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let coverage_number = if self.coverage {
            let n = self.next_coverage_number;
            self.next_coverage_number += 1;
            Some(n)
        } else {
            None
        };
        let args = RunTargetArgs {
            target: target.to_string(),
            coverage_number,
            omit_patterns: self.omit_patterns.clone(),
        };

        Box::pin(async move {
            let (handle, mut progress) = self.pool.run_target(&args)?;
            let target = args.target;
            debug!(%target, job_id = handle.job_id(), "target dispatched");

            tokio::spawn(async move {
                while let Some(event) = progress.next().await {
                    let _ = events.send(SessionEvent::Progress {
                        target: target.clone(),
                        event,
                    });
                }
                let last = match handle.await {
                    Ok(Outcome::Success(_)) => SessionEvent::TargetCompleted {
                        target,
                        failure: None,
                    },
                    Ok(Outcome::Failure(failure)) => SessionEvent::TargetCompleted {
                        target,
                        failure: Some(failure),
                    },
                    Err(err) => SessionEvent::TargetLost {
                        target,
                        reason: err.to_string(),
                    },
                };
                let _ = events.send(last);
            });
            Ok(())
        })
    }
}
