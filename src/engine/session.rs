// src/engine/session.rs

use std::collections::HashSet;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::core::{SessionCore, Summary};
use super::dispatch::Dispatcher;
use super::report::Reporter;
use super::{SessionEvent, Target};
use crate::errors::Result;

/// Runs a set of targets through a [`Dispatcher`] and reports on them.
///
/// This is the IO shell around [`SessionCore`], which holds all the
/// bookkeeping.
pub struct Session<D: Dispatcher, R: Reporter> {
    core: SessionCore,
    dispatcher: D,
    reporter: R,
}

impl<D: Dispatcher, R: Reporter> fmt::Debug for Session<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<D: Dispatcher, R: Reporter> Session<D, R> {
    pub fn new(dispatcher: D, reporter: R) -> Self {
        Self {
            core: SessionCore::new(),
            dispatcher,
            reporter,
        }
    }

    /// Dispatch every target, then consume events until all are accounted
    /// for, and return the tally.
    ///
    /// A target named more than once runs once, at its first position.
    pub async fn run(mut self, targets: Vec<Target>) -> Result<Summary> {
        let targets = unique_targets(targets);
        info!(targets = targets.len(), "session started");
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();

        for target in &targets {
            self.core.dispatched(target);
            self.dispatcher.dispatch(target, tx.clone()).await?;
        }
        drop(tx);

        while let Some(event) = rx.recv().await {
            debug!(?event, "session received event");
            for notice in self.core.step(event) {
                self.reporter.notice(&notice)?;
            }
            if self.core.is_finished() {
                break;
            }
        }

        if !self.core.is_finished() {
            let missing: Vec<String> = self.core.outstanding().map(String::from).collect();
            warn!(?missing, "event stream closed with targets outstanding");
            for target in missing {
                let notices = self.core.step(SessionEvent::TargetLost {
                    target,
                    reason: "dispatcher stopped reporting".to_string(),
                });
                for notice in notices {
                    self.reporter.notice(&notice)?;
                }
            }
        }

        let summary = self.core.into_summary();
        self.reporter.summary(&summary)?;
        info!(
            passed = summary.passed,
            failed = summary.failed,
            errors = summary.errors,
            skipped = summary.skipped,
            "session finished"
        );
        Ok(summary)
    }
}

/// `targets` in order of first appearance.
fn unique_targets(targets: Vec<Target>) -> Vec<Target> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| {
            let fresh = seen.insert(target.clone());
            if !fresh {
                warn!(%target, "target given more than once; running it once");
            }
            fresh
        })
        .collect()
}
