// src/engine/core.rs

//! Pure session state machine.
//!
//! [`SessionCore`] consumes [`SessionEvent`]s and produces the [`Notice`]s
//! the IO shell should report, while keeping the running [`Summary`]. It
//! has no channels, no Tokio types and does no IO, so it is unit tested
//! directly.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use super::{Notice, SessionEvent, Target};
use crate::types::{ProgressEvent, TestOutcome};

/// Tally of a finished (or in-progress) session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    /// Targets whose execution task itself failed.
    pub failed_targets: Vec<Target>,
    /// Targets whose result never arrived.
    pub lost_targets: Vec<Target>,
    /// Targets that completed without an end-of-stream marker.
    pub incomplete_targets: Vec<Target>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors + self.skipped
    }

    /// Whether the session should be reported as a success.
    pub fn is_success(&self) -> bool {
        self.failed == 0
            && self.errors == 0
            && self.failed_targets.is_empty()
            && self.lost_targets.is_empty()
            && self.incomplete_targets.is_empty()
    }

    fn count(&mut self, outcome: TestOutcome) {
        match outcome {
            TestOutcome::Pass => self.passed += 1,
            TestOutcome::Fail => self.failed += 1,
            TestOutcome::Error => self.errors += 1,
            TestOutcome::Skip => self.skipped += 1,
        }
    }
}

#[derive(Debug, Default)]
struct TargetState {
    done_seen: bool,
    running: usize,
}

/// Pure session core.
#[derive(Debug, Default)]
pub struct SessionCore {
    targets: HashMap<Target, TargetState>,
    outstanding: BTreeSet<Target>,
    summary: Summary,
}

impl SessionCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target that has been dispatched.
    pub fn dispatched(&mut self, target: &str) {
        self.targets.entry(target.to_string()).or_default();
        self.outstanding.insert(target.to_string());
    }

    /// Targets that have not completed or been lost yet.
    pub fn outstanding(&self) -> impl Iterator<Item = &str> {
        self.outstanding.iter().map(String::as_str)
    }

    pub fn is_finished(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn into_summary(self) -> Summary {
        self.summary
    }

    /// Handle one event and return what should be reported.
    pub fn step(&mut self, event: SessionEvent) -> Vec<Notice> {
        match event {
            SessionEvent::Progress { target, event } => self.on_progress(target, event),
            SessionEvent::TargetCompleted { target, failure } => {
                let mut notices = Vec::new();
                if let Some(failure) = failure {
                    self.summary.failed_targets.push(target.clone());
                    notices.push(Notice::TargetFailed {
                        target: target.clone(),
                        failure,
                    });
                }
                notices.extend(self.close_target(&target, true));
                notices
            }
            SessionEvent::TargetLost { target, reason } => {
                self.summary.lost_targets.push(target.clone());
                let mut notices = vec![Notice::TargetLost {
                    target: target.clone(),
                    reason,
                }];
                notices.extend(self.close_target(&target, false));
                notices
            }
        }
    }

    fn on_progress(&mut self, target: Target, event: ProgressEvent) -> Vec<Notice> {
        let state = self.targets.entry(target.clone()).or_default();
        if state.done_seen {
            warn!(%target, ?event, "progress after end-of-stream marker ignored");
            return Vec::new();
        }

        match event {
            ProgressEvent::Started { test } => {
                state.running += 1;
                vec![Notice::TestStarted { target, test }]
            }
            ProgressEvent::Finished {
                test,
                outcome,
                diagnostic,
            } => {
                state.running = state.running.saturating_sub(1);
                self.summary.count(outcome);
                vec![Notice::TestFinished {
                    target,
                    test,
                    outcome,
                    diagnostic,
                }]
            }
            ProgressEvent::Done => {
                state.done_seen = true;
                debug!(%target, "target stream complete");
                Vec::new()
            }
        }
    }

    fn close_target(&mut self, target: &str, expect_done: bool) -> Vec<Notice> {
        self.outstanding.remove(target);
        let done_seen = self.targets.get(target).is_some_and(|s| s.done_seen);
        if expect_done && !done_seen {
            self.summary.incomplete_targets.push(target.to_string());
            return vec![Notice::StreamIncomplete {
                target: target.to_string(),
            }];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RemoteFailure;
    use crate::types::ProtoTest;

    fn progress(target: &str, event: ProgressEvent) -> SessionEvent {
        SessionEvent::Progress {
            target: target.into(),
            event,
        }
    }

    fn finished(method: &str, outcome: TestOutcome) -> ProgressEvent {
        ProgressEvent::Finished {
            test: ProtoTest::new("m", "C", method),
            outcome,
            diagnostic: String::new(),
        }
    }

    #[test]
    fn tallies_outcomes_and_finishes() {
        let mut core = SessionCore::new();
        core.dispatched("m");

        core.step(progress("m", ProgressEvent::Started { test: ProtoTest::new("m", "C", "a") }));
        core.step(progress("m", finished("a", TestOutcome::Pass)));
        core.step(progress("m", finished("b", TestOutcome::Skip)));
        core.step(progress("m", ProgressEvent::Done));
        let notices = core.step(SessionEvent::TargetCompleted {
            target: "m".into(),
            failure: None,
        });

        assert!(notices.is_empty());
        assert!(core.is_finished());
        let summary = core.into_summary();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total(), 2);
        assert!(summary.is_success());
    }

    #[test]
    fn completion_without_done_is_flagged() {
        let mut core = SessionCore::new();
        core.dispatched("m");
        core.step(progress("m", finished("a", TestOutcome::Pass)));
        let notices = core.step(SessionEvent::TargetCompleted {
            target: "m".into(),
            failure: None,
        });
        assert_eq!(notices, vec![Notice::StreamIncomplete { target: "m".into() }]);
        assert!(!core.summary().is_success());
    }

    #[test]
    fn lost_target_is_recorded_and_not_double_flagged() {
        let mut core = SessionCore::new();
        core.dispatched("a");
        core.dispatched("b");
        let notices = core.step(SessionEvent::TargetLost {
            target: "a".into(),
            reason: "worker 12 exited".into(),
        });
        assert_eq!(notices.len(), 1);
        assert_eq!(core.outstanding().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(core.summary().lost_targets, vec!["a".to_string()]);
        assert!(core.summary().incomplete_targets.is_empty());
    }

    #[test]
    fn failed_execution_task_fails_the_session() {
        let mut core = SessionCore::new();
        core.dispatched("m");
        core.step(progress("m", ProgressEvent::Done));
        let notices = core.step(SessionEvent::TargetCompleted {
            target: "m".into(),
            failure: Some(RemoteFailure::new("Error", "temp dir", "trace")),
        });
        assert!(matches!(notices[0], Notice::TargetFailed { .. }));
        assert!(!core.summary().is_success());
    }

    #[test]
    fn progress_after_done_is_ignored() {
        let mut core = SessionCore::new();
        core.dispatched("m");
        core.step(progress("m", ProgressEvent::Done));
        assert!(core.step(progress("m", finished("late", TestOutcome::Fail))).is_empty());
        assert_eq!(core.summary().failed, 0);
    }
}
