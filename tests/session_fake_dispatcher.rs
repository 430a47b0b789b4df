// tests/session_fake_dispatcher.rs

mod common;
use crate::common::init_tracing;

use std::io;
use std::sync::{Arc, Mutex};

use greenpool::engine::{Notice, Reporter, Session, Summary};
use greenpool::types::{ProgressEvent, ProtoTest, TestOutcome};
use greenpool_test_utils::fake_dispatcher::{FakeDispatcher, Script, test_events};
use greenpool_test_utils::with_timeout;

/// Reporter that keeps everything it is told.
#[derive(Clone, Default)]
struct Recording {
    notices: Arc<Mutex<Vec<Notice>>>,
    summaries: Arc<Mutex<Vec<Summary>>>,
}

impl Reporter for Recording {
    fn notice(&mut self, notice: &Notice) -> io::Result<()> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }

    fn summary(&mut self, summary: &Summary) -> io::Result<()> {
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

#[tokio::test]
async fn every_target_is_dispatched_and_tallied() {
    init_tracing();
    let dispatched = Arc::new(Mutex::new(Vec::new()));
    let reporter = Recording::default();

    let mut failing = test_events(ProtoTest::new("b", "Case", "bad"), TestOutcome::Fail);
    failing.push(ProgressEvent::Done);
    let dispatcher = FakeDispatcher::new(Arc::clone(&dispatched)).script("b", Script::Events(failing));

    let summary = with_timeout(
        Session::new(dispatcher, reporter.clone()).run(vec!["a".into(), "b".into(), "c".into()]),
    )
    .await
    .unwrap();

    assert_eq!(*dispatched.lock().unwrap(), vec!["a", "b", "c"]);
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.failed, 1);
    assert!(!summary.is_success());
    assert_eq!(reporter.summaries.lock().unwrap().len(), 1);

    let finished = reporter
        .notices
        .lock()
        .unwrap()
        .iter()
        .filter(|n| matches!(n, Notice::TestFinished { .. }))
        .count();
    assert_eq!(finished, 3);
}

#[tokio::test]
async fn repeated_target_runs_once_and_is_fully_tallied() {
    init_tracing();
    let dispatched = Arc::new(Mutex::new(Vec::new()));
    let reporter = Recording::default();
    let dispatcher = FakeDispatcher::new(Arc::clone(&dispatched));

    let summary = with_timeout(
        Session::new(dispatcher, reporter.clone()).run(vec!["a".into(), "b".into(), "a".into()]),
    )
    .await
    .unwrap();

    assert_eq!(*dispatched.lock().unwrap(), vec!["a", "b"]);
    assert_eq!(summary.passed, 2);
    assert!(summary.lost_targets.is_empty());
    assert!(summary.incomplete_targets.is_empty());
    assert!(summary.is_success());
}

#[tokio::test]
async fn lost_target_fails_the_session() {
    init_tracing();
    let dispatched = Arc::new(Mutex::new(Vec::new()));
    let reporter = Recording::default();
    let started = vec![ProgressEvent::Started {
        test: ProtoTest::new("x", "Case", "t"),
    }];
    let dispatcher = FakeDispatcher::new(dispatched).script("x", Script::Lost(started));

    let summary = with_timeout(Session::new(dispatcher, reporter.clone()).run(vec!["x".into()]))
        .await
        .unwrap();

    assert_eq!(summary.lost_targets, vec!["x".to_string()]);
    assert!(summary.incomplete_targets.is_empty());
    assert!(!summary.is_success());
    assert!(reporter
        .notices
        .lock()
        .unwrap()
        .iter()
        .any(|n| matches!(n, Notice::TargetLost { .. })));
}

#[tokio::test]
async fn missing_done_marker_is_flagged() {
    init_tracing();
    let reporter = Recording::default();
    let no_done = test_events(ProtoTest::new("y", "Case", "t"), TestOutcome::Pass);
    let dispatcher =
        FakeDispatcher::new(Arc::new(Mutex::new(Vec::new()))).script("y", Script::Events(no_done));

    let summary = with_timeout(Session::new(dispatcher, reporter).run(vec!["y".into()]))
        .await
        .unwrap();

    assert_eq!(summary.passed, 1);
    assert_eq!(summary.incomplete_targets, vec!["y".to_string()]);
}
