// src/runner/result.rs

//! Result protocol between a runnable and the execution task.

use crate::types::{ProgressEvent, ProtoTest, TestOutcome};

/// What a [`Runnable`](super::loader::Runnable) reports into while it runs.
pub trait ResultSink {
    fn start_test(&mut self, test: &ProtoTest);
    fn add_success(&mut self, test: &ProtoTest);
    fn add_failure(&mut self, test: &ProtoTest, diagnostic: &str);
    fn add_error(&mut self, test: &ProtoTest, diagnostic: &str);
    fn add_skip(&mut self, test: &ProtoTest, reason: &str);
    fn stop_test(&mut self, test: &ProtoTest);
    /// Number of errors recorded so far.
    fn error_count(&self) -> usize;
}

/// Recorder that turns result calls into progress events as they happen.
///
/// `start_test` emits `Started` immediately; the outcome recorded by one of
/// the `add_*` calls is emitted as `Finished` on `stop_test`.
pub struct ProtoTestResult<'a> {
    emit: Box<dyn FnMut(ProgressEvent) + 'a>,
    current: Option<(TestOutcome, String)>,
    errors: Vec<(ProtoTest, String)>,
    failures: Vec<(ProtoTest, String)>,
    passed: usize,
    skipped: usize,
}

impl<'a> ProtoTestResult<'a> {
    pub fn new(emit: impl FnMut(ProgressEvent) + 'a) -> Self {
        Self {
            emit: Box::new(emit),
            current: None,
            errors: Vec::new(),
            failures: Vec::new(),
            passed: 0,
            skipped: 0,
        }
    }

    pub fn errors(&self) -> &[(ProtoTest, String)] {
        &self.errors
    }

    pub fn failures(&self) -> &[(ProtoTest, String)] {
        &self.failures
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Pass the end-of-stream marker through the same channel.
    pub fn finish(&mut self) {
        (self.emit)(ProgressEvent::Done);
    }

    fn record(&mut self, outcome: TestOutcome, diagnostic: &str) {
        self.current = Some((outcome, diagnostic.to_string()));
    }
}

impl ResultSink for ProtoTestResult<'_> {
    fn start_test(&mut self, test: &ProtoTest) {
        self.current = None;
        (self.emit)(ProgressEvent::Started { test: test.clone() });
    }

    fn add_success(&mut self, _test: &ProtoTest) {
        self.passed += 1;
        self.record(TestOutcome::Pass, "");
    }

    fn add_failure(&mut self, test: &ProtoTest, diagnostic: &str) {
        self.failures.push((test.clone(), diagnostic.to_string()));
        self.record(TestOutcome::Fail, diagnostic);
    }

    fn add_error(&mut self, test: &ProtoTest, diagnostic: &str) {
        self.errors.push((test.clone(), diagnostic.to_string()));
        self.record(TestOutcome::Error, diagnostic);
    }

    fn add_skip(&mut self, _test: &ProtoTest, reason: &str) {
        self.skipped += 1;
        self.record(TestOutcome::Skip, reason);
    }

    fn stop_test(&mut self, test: &ProtoTest) {
        let (outcome, diagnostic) = self.current.take().unwrap_or_else(|| {
            (
                TestOutcome::Error,
                "test stopped without recording an outcome".to_string(),
            )
        });
        (self.emit)(ProgressEvent::Finished {
            test: test.clone(),
            outcome,
            diagnostic,
        });
    }

    fn error_count(&self) -> usize {
        self.errors.len()
    }
}
