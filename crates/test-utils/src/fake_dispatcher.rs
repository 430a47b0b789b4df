use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use greenpool::engine::{Dispatcher, SessionEvent};
use greenpool::errors::Result;
use greenpool::types::{ProgressEvent, ProtoTest, TestOutcome};

/// What the fake does for one target.
#[derive(Debug, Clone)]
pub enum Script {
    /// Emit these progress events, then complete successfully.
    Events(Vec<ProgressEvent>),
    /// Emit these events, then report the target as lost.
    Lost(Vec<ProgressEvent>),
}

/// A fake dispatcher that:
/// - records which targets were dispatched
/// - immediately replays a scripted stream for each target. Targets
///   without a script get one passing test and an end-of-stream marker.
pub struct FakeDispatcher {
    scripts: HashMap<String, Script>,
    dispatched: Arc<Mutex<Vec<String>>>,
}

impl FakeDispatcher {
    pub fn new(dispatched: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            scripts: HashMap::new(),
            dispatched,
        }
    }

    pub fn script(mut self, target: &str, script: Script) -> Self {
        self.scripts.insert(target.to_string(), script);
        self
    }
}

/// `Started` + `Finished` for one test.
pub fn test_events(test: ProtoTest, outcome: TestOutcome) -> Vec<ProgressEvent> {
    vec![
        ProgressEvent::Started { test: test.clone() },
        ProgressEvent::Finished {
            test,
            outcome,
            diagnostic: String::new(),
        },
    ]
}

impl Dispatcher for FakeDispatcher {
    fn dispatch(
        &mut self,
        target: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let target = target.to_string();
        let script = self.scripts.get(&target).cloned().unwrap_or_else(|| {
            let mut evs = test_events(ProtoTest::new(&target, "Case", "test"), TestOutcome::Pass);
            evs.push(ProgressEvent::Done);
            Script::Events(evs)
        });
        let dispatched = Arc::clone(&self.dispatched);

        Box::pin(async move {
            dispatched.lock().unwrap().push(target.clone());

            let (evs, lost) = match script {
                Script::Events(evs) => (evs, false),
                Script::Lost(evs) => (evs, true),
            };
            for event in evs {
                let _ = events.send(SessionEvent::Progress {
                    target: target.clone(),
                    event,
                });
            }
            let last = if lost {
                SessionEvent::TargetLost {
                    target,
                    reason: "fake worker crash".to_string(),
                }
            } else {
                SessionEvent::TargetCompleted {
                    target,
                    failure: None,
                }
            };
            let _ = events.send(last);
            Ok(())
        })
    }
}
