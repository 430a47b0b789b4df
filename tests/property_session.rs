// tests/property_session.rs

use proptest::prelude::*;
use greenpool::engine::{SessionCore, SessionEvent};
use greenpool::types::{ProgressEvent, ProtoTest, TestOutcome};

fn outcome_strategy() -> impl Strategy<Value = TestOutcome> {
    prop_oneof![
        Just(TestOutcome::Pass),
        Just(TestOutcome::Fail),
        Just(TestOutcome::Error),
        Just(TestOutcome::Skip),
    ]
}

proptest! {
    // Whatever order targets' streams interleave in, the tally only
    // depends on the outcomes and every target ends up accounted for.
    #[test]
    fn tally_is_independent_of_interleaving(
        per_target in proptest::collection::vec(
            proptest::collection::vec(outcome_strategy(), 0..6),
            1..5,
        ),
        seed in any::<u64>(),
    ) {
        let mut core = SessionCore::new();
        let mut streams: Vec<Vec<SessionEvent>> = Vec::new();

        for (i, outcomes) in per_target.iter().enumerate() {
            let target = format!("t{i}");
            core.dispatched(&target);
            let mut evs = Vec::new();
            for (j, outcome) in outcomes.iter().enumerate() {
                let test = ProtoTest::new(&target, "Case", format!("m{j}"));
                evs.push(SessionEvent::Progress { target: target.clone(), event: ProgressEvent::Started { test: test.clone() } });
                evs.push(SessionEvent::Progress {
                    target: target.clone(),
                    event: ProgressEvent::Finished { test, outcome: *outcome, diagnostic: String::new() },
                });
            }
            evs.push(SessionEvent::Progress { target: target.clone(), event: ProgressEvent::Done });
            evs.push(SessionEvent::TargetCompleted { target, failure: None });
            evs.reverse();
            streams.push(evs);
        }

        // Deterministic pseudo-random interleaving that keeps each stream in order.
        let mut state = seed;
        while streams.iter().any(|s| !s.is_empty()) {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let live: Vec<usize> = (0..streams.len()).filter(|&i| !streams[i].is_empty()).collect();
            let pick = live[(state >> 33) as usize % live.len()];
            let ev = streams[pick].pop().unwrap();
            core.step(ev);
        }

        let all: Vec<TestOutcome> = per_target.into_iter().flatten().collect();
        let summary = core.summary();
        prop_assert!(core.is_finished());
        prop_assert_eq!(summary.total(), all.len());
        prop_assert_eq!(summary.passed, all.iter().filter(|o| **o == TestOutcome::Pass).count());
        prop_assert_eq!(summary.failed, all.iter().filter(|o| **o == TestOutcome::Fail).count());
        prop_assert_eq!(summary.errors, all.iter().filter(|o| **o == TestOutcome::Error).count());
        prop_assert!(summary.incomplete_targets.is_empty());
    }
}
