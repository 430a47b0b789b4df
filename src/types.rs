use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier shared by every task submitted under one `submit`/`map` call.
pub type JobId = u64;

/// Identity of a single test about to run. Carries no outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProtoTest {
    pub module: String,
    pub class_name: String,
    pub method_name: String,
    #[serde(default)]
    pub description: String,
}

impl ProtoTest {
    pub fn new(
        module: impl Into<String>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            class_name: class_name.into(),
            method_name: method_name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// `module.class.method`, skipping empty segments.
    pub fn dotted_name(&self) -> String {
        [&self.module, &self.class_name, &self.method_name]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for ProtoTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.dotted_name())
        } else {
            write!(f, "{} ({})", self.dotted_name(), self.description)
        }
    }
}

/// Outcome of a single finished test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pass,
    Fail,
    Error,
    Skip,
}

impl TestOutcome {
    /// Whether this outcome should make the overall run fail.
    pub fn is_problem(self) -> bool {
        matches!(self, TestOutcome::Fail | TestOutcome::Error)
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestOutcome::Pass => "pass",
            TestOutcome::Fail => "fail",
            TestOutcome::Error => "error",
            TestOutcome::Skip => "skip",
        };
        f.write_str(s)
    }
}

impl FromStr for TestOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pass" | "ok" => Ok(TestOutcome::Pass),
            "fail" => Ok(TestOutcome::Fail),
            "error" => Ok(TestOutcome::Error),
            "skip" => Ok(TestOutcome::Skip),
            other => Err(format!(
                "invalid test outcome: {other} (expected pass, fail, error or skip)"
            )),
        }
    }
}

/// Live progress event for one execution-task run.
///
/// Within one run's stream, `Started` for a test always precedes its
/// `Finished`, and `Done` is always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        test: ProtoTest,
    },
    Finished {
        test: ProtoTest,
        outcome: TestOutcome,
        #[serde(default)]
        diagnostic: String,
    },
    Done,
}

impl ProgressEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, ProgressEvent::Done)
    }
}
