// src/config/model.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ProtoTest;

/// Manifest as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// processes = 4
/// max_tasks_per_worker = 0
/// health_check_interval = "100ms"
/// initializer = "mkdir -p build"
/// finalizer = "echo worker $PPID done >&2"
///
/// [coverage]
/// enabled = true
/// omit = ["tests/**"]
///
/// [[test]]
/// module = "math"
/// class = "Arith"
/// method = "add"
/// cmd = "test $((1+1)) -eq 2"
/// ```
///
/// All sections except `[[test]]` are optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub coverage: CoverageSection,

    #[serde(default)]
    pub test: Vec<RawTestEntry>,
}

/// `[config]` section: pool sizing and worker behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSection {
    /// Number of worker processes; defaults to the available parallelism.
    #[serde(default)]
    pub processes: Option<usize>,

    /// Retire a worker after this many tasks. `0` means never.
    #[serde(default)]
    pub max_tasks_per_worker: usize,

    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: String,

    /// Exit code a test command uses to report "skipped".
    #[serde(default = "default_skip_exit_code")]
    pub skip_exit_code: i32,

    /// Shell command each worker runs once before taking tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<String>,

    /// Shell command each worker runs once before exiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalizer: Option<String>,
}

fn default_health_check_interval() -> String {
    "100ms".to_string()
}

fn default_skip_exit_code() -> i32 {
    77
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            processes: None,
            max_tasks_per_worker: 0,
            health_check_interval: default_health_check_interval(),
            skip_exit_code: default_skip_exit_code(),
            initializer: None,
            finalizer: None,
        }
    }
}

impl ConfigSection {
    pub fn effective_processes(&self) -> usize {
        self.processes.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn effective_max_tasks(&self) -> Option<usize> {
        match self.max_tasks_per_worker {
            0 => None,
            n => Some(n),
        }
    }
}

/// `[coverage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageSection {
    #[serde(default)]
    pub enabled: bool,

    /// Glob patterns excluded from coverage data.
    #[serde(default)]
    pub omit: Vec<String>,
}

/// One `[[test]]` entry as written in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTestEntry {
    pub module: String,
    pub class: String,
    pub method: String,
    pub cmd: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
    /// When set, the test is reported as skipped with this reason.
    #[serde(default)]
    pub skip: Option<String>,
}

/// Validated test entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TestEntry {
    pub module: String,
    pub class: String,
    pub method: String,
    pub cmd: String,
    pub description: String,
    pub timeout: Option<Duration>,
    pub skip: Option<String>,
}

impl TestEntry {
    /// `module.class.method`.
    pub fn id(&self) -> String {
        format!("{}.{}.{}", self.module, self.class, self.method)
    }

    pub fn proto_test(&self) -> ProtoTest {
        ProtoTest::new(&self.module, &self.class, &self.method).with_description(&self.description)
    }

    /// Whether the dotted `target` selects this test.
    ///
    /// A target selects a test if it equals the test's module, its
    /// `module.class`, or its full id.
    pub fn matches(&self, target: &str) -> bool {
        let id = self.id();
        target == self.module || target == format!("{}.{}", self.module, self.class) || target == id
    }
}

/// Validated manifest. Construct through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub coverage: CoverageSection,
    pub health_check_interval: Duration,
    pub test: Vec<TestEntry>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        coverage: CoverageSection,
        health_check_interval: Duration,
        test: Vec<TestEntry>,
    ) -> Self {
        Self {
            config,
            coverage,
            health_check_interval,
            test,
        }
    }

    /// Distinct modules in manifest order; the default set of targets.
    pub fn modules(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for t in &self.test {
            if !out.contains(&t.module) {
                out.push(t.module.clone());
            }
        }
        out
    }

    /// Tests selected by `target`, in manifest order.
    pub fn select(&self, target: &str) -> Vec<&TestEntry> {
        self.test.iter().filter(|t| t.matches(target)).collect()
    }
}
