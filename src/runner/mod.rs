// src/runner/mod.rs

//! The execution task: run one test target inside a worker.
//!
//! A run owns a private temp root and, optionally, a coverage session.
//! Progress is streamed through [`ProtoTestResult`] as it happens, failures
//! of the loader or the test framework become synthetic error outcomes, and
//! the stream always ends with [`ProgressEvent::Done`].

pub mod coverage;
pub mod hooks;
pub mod loader;
pub mod result;
pub mod suite;
pub mod tempdir;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use coverage::{Coverage, CoverageSession, NoCoverage, ProfileCoverage, session_name};
pub use hooks::{SHELL_HOOK, register_hooks, shell_hook};
pub use loader::{Loaded, Loader, ManifestLoader, Runnable};
pub use result::{ProtoTestResult, ResultSink};
pub use suite::CommandSuite;
pub use tempdir::{RunContext, TempRoot};

use crate::transport::catch_panic;
use crate::types::{ProgressEvent, ProtoTest};
use crate::worker::{TaskContext, TaskRegistry};

/// Registry name of the execution task.
pub const RUN_TARGET: &str = "run_target";

const NA: &str = "N/A";

/// Arguments of one execution-task run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTargetArgs {
    pub target: String,
    #[serde(default)]
    pub coverage_number: Option<u32>,
    #[serde(default)]
    pub omit_patterns: Vec<String>,
}

impl RunTargetArgs {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }
}

/// Register the execution task under [`RUN_TARGET`].
pub fn register(registry: &mut TaskRegistry, loader: Arc<dyn Loader>, coverage: Arc<dyn Coverage>) {
    registry.register(RUN_TARGET, move |args: RunTargetArgs, ctx: &TaskContext| {
        debug!(pid = ctx.pid(), job_id = ctx.job_id(), target = %args.target, "execution task started");
        let progress = ctx.progress().clone();
        run_target(args, loader.as_ref(), coverage.as_ref(), |ev| {
            progress.emit_or_log(ev)
        })
    });
}

/// Run one target, sending every progress event to `emit` as it happens.
///
/// Only a failure to set up the private temp root is returned as an error;
/// everything that goes wrong after that is reported as a test outcome.
pub fn run_target(
    args: RunTargetArgs,
    loader: &dyn Loader,
    coverage: &dyn Coverage,
    emit: impl FnMut(ProgressEvent),
) -> Result<()> {
    let RunTargetArgs {
        target,
        coverage_number,
        omit_patterns,
    } = args;

    let temp = TempRoot::create().context("creating private temp root for run")?;
    debug!(%target, temp_root = %temp.path().display(), "running target");

    let mut session = match coverage_number {
        Some(n) => match coverage.begin(&session_name(n), &omit_patterns) {
            Ok(s) => Some(s),
            Err(err) => {
                warn!(%target, error = %format!("{err:#}"), "coverage unavailable for this run");
                None
            }
        },
        None => None,
    };

    let env = session.as_ref().map(|s| s.env()).unwrap_or_default();
    let ctx = RunContext::new(temp.path()).with_env(env);

    let mut result = ProtoTestResult::new(emit);
    match catch_panic(|| loader.resolve(&target)) {
        Ok(Ok(Loaded::Runnable(runnable))) => {
            let diagnostic = match catch_panic(|| runnable.run(&mut result, &ctx)) {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{err:?}")),
                Err(failure) => Some(failure.trace),
            };
            if let Some(diagnostic) = diagnostic {
                if result.error_count() == 0 {
                    report_error(&mut result, runner_error_test(), &diagnostic);
                } else {
                    debug!(%target, "run failed after recording errors; not adding another");
                }
            }
        }
        Ok(Ok(Loaded::Unrunnable(found))) => {
            let test = unrunnable_test(&target, &found);
            let diagnostic = test.description.clone();
            report_error(&mut result, test, &diagnostic);
        }
        Ok(Err(err)) => report_error(&mut result, loader_error_test(), &format!("{err:?}")),
        Err(failure) => report_error(&mut result, loader_error_test(), &failure.trace),
    }

    if let Some(session) = session.as_mut() {
        if let Err(err) = session.finish().and_then(|()| session.persist()) {
            warn!(%target, error = %format!("{err:#}"), "failed to save coverage data");
        }
    }

    if let Err(err) = temp.close() {
        warn!(%target, error = %err, "failed to remove private temp root");
    }

    debug!(
        %target,
        passed = result.passed(),
        failed = result.failures().len(),
        errors = result.errors().len(),
        skipped = result.skipped(),
        "target finished"
    );
    result.finish();
    Ok(())
}

fn report_error(result: &mut ProtoTestResult<'_>, test: ProtoTest, diagnostic: &str) {
    result.start_test(&test);
    result.add_error(&test, diagnostic);
    result.stop_test(&test);
}

fn loader_error_test() -> ProtoTest {
    ProtoTest::new("greenpool.loader", NA, "run_target")
        .with_description("greenpool encountered an error loading the unit test.")
}

fn runner_error_test() -> ProtoTest {
    ProtoTest::new("greenpool.runner", NA, "run_target").with_description(
        "greenpool encountered an exception not caught by the underlying test framework.",
    )
}

/// Synthetic test named after the target: all but the last two segments
/// form the module, then class and method. Missing segments are `N/A`.
fn unrunnable_test(target: &str, found: &str) -> ProtoTest {
    let parts: Vec<&str> = target.split('.').collect();
    let n = parts.len();
    let method = parts[n - 1];
    let class = if n >= 2 { parts[n - 2] } else { NA };
    let module = if n >= 3 { parts[..n - 2].join(".") } else { NA.to_string() };

    ProtoTest::new(module, class, method)
        .with_description(format!("Test loader returned an un-runnable object: {found}"))
}
