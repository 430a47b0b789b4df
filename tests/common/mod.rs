#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use greenpool::pool::{Pool, PoolConfig, ProgressStream, WorkerCommand};
use greenpool::types::{ProgressEvent, TestOutcome};

pub use greenpool_test_utils::builders::{ConfigFileBuilder, TestEntryBuilder};
pub use greenpool_test_utils::{init_tracing, with_deadline};

/// Deadline for tests that spawn worker processes.
pub const PROCESS_DEADLINE: Duration = Duration::from_secs(60);

/// The `greenpool` binary built for this test run.
pub fn greenpool_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_greenpool"))
}

/// Worker command running the real binary against `manifest`.
pub fn worker_command(manifest: &Path) -> WorkerCommand {
    WorkerCommand::new(greenpool_bin())
        .arg("--config")
        .arg(manifest)
        .env("GREENPOOL_LOG", "warn")
}

pub fn pool_config(manifest: &Path, processes: usize) -> PoolConfig {
    let mut cfg = PoolConfig::new(processes, worker_command(manifest));
    cfg.health_check_interval = Duration::from_millis(50);
    cfg
}

pub async fn start_pool(manifest: &Path, processes: usize) -> Pool {
    Pool::start(pool_config(manifest, processes))
        .await
        .expect("pool starts")
}

/// Drain a progress stream.
pub async fn collect(mut progress: ProgressStream) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(ev) = progress.next().await {
        events.push(ev);
    }
    events
}

/// `(method, outcome)` of every finished test in `events`.
pub fn finished(events: &[ProgressEvent]) -> Vec<(String, TestOutcome)> {
    events
        .iter()
        .filter_map(|ev| match ev {
            ProgressEvent::Finished { test, outcome, .. } => {
                Some((test.method_name.clone(), *outcome))
            }
            _ => None,
        })
        .collect()
}

/// Poll `cond` every 25ms until it holds.
pub async fn eventually<F: FnMut() -> bool>(mut cond: F) {
    while !cond() {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
