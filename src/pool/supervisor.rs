// src/pool/supervisor.rs

//! Health check and repopulation loop.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::Shared;
use super::driver::WorkerExit;

/// Spawn the background supervisor.
///
/// It wakes on every worker exit and on each `health_check_interval` tick,
/// drops dead workers from the live set and spawns replacements until the
/// pool is back at its target size. Once the pool is closing it only
/// collects exits, and it finishes when the last worker is gone.
pub(crate) fn spawn_supervisor(
    shared: Arc<Shared>,
    mut exit_rx: mpsc::UnboundedReceiver<WorkerExit>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(target_size = shared.config.processes, "pool supervisor started");

        let mut tick = time::interval(shared.config.health_check_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                exit = exit_rx.recv() => match exit {
                    Some(exit) => reap(&shared, exit).await,
                    None => break,
                },
                _ = tick.tick() => {}
            }

            // Collect any other exits that are already queued up.
            while let Ok(exit) = exit_rx.try_recv() {
                reap(&shared, exit).await;
            }

            if shared.closing.load(Ordering::SeqCst) {
                if shared.live_workers() == 0 {
                    break;
                }
                continue;
            }

            repopulate(&shared);
        }

        info!("pool supervisor finished");
    })
}

async fn reap(shared: &Shared, exit: WorkerExit) {
    let handle = shared.remove_worker(exit.worker_id);
    match (&exit.lost, exit.status) {
        (Some(_), _) => warn!(worker_id = exit.worker_id, pid = exit.pid, "lost worker reaped"),
        (None, Some(status)) if !status.success() => {
            warn!(worker_id = exit.worker_id, pid = exit.pid, %status, "worker exited abnormally")
        }
        _ => debug!(worker_id = exit.worker_id, pid = exit.pid, "worker reaped"),
    }
    if let Some(handle) = handle {
        let _ = handle.await;
    }
}

/// Spawn workers until the live count is back at the target size.
fn repopulate(shared: &Arc<Shared>) {
    let target = shared.config.processes;
    while shared.live_workers() < target {
        match super::spawn_worker(shared) {
            Ok(pid) => debug!(pid, "added replacement worker"),
            Err(err) => {
                error!(error = %err, "failed to spawn replacement worker; retrying on next tick");
                break;
            }
        }
    }
}
