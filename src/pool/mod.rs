// src/pool/mod.rs

//! Daemonless process pool.
//!
//! The pool keeps `processes` worker processes alive. Each worker is an
//! ordinary child process running this same binary in worker mode, so it
//! is free to spawn processes of its own. Tasks go onto a shared queue;
//! a worker's driver takes one only when that worker is idle. A supervisor
//! replaces workers that crash or retire.
//!
//! Closing the pool closes the queue: each driver sends the shutdown
//! sentinel once its worker is idle and the queue is drained, so busy
//! workers get it after their current task.

mod driver;
pub mod pending;
mod supervisor;

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use pending::{ProgressStream, ResultHandle};

use self::driver::{WorkerExit, drive_worker};
use self::pending::PendingTable;
use crate::errors::{PoolError, Result};
use crate::runner::{RUN_TARGET, RunTargetArgs};
use crate::types::JobId;
use crate::worker::{Hook, Outcome, Task, WorkerSpec};

/// Hidden flag that switches the binary into worker mode.
pub const WORKER_FLAG: &str = "--internal-worker";
/// Flag carrying the JSON-encoded [`WorkerSpec`].
pub const WORKER_SPEC_FLAG: &str = "--worker-spec";

/// How to start a worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    /// `program WORKER_FLAG`, plus whatever args are added.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![WORKER_FLAG.into()],
            envs: Vec::new(),
        }
    }

    /// Workers that run the currently executing binary.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn build(&self, spec: &WorkerSpec) -> std::result::Result<Command, PoolError> {
        let spec_json = spec
            .to_json()
            .map_err(|e| PoolError::Spawn(format!("encoding worker spec: {e}")))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(WORKER_SPEC_FLAG)
            .arg(spec_json)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Target number of live workers.
    pub processes: usize,
    pub initializer: Option<Hook>,
    pub finalizer: Option<Hook>,
    /// Retire workers after this many tasks.
    pub max_tasks_per_worker: Option<usize>,
    pub health_check_interval: Duration,
    pub worker: WorkerCommand,
}

impl PoolConfig {
    pub fn new(processes: usize, worker: WorkerCommand) -> Self {
        Self {
            processes,
            initializer: None,
            finalizer: None,
            max_tasks_per_worker: None,
            health_check_interval: Duration::from_millis(100),
            worker,
        }
    }
}

/// A task to submit.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub function: String,
    pub args: Value,
    /// Defaults to a fresh job id.
    pub job_id: Option<JobId>,
    pub sequence_index: usize,
}

impl TaskRequest {
    pub fn new(function: impl Into<String>, args: Value) -> Self {
        Self {
            function: function.into(),
            args,
            job_id: None,
            sequence_index: 0,
        }
    }

    /// Serialize typed arguments.
    pub fn with_args<T: Serialize>(function: impl Into<String>, args: &T) -> serde_json::Result<Self> {
        Ok(Self::new(function, serde_json::to_value(args)?))
    }

    pub fn keyed(mut self, job_id: JobId, sequence_index: usize) -> Self {
        self.job_id = Some(job_id);
        self.sequence_index = sequence_index;
        self
    }
}

struct WorkerEntry {
    pid: u32,
    driver: JoinHandle<()>,
}

/// State shared between the pool handle, drivers and the supervisor.
pub(crate) struct Shared {
    config: PoolConfig,
    queue_tx: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Task>>,
    pending: PendingTable,
    workers: Mutex<HashMap<usize, WorkerEntry>>,
    closing: AtomicBool,
    exit_tx: mpsc::UnboundedSender<WorkerExit>,
    next_worker_id: AtomicUsize,
}

impl Shared {
    /// Next queued task; `None` once the pool is closed and drained.
    async fn next_task(&self) -> Option<Task> {
        self.queue_rx.lock().await.recv().await
    }

    fn live_workers(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn remove_worker(&self, worker_id: usize) -> Option<JoinHandle<()>> {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&worker_id)
            .map(|w| w.driver)
    }
}

/// Start one worker and its driver; returns the new pid.
fn spawn_worker(shared: &Arc<Shared>) -> std::result::Result<u32, PoolError> {
    let worker_id = shared.next_worker_id.fetch_add(1, Ordering::SeqCst);
    let spec = WorkerSpec {
        worker_id,
        initializer: shared.config.initializer.clone(),
        finalizer: shared.config.finalizer.clone(),
        max_tasks: shared.config.max_tasks_per_worker,
    };

    let child = shared
        .config
        .worker
        .build(&spec)?
        .spawn()
        .map_err(|e| PoolError::Spawn(format!("{}: {e}", shared.config.worker.program.display())))?;
    let pid = child.id().unwrap_or(0);

    // Hold the lock across the spawn so the driver's exit cannot be reaped
    // before the entry exists.
    let mut workers = shared.workers.lock().unwrap_or_else(PoisonError::into_inner);
    let driver = tokio::spawn(drive_worker(Arc::clone(shared), worker_id, child));
    workers.insert(worker_id, WorkerEntry { pid, driver });
    debug!(worker_id, pid, "worker spawned");
    Ok(pid)
}

/// Process pool handle.
pub struct Pool {
    shared: Arc<Shared>,
    supervisor: Option<JoinHandle<()>>,
    next_job: AtomicU64,
}

impl Pool {
    /// Spawn `config.processes` workers and the supervisor.
    pub async fn start(config: PoolConfig) -> std::result::Result<Pool, PoolError> {
        if config.processes == 0 {
            return Err(PoolError::InvalidConfig("pool needs at least one process".to_string()));
        }
        if config.health_check_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "health_check_interval must be greater than zero".to_string(),
            ));
        }

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let processes = config.processes;
        let shared = Arc::new(Shared {
            config,
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            pending: PendingTable::default(),
            workers: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
            exit_tx,
            next_worker_id: AtomicUsize::new(0),
        });

        let mut pool = Pool {
            shared: Arc::clone(&shared),
            supervisor: None,
            next_job: AtomicU64::new(1),
        };
        for _ in 0..processes {
            spawn_worker(&shared)?;
        }
        pool.supervisor = Some(supervisor::spawn_supervisor(shared, exit_rx));

        info!(processes, "process pool started");
        Ok(pool)
    }

    /// A job id not used by any earlier submission from this pool.
    pub fn next_job_id(&self) -> JobId {
        self.next_job.fetch_add(1, Ordering::SeqCst)
    }

    /// Queue a task. Resolves when its result envelope arrives.
    pub fn submit(&self, request: TaskRequest) -> std::result::Result<ResultHandle, PoolError> {
        self.enqueue(request, false).map(|(handle, _)| handle)
    }

    /// Queue a task and get its live progress stream as well.
    pub fn submit_with_progress(
        &self,
        request: TaskRequest,
    ) -> std::result::Result<(ResultHandle, ProgressStream), PoolError> {
        let (handle, progress) = self.enqueue(request, true)?;
        match progress {
            Some(progress) => Ok((handle, progress)),
            None => Err(PoolError::Closed),
        }
    }

    /// Run one test target through the built-in execution task.
    pub fn run_target(
        &self,
        args: &RunTargetArgs,
    ) -> Result<(ResultHandle, ProgressStream)> {
        let request = TaskRequest::with_args(RUN_TARGET, args)?;
        Ok(self.submit_with_progress(request)?)
    }

    /// Run `function` over `items` and return the outcomes in input order.
    pub async fn map<T: Serialize>(
        &self,
        function: &str,
        items: impl IntoIterator<Item = T>,
    ) -> Result<Vec<Outcome>> {
        let job_id = self.next_job_id();
        let mut handles = Vec::new();
        for (seq, item) in items.into_iter().enumerate() {
            let request = TaskRequest::with_args(function, &item)?.keyed(job_id, seq);
            handles.push(self.submit(request)?);
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await?);
        }
        Ok(outcomes)
    }

    pub fn live_workers(&self) -> usize {
        self.shared.live_workers()
    }

    pub fn worker_pids(&self) -> Vec<u32> {
        let workers = self
            .shared
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut pids: Vec<u32> = workers.values().map(|w| w.pid).collect();
        pids.sort_unstable();
        pids
    }

    /// Results still outstanding.
    pub fn pending(&self) -> usize {
        self.shared.pending.len()
    }

    /// Stop accepting tasks. Queued tasks still run.
    pub fn close(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        let tx = self
            .shared
            .queue_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if tx.is_some() {
            debug!("pool closed to new tasks");
        }
    }

    /// Close the pool and wait until every worker has finalized and exited.
    pub async fn join(mut self) -> std::result::Result<(), PoolError> {
        self.close();
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(err) = supervisor.await {
                return Err(PoolError::Spawn(format!("supervisor task failed: {err}")));
            }
        }

        // Anything still queued lost every worker that could have run it.
        let mut leftovers = 0;
        {
            let mut rx = self.shared.queue_rx.lock().await;
            while let Ok(task) = rx.try_recv() {
                self.shared.pending.abandon((task.job_id, task.sequence_index));
                leftovers += 1;
            }
        }
        leftovers += self.shared.pending.abandon_all();
        if leftovers > 0 {
            info!(leftovers, "pool joined with unfinished tasks abandoned");
        } else {
            info!("pool joined");
        }
        Ok(())
    }

    fn enqueue(
        &self,
        request: TaskRequest,
        with_progress: bool,
    ) -> std::result::Result<(ResultHandle, Option<ProgressStream>), PoolError> {
        let queue = self
            .shared
            .queue_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let tx = queue.as_ref().ok_or(PoolError::Closed)?;

        let job_id = request.job_id.unwrap_or_else(|| self.next_job_id());
        let key = (job_id, request.sequence_index);
        let (handle, progress) = self.shared.pending.insert(key, with_progress)?;

        let task = Task {
            job_id,
            sequence_index: request.sequence_index,
            function: request.function,
            args: request.args,
        };
        if tx.send(task).is_err() {
            self.shared.pending.abandon(key);
            return Err(PoolError::Closed);
        }
        Ok((handle, progress))
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
        let mut workers = self
            .shared
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, worker) in workers.drain() {
            // Dropping the driver drops the child, which kills it.
            worker.driver.abort();
        }
    }
}
