// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod pool;
pub mod runner;
pub mod transport;
pub mod types;
pub mod worker;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::engine::{PlainReporter, PoolDispatcher, Session};
use crate::errors::{GreenpoolError, Result};
use crate::pool::{Pool, PoolConfig, WorkerCommand};
use crate::runner::{ManifestLoader, ProfileCoverage, shell_hook};
use crate::worker::{TaskRegistry, WorkerSpec, run_worker_process};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - manifest loading
/// - the process pool
/// - the coordinator session and reporter
/// - Ctrl-C handling
///
/// Returns whether every selected test passed.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let targets = if args.targets.is_empty() {
        cfg.modules()
    } else {
        args.targets.clone()
    };

    if args.dry_run {
        print_dry_run(&cfg, &targets);
        return Ok(true);
    }

    let mut worker = WorkerCommand::current_exe()?
        .arg("--config")
        .arg(&config_path);
    if let Some(level) = args.log_level {
        worker = worker.arg("--log-level").arg(level.as_str());
    }

    let processes = args
        .processes
        .unwrap_or_else(|| cfg.config.effective_processes());
    let pool_config = PoolConfig {
        processes,
        initializer: cfg.config.initializer.as_deref().map(shell_hook),
        finalizer: cfg.config.finalizer.as_deref().map(shell_hook),
        max_tasks_per_worker: cfg.config.effective_max_tasks(),
        health_check_interval: cfg.health_check_interval,
        worker,
    };
    let pool = Arc::new(Pool::start(pool_config).await?);

    let mut dispatcher = PoolDispatcher::new(Arc::clone(&pool));
    if args.coverage || cfg.coverage.enabled {
        dispatcher = dispatcher.with_coverage(cfg.coverage.omit.clone());
    }
    let reporter = PlainReporter::stdout().verbose(args.verbose);
    let session = Session::new(dispatcher, reporter);

    info!(?targets, processes, "running targets");
    let summary = tokio::select! {
        summary = session.run(targets) => summary?,
        res = tokio::signal::ctrl_c() => {
            res?;
            warn!("interrupted; stopping workers");
            return Err(GreenpoolError::Other(anyhow::anyhow!("interrupted")));
        }
    };

    debug!(pending = pool.pending(), "session finished; joining pool");
    match Arc::try_unwrap(pool) {
        Ok(pool) => pool.join().await?,
        Err(_) => debug!("pool still shared at exit; workers are killed on drop"),
    }

    Ok(summary.is_success())
}

/// Worker-mode entry point: `--internal-worker`.
pub fn run_worker(args: &CliArgs) -> ExitCode {
    let spec = match args.worker_spec.as_deref().map(WorkerSpec::from_json) {
        Some(Ok(spec)) => spec,
        Some(Err(err)) => {
            eprintln!("greenpool worker: invalid --worker-spec: {err}");
            return ExitCode::FAILURE;
        }
        None => WorkerSpec::default(),
    };

    let registry = worker_registry(Path::new(&args.config));
    run_worker_process(Arc::new(registry), spec)
}

/// Task functions and hooks available inside a worker.
pub fn worker_registry(config_path: &Path) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    let loader = Arc::new(ManifestLoader::new(config_path));
    let coverage = Arc::new(ProfileCoverage::new(config_root_dir(config_path)));
    runner::register(&mut registry, loader, coverage);
    runner::register_hooks(&mut registry);
    registry
}

/// Directory that holds the manifest; coverage data files land here.
///
/// - If the config path has a non-empty parent (e.g. "ci/Greenpool.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Greenpool.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Simple dry-run output: print settings and the tests each target selects.
fn print_dry_run(cfg: &ConfigFile, targets: &[String]) {
    println!("greenpool dry-run");
    println!(
        "  config.processes = {}",
        cfg.config.effective_processes()
    );
    println!(
        "  config.max_tasks_per_worker = {}",
        cfg.config.max_tasks_per_worker
    );
    if let Some(ref cmd) = cfg.config.initializer {
        println!("  config.initializer = {cmd}");
    }
    if let Some(ref cmd) = cfg.config.finalizer {
        println!("  config.finalizer = {cmd}");
    }
    println!("  coverage.enabled = {}", cfg.coverage.enabled);
    println!();

    for target in targets {
        let selected = cfg.select(target);
        println!("{target} ({} tests):", selected.len());
        for test in selected {
            println!("  - {}", test.id());
            println!("      cmd: {}", test.cmd);
            if let Some(timeout) = test.timeout {
                println!("      timeout: {timeout:?}");
            }
            if let Some(ref reason) = test.skip {
                println!("      skip: {reason}");
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
