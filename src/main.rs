// src/main.rs

use std::process::ExitCode;

use greenpool::{cli, logging, run, run_worker};

fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("greenpool: {err:#}");
    }

    // Worker mode must stay outside any async runtime: test commands get
    // their own runtime inside the worker.
    if args.internal_worker {
        return run_worker(&args);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("greenpool error: failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("greenpool error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
