// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::JobId;

#[derive(Error, Debug)]
pub enum GreenpoolError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced by the process pool to the coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool is closed; no further tasks are accepted")]
    Closed,

    #[error("task ({job_id}, {sequence_index}) is already pending")]
    DuplicateTask { job_id: JobId, sequence_index: usize },

    #[error("worker {pid} exited while running task ({job_id}, {sequence_index}); result lost")]
    WorkerLost {
        job_id: JobId,
        sequence_index: usize,
        pid: u32,
    },

    #[error("result channel dropped before task ({job_id}, {sequence_index}) completed")]
    Abandoned { job_id: JobId, sequence_index: usize },

    #[error("failed to spawn worker process: {0}")]
    Spawn(String),

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GreenpoolError>;
