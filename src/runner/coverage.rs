// src/runner/coverage.rs

//! Per-run coverage sessions.
//!
//! Every execution that asks for coverage gets its own session whose data
//! file name carries a random salt, so concurrent runs never share a file.
//! Combining the files afterwards is left to the coverage tooling.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rand::Rng;
use serde::Serialize;
use tracing::debug;

/// Data file name for coverage session `number`: `.coverage.{number}_{salt}`.
pub fn session_name(number: u32) -> String {
    let salt: u32 = rand::thread_rng().gen_range(0..=10_000);
    format!(".coverage.{number}_{salt}")
}

/// Starts coverage sessions.
pub trait Coverage: Send + Sync {
    fn begin(&self, session: &str, omit_patterns: &[String]) -> Result<Box<dyn CoverageSession>>;
}

/// One running coverage measurement.
pub trait CoverageSession {
    /// Variables that test commands need to report into this session.
    fn env(&self) -> Vec<(String, OsString)>;
    /// Stop measuring.
    fn finish(&mut self) -> Result<()>;
    /// Write the session's data file.
    fn persist(&mut self) -> Result<()>;
}

/// Coverage that does nothing; used when coverage is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCoverage;

impl Coverage for NoCoverage {
    fn begin(&self, _session: &str, _omit: &[String]) -> Result<Box<dyn CoverageSession>> {
        Ok(Box::new(NoSession))
    }
}

struct NoSession;

impl CoverageSession for NoSession {
    fn env(&self) -> Vec<(String, OsString)> {
        Vec::new()
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        Ok(())
    }
}

/// LLVM source-based coverage for instrumented test commands.
///
/// Test commands are pointed at `LLVM_PROFILE_FILE`; on persist, the raw
/// profiles written for the session (minus omitted paths) are listed in a
/// JSON record stored under the session's data file name.
#[derive(Debug, Clone)]
pub struct ProfileCoverage {
    data_dir: PathBuf,
}

impl ProfileCoverage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl Coverage for ProfileCoverage {
    fn begin(&self, session: &str, omit_patterns: &[String]) -> Result<Box<dyn CoverageSession>> {
        let omit = compile_omit(omit_patterns)?;
        let profile_dir = self.data_dir.join(format!("{session}.profraw.d"));
        fs::create_dir_all(&profile_dir)
            .with_context(|| format!("creating coverage profile dir {}", profile_dir.display()))?;

        debug!(session, dir = %profile_dir.display(), "coverage session started");
        Ok(Box::new(ProfileSession {
            data_file: self.data_dir.join(session),
            profile_dir,
            omit,
            omit_patterns: omit_patterns.to_vec(),
            started: unix_millis(),
            finished: None,
        }))
    }
}

struct ProfileSession {
    data_file: PathBuf,
    profile_dir: PathBuf,
    omit: GlobSet,
    omit_patterns: Vec<String>,
    started: u64,
    finished: Option<u64>,
}

#[derive(Serialize)]
struct SessionRecord<'a> {
    session: String,
    started_ms: u64,
    finished_ms: Option<u64>,
    omit: &'a [String],
    profiles: Vec<PathBuf>,
}

impl CoverageSession for ProfileSession {
    fn env(&self) -> Vec<(String, OsString)> {
        let pattern = self.profile_dir.join("%p-%m.profraw");
        vec![("LLVM_PROFILE_FILE".to_string(), pattern.into_os_string())]
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = Some(unix_millis());
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        let profiles = collect_profiles(&self.profile_dir, &self.omit)?;
        let record = SessionRecord {
            session: self
                .data_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            started_ms: self.started,
            finished_ms: self.finished,
            omit: &self.omit_patterns,
            profiles,
        };
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&self.data_file, json)
            .with_context(|| format!("writing coverage data file {}", self.data_file.display()))?;
        debug!(file = %self.data_file.display(), "coverage session saved");
        Ok(())
    }
}

fn compile_omit(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid coverage omit pattern '{pat}'"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn collect_profiles(dir: &Path, omit: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if omit.is_match(&path) {
            continue;
        }
        out.push(path);
    }
    out.sort();
    Ok(out)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
