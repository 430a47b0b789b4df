// src/runner/tempdir.rs

//! Per-run private temp storage.
//!
//! Each execution gets its own directory under the process default temp
//! root. The directory is handed to test commands through [`RunContext`]
//! (as `TMPDIR`, `TMP` and `TEMP`) instead of changing any global setting,
//! and it is removed when the [`TempRoot`] goes away.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::process::Command;

/// Environment variables that point a child process at its temp root.
pub const TEMP_VARS: [&str; 3] = ["TMPDIR", "TMP", "TEMP"];

/// Private temp directory for one run, deleted on drop.
#[derive(Debug)]
pub struct TempRoot {
    dir: TempDir,
    previous: PathBuf,
}

impl TempRoot {
    /// Create a fresh root under the current default temp directory.
    pub fn create() -> io::Result<Self> {
        Self::create_in(std::env::temp_dir())
    }

    pub fn create_in(parent: impl AsRef<Path>) -> io::Result<Self> {
        let previous = parent.as_ref().to_path_buf();
        let dir = tempfile::Builder::new()
            .prefix("greenpool-")
            .tempdir_in(&previous)?;
        Ok(Self { dir, previous })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The default root this one was created under; it is never modified.
    pub fn previous(&self) -> &Path {
        &self.previous
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// Everything a runnable needs to know about the environment of this run.
#[derive(Debug, Clone)]
pub struct RunContext {
    temp_root: PathBuf,
    env: Vec<(String, OsString)>,
}

impl RunContext {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
            env: Vec::new(),
        }
    }

    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<OsString>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Extra variables (coverage and friends), not including the temp vars.
    pub fn env(&self) -> impl Iterator<Item = (&str, &OsString)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Shell command with this run's environment applied.
    pub fn shell_command(&self, script: &str) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(script);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(script);
            c
        };
        for var in TEMP_VARS {
            cmd.env(var, &self.temp_root);
        }
        for (k, v) in self.env() {
            cmd.env(k, v);
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_root_lives_under_parent_and_is_removed() {
        let parent = tempfile::tempdir().unwrap();
        let root = TempRoot::create_in(parent.path()).unwrap();
        let path = root.path().to_path_buf();

        assert!(path.starts_with(parent.path()));
        assert_eq!(root.previous(), parent.path());
        std::fs::write(path.join("scratch"), b"x").unwrap();

        root.close().unwrap();
        assert!(!path.exists());
        assert!(parent.path().exists(), "parent root must be left alone");
    }

    #[test]
    fn dropping_removes_root() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let root = TempRoot::create_in(parent.path()).unwrap();
            root.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn two_roots_never_collide() {
        let parent = tempfile::tempdir().unwrap();
        let a = TempRoot::create_in(parent.path()).unwrap();
        let b = TempRoot::create_in(parent.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn context_carries_extra_env() {
        let ctx = RunContext::new("/tmp/x").with_env([("LLVM_PROFILE_FILE", "/cov/%p.profraw")]);
        let vars: Vec<_> = ctx.env().map(|(k, _)| k.to_string()).collect();
        assert_eq!(vars, vec!["LLVM_PROFILE_FILE"]);
        assert_eq!(ctx.temp_root(), Path::new("/tmp/x"));
    }
}
