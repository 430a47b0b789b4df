// src/runner/loader.rs

//! Resolving target ids to something that can run.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use super::result::ResultSink;
use super::suite::CommandSuite;
use super::tempdir::RunContext;
use crate::config::load_and_validate;

/// A loaded target that reports into a [`ResultSink`].
pub trait Runnable {
    fn run(&self, result: &mut dyn ResultSink, ctx: &RunContext) -> Result<()>;
}

/// What a loader found for a target.
pub enum Loaded {
    Runnable(Box<dyn Runnable>),
    /// Loading worked but produced nothing runnable; carries a description
    /// of what was found instead.
    Unrunnable(String),
}

/// Resolves dotted target ids (`module`, `module.class`,
/// `module.class.method`).
pub trait Loader: Send + Sync {
    fn resolve(&self, target: &str) -> Result<Loaded>;
}

/// Loader backed by the `[[test]]` entries of a manifest.
///
/// The manifest is read on every resolve, so a broken manifest surfaces as
/// a loader error for the target rather than a dead worker.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    path: PathBuf,
}

impl ManifestLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Loader for ManifestLoader {
    fn resolve(&self, target: &str) -> Result<Loaded> {
        if target.is_empty() || target.split('.').any(str::is_empty) {
            bail!("malformed target id '{target}'");
        }

        let cfg = load_and_validate(&self.path)
            .with_context(|| format!("loading manifest {}", self.path.display()))?;

        let tests: Vec<_> = cfg.select(target).into_iter().cloned().collect();
        if tests.is_empty() {
            return Ok(Loaded::Unrunnable(format!(
                "no tests in {} match '{target}'",
                self.path.display()
            )));
        }

        Ok(Loaded::Runnable(Box::new(CommandSuite::new(
            tests,
            cfg.config.skip_exit_code,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const MANIFEST: &str = r#"
[[test]]
module = "math"
class = "Arith"
method = "add"
cmd = "true"

[[test]]
module = "math"
class = "Arith"
method = "sub"
cmd = "true"

[[test]]
module = "text"
class = "Fmt"
method = "pad"
cmd = "true"
"#;

    fn loader() -> (tempfile::TempDir, ManifestLoader) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Greenpool.toml");
        fs::write(&path, MANIFEST).unwrap();
        (dir, ManifestLoader::new(path))
    }

    #[test]
    fn resolves_module_class_and_method() {
        let (_dir, loader) = loader();
        for target in ["math", "math.Arith", "math.Arith.add"] {
            assert!(matches!(loader.resolve(target).unwrap(), Loaded::Runnable(_)));
        }
    }

    #[test]
    fn unknown_target_is_unrunnable() {
        let (_dir, loader) = loader();
        match loader.resolve("math.Nope.add").unwrap() {
            Loaded::Unrunnable(desc) => assert!(desc.contains("math.Nope.add")),
            Loaded::Runnable(_) => panic!("expected unrunnable"),
        }
    }

    #[test]
    fn malformed_target_is_a_loader_error() {
        let (_dir, loader) = loader();
        assert!(loader.resolve("math..add").is_err());
    }

    #[test]
    fn missing_manifest_is_a_loader_error() {
        let loader = ManifestLoader::new("/definitely/not/Greenpool.toml");
        let err = loader.resolve("math").err().unwrap();
        assert!(format!("{err:#}").contains("loading manifest"));
    }
}
