// src/runner/hooks.rs

//! Worker start/exit hooks configured as shell commands.
//!
//! A command that exits non-zero is reported as a [`HookError`], which the
//! worker treats as non-fatal. Failing to start `sh` at all is fatal.

use std::io;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::worker::{Hook, HookError, TaskRegistry};

/// Registry name of the shell-command hook.
pub const SHELL_HOOK: &str = "shell_hook";

/// Register [`SHELL_HOOK`].
pub fn register_hooks(registry: &mut TaskRegistry) {
    registry.register_hook(SHELL_HOOK, |cmd: String| run_shell_hook(&cmd));
}

/// A hook that runs `cmd` with `sh -c` inside the worker.
pub fn shell_hook(cmd: &str) -> Hook {
    Hook::new(SHELL_HOOK, Value::String(cmd.to_string()))
}

fn run_shell_hook(cmd: &str) -> Result<()> {
    debug!(pid = std::process::id(), %cmd, "running worker hook");

    // Stdout is the protocol channel; hook output goes to stderr instead.
    let status = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(io::stderr()))
        .status()
        .with_context(|| format!("failed to start hook command `{cmd}`"))?;

    if status.success() {
        Ok(())
    } else {
        Err(HookError::new(format!("hook command `{cmd}` exited with {status}")).into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> TaskRegistry {
        let mut r = TaskRegistry::new();
        register_hooks(&mut r);
        r
    }

    #[test]
    fn successful_command_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let hook = registry().hook(SHELL_HOOK).unwrap();

        hook(json!(format!("touch '{}'", marker.display()))).unwrap();
        assert!(marker.exists());
    }

    #[test]
    fn non_zero_exit_is_a_hook_error() {
        let hook = registry().hook(SHELL_HOOK).unwrap();
        let err = hook(json!("exit 3")).unwrap_err();

        assert!(err.chain().any(|cause| cause.is::<HookError>()));
        assert!(err.to_string().contains("exit 3"));
    }

    #[test]
    fn shell_hook_carries_the_command() {
        let hook = shell_hook("echo hi");
        assert_eq!(hook.function, SHELL_HOOK);
        assert_eq!(hook.args, json!("echo hi"));
    }
}
