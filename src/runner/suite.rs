// src/runner/suite.rs

//! Manifest tests run as shell commands.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use super::loader::Runnable;
use super::result::ResultSink;
use super::tempdir::RunContext;
use crate::config::TestEntry;

/// Captured output is cut to this many trailing lines in diagnostics.
const DIAGNOSTIC_TAIL: usize = 40;

/// Runs each selected test's `cmd` through the shell, one after another.
///
/// Exit code 0 is a pass, `skip_exit_code` a skip, anything else a failure.
/// A command that cannot be spawned or exceeds its timeout is an error.
#[derive(Debug, Clone)]
pub struct CommandSuite {
    tests: Vec<TestEntry>,
    skip_exit_code: i32,
}

enum CommandResult {
    Exited { code: i32, output: String },
    TimedOut(Duration),
}

impl CommandSuite {
    pub fn new(tests: Vec<TestEntry>, skip_exit_code: i32) -> Self {
        Self {
            tests,
            skip_exit_code,
        }
    }

    pub fn tests(&self) -> &[TestEntry] {
        &self.tests
    }

    fn run_one(&self, rt: &tokio::runtime::Runtime, test: &TestEntry, result: &mut dyn ResultSink, ctx: &RunContext) {
        let proto = test.proto_test();
        result.start_test(&proto);

        if let Some(reason) = &test.skip {
            result.add_skip(&proto, reason);
            result.stop_test(&proto);
            return;
        }

        match rt.block_on(run_command(test, ctx)) {
            Ok(CommandResult::Exited { code: 0, .. }) => result.add_success(&proto),
            Ok(CommandResult::Exited { code, output }) if code == self.skip_exit_code => {
                let reason = output.lines().last().unwrap_or("skipped").to_string();
                result.add_skip(&proto, &reason);
            }
            Ok(CommandResult::Exited { code, output }) => {
                result.add_failure(&proto, &format!("exit code {code}\n{output}"));
            }
            Ok(CommandResult::TimedOut(limit)) => {
                result.add_error(&proto, &format!("timed out after {limit:?}"));
            }
            Err(err) => result.add_error(&proto, &format!("{err:?}")),
        }
        result.stop_test(&proto);
    }
}

impl Runnable for CommandSuite {
    fn run(&self, result: &mut dyn ResultSink, ctx: &RunContext) -> Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building runtime for test commands")?;

        for test in &self.tests {
            self.run_one(&rt, test, result, ctx);
        }
        Ok(())
    }
}

async fn run_command(test: &TestEntry, ctx: &RunContext) -> Result<CommandResult> {
    info!(test = %test.id(), cmd = %test.cmd, "starting test command");

    let mut cmd = ctx.shell_command(&test.cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning command for test '{}'", test.id()))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let collect = async {
        let (out, err) = tokio::join!(read_lines(stdout), read_lines(stderr));
        let mut lines = out;
        lines.extend(err);
        lines
    };

    let run = async {
        let (lines, status) = tokio::join!(collect, child.wait());
        (lines, status)
    };

    let (lines, status) = match test.timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(done) => done,
            Err(_) => {
                debug!(test = %test.id(), ?limit, "test command timed out; killing");
                return Ok(CommandResult::TimedOut(limit));
            }
        },
        None => run.await,
    };

    let status = status.with_context(|| format!("waiting for command of test '{}'", test.id()))?;
    let code = status.code().unwrap_or(-1);
    info!(test = %test.id(), exit_code = code, "test command exited");

    let skip = lines.len().saturating_sub(DIAGNOSTIC_TAIL);
    Ok(CommandResult::Exited {
        code,
        output: lines[skip..].join("\n"),
    })
}

async fn read_lines<R>(reader: Option<R>) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut out = Vec::new();
    if let Some(reader) = reader {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            out.push(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::result::ProtoTestResult;
    use crate::types::{ProgressEvent, TestOutcome};

    fn entry(method: &str, cmd: &str) -> TestEntry {
        TestEntry {
            module: "m".into(),
            class: "C".into(),
            method: method.into(),
            cmd: cmd.into(),
            description: String::new(),
            timeout: None,
            skip: None,
        }
    }

    fn outcomes(suite: &CommandSuite, ctx: &RunContext) -> Vec<(String, TestOutcome, String)> {
        let mut seen = Vec::new();
        {
            let mut result = ProtoTestResult::new(|ev| seen.push(ev));
            suite.run(&mut result, ctx).unwrap();
        }
        seen.into_iter()
            .filter_map(|ev| match ev {
                ProgressEvent::Finished {
                    test,
                    outcome,
                    diagnostic,
                } => Some((test.method_name, outcome, diagnostic)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn exit_codes_map_to_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let mut slow = entry("slow", "sleep 5");
        slow.timeout = Some(Duration::from_millis(100));
        let mut skipped = entry("declared_skip", "false");
        skipped.skip = Some("not on this platform".into());

        let suite = CommandSuite::new(
            vec![
                entry("ok", "true"),
                entry("bad", "echo nope; exit 3"),
                entry("skip", "echo no network; exit 77"),
                skipped,
                slow,
            ],
            77,
        );
        let got = outcomes(&suite, &RunContext::new(dir.path()));

        assert_eq!(got[0].1, TestOutcome::Pass);
        assert_eq!(got[1].1, TestOutcome::Fail);
        assert!(got[1].2.contains("exit code 3"));
        assert!(got[1].2.contains("nope"));
        assert_eq!(got[2], ("skip".into(), TestOutcome::Skip, "no network".into()));
        assert_eq!(got[3].1, TestOutcome::Skip);
        assert_eq!(got[3].2, "not on this platform");
        assert_eq!(got[4].1, TestOutcome::Error);
        assert!(got[4].2.contains("timed out"));
    }

    #[test]
    fn commands_see_private_temp_root() {
        let dir = tempfile::tempdir().unwrap();
        let suite = CommandSuite::new(vec![entry("tmp", "test \"$TMPDIR\" = \"$EXPECTED\"")], 77);
        let ctx = RunContext::new(dir.path()).with_env([("EXPECTED", dir.path().as_os_str())]);
        let got = outcomes(&suite, &ctx);
        assert_eq!(got[0].1, TestOutcome::Pass, "diagnostic: {}", got[0].2);
    }
}
