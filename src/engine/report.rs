// src/engine/report.rs

use std::io::{self, Write};

use super::Notice;
use super::core::Summary;
use crate::types::TestOutcome;

/// Receives what a session wants shown to the user.
pub trait Reporter: Send {
    fn notice(&mut self, notice: &Notice) -> io::Result<()>;
    fn summary(&mut self, summary: &Summary) -> io::Result<()>;
}

/// One line per finished test, diagnostics indented underneath, then a
/// summary line.
pub struct PlainReporter {
    out: Box<dyn Write + Send>,
    verbose: bool,
}

impl PlainReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            verbose: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Also print a line when each test starts.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn indented(&mut self, text: &str) -> io::Result<()> {
        for line in text.lines() {
            writeln!(self.out, "    {line}")?;
        }
        Ok(())
    }
}

impl Reporter for PlainReporter {
    fn notice(&mut self, notice: &Notice) -> io::Result<()> {
        match notice {
            Notice::TestStarted { test, .. } => {
                if self.verbose {
                    writeln!(self.out, "start {test}")?;
                }
            }
            Notice::TestFinished {
                test,
                outcome,
                diagnostic,
                ..
            } => {
                writeln!(self.out, "{:<5} {test}", outcome.to_string())?;
                let show = outcome.is_problem() || (*outcome == TestOutcome::Skip && self.verbose);
                if show && !diagnostic.is_empty() {
                    self.indented(diagnostic)?;
                }
            }
            Notice::TargetFailed { target, failure } => {
                writeln!(self.out, "error {target}: {failure}")?;
                self.indented(&failure.trace)?;
            }
            Notice::TargetLost { target, reason } => {
                writeln!(self.out, "lost  {target}: {reason}")?;
            }
            Notice::StreamIncomplete { target } => {
                writeln!(self.out, "warn  {target}: finished without end-of-stream marker")?;
            }
        }
        self.out.flush()
    }

    fn summary(&mut self, s: &Summary) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "Ran {} tests: {} passed, {} failed, {} errors, {} skipped",
            s.total(),
            s.passed,
            s.failed,
            s.errors,
            s.skipped
        )?;
        if !s.lost_targets.is_empty() {
            writeln!(self.out, "Lost targets: {}", s.lost_targets.join(", "))?;
        }
        writeln!(self.out, "{}", if s.is_success() { "OK" } else { "FAILED" })?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::types::ProtoTest;

    #[derive(Clone, Default)]
    struct Buf(Arc<Mutex<Vec<u8>>>);

    impl Write for Buf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn failures_show_diagnostics_and_summary_says_failed() {
        let buf = Buf::default();
        let mut reporter = PlainReporter::new(Box::new(buf.clone()));
        reporter
            .notice(&Notice::TestFinished {
                target: "m".into(),
                test: ProtoTest::new("m", "C", "t"),
                outcome: TestOutcome::Fail,
                diagnostic: "exit code 1\nexpected 2".into(),
            })
            .unwrap();
        reporter
            .summary(&Summary {
                failed: 1,
                ..Summary::default()
            })
            .unwrap();

        let text = buf.text();
        assert!(text.contains("fail  m.C.t"));
        assert!(text.contains("    expected 2"));
        assert!(text.contains("Ran 1 tests: 0 passed, 1 failed"));
        assert!(text.trim_end().ends_with("FAILED"));
    }

    #[test]
    fn passes_stay_quiet() {
        let buf = Buf::default();
        let mut reporter = PlainReporter::new(Box::new(buf.clone()));
        reporter
            .notice(&Notice::TestFinished {
                target: "m".into(),
                test: ProtoTest::new("m", "C", "t"),
                outcome: TestOutcome::Pass,
                diagnostic: "ignored".into(),
            })
            .unwrap();
        assert_eq!(buf.text(), "pass  m.C.t\n");
    }
}
