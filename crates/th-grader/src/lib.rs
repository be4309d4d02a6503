//! Grading-script discovery and execution.
//!
//! Code-submission tasks are graded by running an external script named
//! `<quest><task>-*.py` (e.g. `Q3T1-fix_bot.py`) found under an
//! allow-listed search root. Discovery enforces uniqueness: duplicate
//! matches are a loud error, never a silent first-match. Execution is an
//! isolated subprocess under a bounded timeout; every runtime failure
//! (missing interpreter, hung script) degrades to a failed
//! [`GradeReport`] rather than propagating.

mod discovery;
pub mod report;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use th_core::types::TaskKey;
use tokio::process::Command;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GraderError {
    #[error("no grading script matches `{0}-*.py`")]
    ScriptNotFound(String),
    #[error("ambiguous grading scripts for `{prefix}`: {matches:?}")]
    Ambiguous {
        prefix: String,
        matches: Vec<PathBuf>,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraderError>;

// ---------------------------------------------------------------------------
// GradeReport
// ---------------------------------------------------------------------------

/// Outcome of one grading run. Execution-level failures are reported
/// here as `passed: false` with a diagnostic, not as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeReport {
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl GradeReport {
    fn execution_failure(stderr: String) -> Self {
        Self {
            passed: false,
            stdout: String::new(),
            stderr,
            exit_code: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Grader
// ---------------------------------------------------------------------------

/// Locates and runs grading scripts for quest tasks.
pub struct Grader {
    root: PathBuf,
    interpreter: String,
    timeout: Duration,
}

impl Grader {
    pub fn new(root: impl Into<PathBuf>, interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find the unique grading script for a task.
    ///
    /// Traversal order is stabilised by sorting matches
    /// lexicographically, and more than one match is rejected outright.
    pub fn locate(&self, key: &TaskKey) -> Result<PathBuf> {
        let prefix = key.script_prefix();
        let mut matches = discovery::find_scripts(&self.root, &prefix);
        matches.sort();

        match matches.len() {
            0 => Err(GraderError::ScriptNotFound(prefix)),
            1 => Ok(matches.remove(0)),
            _ => Err(GraderError::Ambiguous { prefix, matches }),
        }
    }

    /// Locate and execute the grading script for a task.
    ///
    /// Returns `ScriptNotFound`/`Ambiguous` without spawning anything;
    /// once a script is found, the run itself cannot fail; it degrades
    /// to a failed report.
    pub async fn run(&self, key: &TaskKey) -> Result<GradeReport> {
        let script = self.locate(key)?;
        Ok(self.execute(&script).await)
    }

    async fn execute(&self, script: &Path) -> GradeReport {
        debug!(script = %script.display(), interpreter = %self.interpreter, "running grading script");

        let child = Command::new(&self.interpreter)
            .arg(script)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn grading interpreter");
                return GradeReport::execution_failure(format!(
                    "failed to execute grading script: {e}"
                ));
            }
        };

        // kill_on_drop reaps the child if the timeout wins the race.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to collect grading output");
                return GradeReport::execution_failure(format!(
                    "failed to collect grading output: {e}"
                ));
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "grading script timed out");
                return GradeReport::execution_failure(format!(
                    "grading script timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
        };

        GradeReport {
            passed: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
