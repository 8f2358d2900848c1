//! External command execution with a wall-clock limit.
//!
//! Used for black-box collaborators (test runner, coverage collector) whose
//! exit status and raw output are reported but never parsed structurally.
//! Output is spooled to anonymous temp files so a chatty child can never
//! block on a full pipe while we wait for it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How to run an external command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program followed by its arguments.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub current_dir: PathBuf,
    /// Wall-clock limit; the child is killed when exceeded.
    pub timeout: Duration,
    /// Additional environment variables.
    pub extra_env: HashMap<String, String>,
}

impl CommandSpec {
    /// Create a spec with the default five minute limit.
    pub fn new(args: Vec<String>, current_dir: impl Into<PathBuf>) -> Self {
        CommandSpec {
            args,
            current_dir: current_dir.into(),
            timeout: Duration::from_secs(300),
            extra_env: HashMap::new(),
        }
    }

    /// Set the wall-clock limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add an environment variable for the child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }
}

/// Result of running an external command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Whether the command succeeded (exit code 0).
    pub success: bool,
    /// Exit code if available.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// How long the command took.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Whether the command was killed for exceeding its limit.
    pub timed_out: bool,
    /// The command that was run.
    pub command: Vec<String>,
}

impl CommandOutcome {
    /// Stdout followed by stderr, as one block of text.
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.clone();
        if !out.is_empty() && !out.ends_with('\n') && !self.stderr.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// Serde helper for serializing `Duration` as `f64` seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Run a command to completion or until its limit expires.
///
/// Returns `Err` only when the command cannot be launched at all; a non-zero
/// exit or a timeout is reported through [`CommandOutcome`].
pub fn run_command(spec: &CommandSpec) -> io::Result<CommandOutcome> {
    if spec.args.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "Empty command"));
    }

    let mut stdout_file = tempfile::tempfile()?;
    let mut stderr_file = tempfile::tempfile()?;

    let mut cmd = Command::new(&spec.args[0]);
    cmd.args(&spec.args[1..])
        .current_dir(&spec.current_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file.try_clone()?))
        .stderr(Stdio::from(stderr_file.try_clone()?));
    for (key, value) in &spec.extra_env {
        cmd.env(key, value);
    }

    debug!(command = ?spec.args, cwd = %spec.current_dir.display(), "spawning");
    let start = Instant::now();
    let mut child = cmd.spawn()?;

    // Wait with timeout using OS-level waiting (no polling)
    let (status, timed_out) = match child.wait_timeout(spec.timeout)? {
        Some(status) => (Some(status), false),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            warn!(
                "Command timed out after {:?}: {:?}",
                start.elapsed(),
                spec.args
            );
            (None, true)
        }
    };
    let duration = start.elapsed();

    let stdout = read_spool(&mut stdout_file)?;
    let mut stderr = read_spool(&mut stderr_file)?;
    if timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "Command timed out after {:?} (limit: {:?})",
            duration, spec.timeout
        ));
    }

    Ok(CommandOutcome {
        success: status.is_some_and(|s| s.success()),
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        duration,
        timed_out,
        command: spec.args.clone(),
    })
}

fn read_spool(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Check whether `program` runs with `args` and exits successfully.
pub fn exits_cleanly(program: &Path, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_command_is_rejected() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::new(Vec::new(), temp.path());
        let err = run_command(&spec).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::new(
            vec!["tugtest-definitely-not-a-program".to_string()],
            temp.path(),
        );
        assert!(run_command(&spec).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_and_exit_code() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo out; echo err 1>&2; exit 3".to_string(),
            ],
            temp.path(),
        );
        let outcome = run_command(&spec).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert!(!outcome.timed_out);
        assert_eq!(outcome.combined_output(), "out\nerr\n");
    }

    #[cfg(unix)]
    #[test]
    fn passes_extra_env() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "printf %s \"$TUGTEST_GREETING\"".to_string(),
            ],
            temp.path(),
        )
        .with_env("TUGTEST_GREETING", "hello");
        let outcome = run_command(&spec).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.stdout, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn kills_command_after_timeout() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::new(
            vec!["sleep".to_string(), "5".to_string()],
            temp.path(),
        )
        .with_timeout(Duration::from_millis(100));
        let outcome = run_command(&spec).unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.stderr.contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn large_output_does_not_block() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "i=0; while [ $i -lt 20000 ]; do echo 0123456789; i=$((i+1)); done".to_string(),
            ],
            temp.path(),
        )
        .with_timeout(Duration::from_secs(30));
        let outcome = run_command(&spec).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.stdout.len(), 20000 * 11);
    }

    #[cfg(unix)]
    #[test]
    fn exits_cleanly_reports_exit_status() {
        assert!(exits_cleanly(Path::new("sh"), &["-c", "exit 0"]));
        assert!(!exits_cleanly(Path::new("sh"), &["-c", "exit 1"]));
        assert!(!exits_cleanly(Path::new("tugtest-definitely-not-a-program"), &[]));
    }
}
