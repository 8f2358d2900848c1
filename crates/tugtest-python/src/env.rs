//! Python interpreter resolution.
//!
//! ## Resolution Order
//!
//! 1. Explicit `--python` flag
//! 2. `$TUGTEST_PYTHON` environment variable
//! 3. `$VIRTUAL_ENV/bin/python` (active venv)
//! 4. `$CONDA_PREFIX/bin/python` (active conda env)
//! 5. `python3` / `python` from `$PATH`
//!
//! The first interpreter that runs and reports version 3.9 or newer wins.
//! Every rejected candidate is recorded in a [`ResolutionTrace`] so the
//! failure message can say exactly what was tried.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Resolution Trace
// ============================================================================

/// A single step in the resolution process.
#[derive(Debug, Clone)]
pub struct ResolutionStep {
    /// Source being checked (e.g., "$TUGTEST_PYTHON", "$PATH").
    pub source: String,
    pub found: Option<PathBuf>,
    pub version: Option<String>,
    /// Why this step failed (if it failed).
    pub failure_reason: Option<String>,
}

impl ResolutionStep {
    pub fn not_set(source: impl Into<String>) -> Self {
        ResolutionStep {
            source: source.into(),
            found: None,
            version: None,
            failure_reason: Some("not set".to_string()),
        }
    }

    pub fn not_found(source: impl Into<String>) -> Self {
        ResolutionStep {
            source: source.into(),
            found: None,
            version: None,
            failure_reason: Some("not found".to_string()),
        }
    }

    fn rejected(source: &str, path: &Path, version: Option<String>, reason: String) -> Self {
        ResolutionStep {
            source: source.to_string(),
            found: Some(path.to_path_buf()),
            version,
            failure_reason: Some(reason),
        }
    }
}

impl std::fmt::Display for ResolutionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.source)?;
        if let Some(ref path) = self.found {
            write!(f, "found {}", path.display())?;
            if let Some(ref version) = self.version {
                write!(f, " ({})", version)?;
            }
            if let Some(ref reason) = self.failure_reason {
                write!(f, " - {}", reason)?;
            }
        } else if let Some(ref reason) = self.failure_reason {
            write!(f, "{}", reason)?;
        }
        Ok(())
    }
}

/// Trace of all resolution steps attempted.
#[derive(Debug, Clone, Default)]
pub struct ResolutionTrace {
    pub steps: Vec<ResolutionStep>,
}

impl ResolutionTrace {
    pub fn new() -> Self {
        ResolutionTrace { steps: Vec::new() }
    }

    pub fn add(&mut self, step: ResolutionStep) {
        self.steps.push(step);
    }

    /// Format the trace for display.
    pub fn format_trace(&self) -> String {
        let mut output = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, step));
        }
        output
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during Python environment resolution.
#[derive(Debug, Error)]
pub enum PythonEnvError {
    /// No usable Python interpreter found.
    #[error("{}", format_python_not_found_error(.trace))]
    PythonNotFound { trace: ResolutionTrace },

    #[error("Python version {found} is too old (minimum: {minimum})")]
    VersionTooOld { found: String, minimum: String },

    /// Failed to execute Python.
    #[error("failed to execute Python at {path}: {reason}")]
    ExecutionFailed { path: PathBuf, reason: String },

    #[error("invalid Python version string: {version}")]
    InvalidVersion { version: String },
}

/// Format the "Python not found" error with actionable remediation.
fn format_python_not_found_error(trace: &ResolutionTrace) -> String {
    let mut msg = String::from("no Python interpreter found\n\n");
    msg.push_str("tugtest requires Python 3.9+ to execute the functions under test.\n\n");

    if !trace.steps.is_empty() {
        msg.push_str("Resolution attempted:\n");
        msg.push_str(&trace.format_trace());
        msg.push('\n');
    }

    msg.push_str("Remediation:\n");
    msg.push_str("  a) Activate a virtual environment that provides python3\n");
    msg.push_str("  b) export TUGTEST_PYTHON=/path/to/python3\n");
    msg.push_str("  c) tugtest --python /path/to/python3 generate ...\n");

    msg
}

/// Result type for Python environment operations.
pub type PythonEnvResult<T> = Result<T, PythonEnvError>;

// ============================================================================
// Python Version
// ============================================================================

/// Parsed Python version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        PythonVersion {
            major,
            minor,
            patch,
        }
    }

    /// Minimum required Python version (3.9.0).
    pub fn minimum() -> Self {
        PythonVersion::new(3, 9, 0)
    }

    /// Parse a version string like "3.11.4" or "Python 3.11.4".
    pub fn parse(version_str: &str) -> PythonEnvResult<Self> {
        let version_str = version_str
            .strip_prefix("Python ")
            .unwrap_or(version_str)
            .trim();
        let invalid = || PythonEnvError::InvalidVersion {
            version: version_str.to_string(),
        };

        let parts: Vec<&str> = version_str.split('.').collect();
        if parts.len() < 2 {
            return Err(invalid());
        }

        let major = parts[0].parse::<u32>().map_err(|_| invalid())?;
        let minor = parts[1].parse::<u32>().map_err(|_| invalid())?;

        // Patch may carry a suffix like "3.11.4+" or "3.13.0rc1"
        let patch_digits: String = parts
            .get(2)
            .unwrap_or(&"0")
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let patch = patch_digits.parse::<u32>().unwrap_or(0);

        Ok(PythonVersion {
            major,
            minor,
            patch,
        })
    }

    pub fn meets_minimum(&self) -> bool {
        *self >= Self::minimum()
    }
}

impl std::fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ============================================================================
// Resolved Environment
// ============================================================================

/// Where the interpreter was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    CliFlag,
    EnvTugtestPython,
    VirtualEnv,
    CondaPrefix,
    Path,
}

impl ResolutionSource {
    fn label(self) -> &'static str {
        match self {
            ResolutionSource::CliFlag => "--python flag",
            ResolutionSource::EnvTugtestPython => "$TUGTEST_PYTHON",
            ResolutionSource::VirtualEnv => "$VIRTUAL_ENV",
            ResolutionSource::CondaPrefix => "$CONDA_PREFIX",
            ResolutionSource::Path => "$PATH",
        }
    }
}

/// A validated Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonEnv {
    interpreter: PathBuf,
    version: PythonVersion,
    source: ResolutionSource,
}

impl PythonEnv {
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn version(&self) -> &PythonVersion {
        &self.version
    }

    pub fn source(&self) -> ResolutionSource {
        self.source
    }

    /// Whether `coverage` is importable by this interpreter.
    pub fn has_coverage(&self) -> bool {
        check_module(&self.interpreter, "coverage")
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Platform-specific Python binary names.
#[cfg(windows)]
pub(crate) const PYTHON_NAMES: &[&str] = &["python.exe", "python3.exe"];

#[cfg(not(windows))]
pub(crate) const PYTHON_NAMES: &[&str] = &["python3", "python"];

#[cfg(windows)]
pub(crate) const VENV_BIN_DIR: &str = "Scripts";

#[cfg(not(windows))]
pub(crate) const VENV_BIN_DIR: &str = "bin";

/// Resolve a Python interpreter.
///
/// An explicit path is used as-is; failing validation is an error rather
/// than a fall-through to discovery.
pub fn resolve_python(explicit: Option<&Path>) -> PythonEnvResult<PythonEnv> {
    if let Some(path) = explicit {
        // A bare name like `python3.12` is looked up on PATH
        let located = if path.exists() {
            Some(path.to_path_buf())
        } else {
            which::which(path).ok()
        };
        let Some(located) = located else {
            return Err(PythonEnvError::ExecutionFailed {
                path: path.to_path_buf(),
                reason: "path does not exist".to_string(),
            });
        };
        return validate(located, ResolutionSource::CliFlag);
    }

    let mut trace = ResolutionTrace::new();
    trace.add(ResolutionStep::not_set("--python flag"));

    // $TUGTEST_PYTHON
    match std::env::var_os("TUGTEST_PYTHON") {
        Some(value) => {
            let path = PathBuf::from(value);
            if let Some(env) = try_candidate(&path, ResolutionSource::EnvTugtestPython, &mut trace)
            {
                return Ok(env);
            }
        }
        None => trace.add(ResolutionStep::not_set("$TUGTEST_PYTHON")),
    }

    // $VIRTUAL_ENV and $CONDA_PREFIX
    for (var, source) in [
        ("VIRTUAL_ENV", ResolutionSource::VirtualEnv),
        ("CONDA_PREFIX", ResolutionSource::CondaPrefix),
    ] {
        let Some(prefix) = std::env::var_os(var) else {
            trace.add(ResolutionStep::not_set(source.label()));
            continue;
        };
        let bin_dir = PathBuf::from(prefix).join(VENV_BIN_DIR);
        let mut found_any = false;
        for name in PYTHON_NAMES {
            let candidate = bin_dir.join(name);
            if candidate.exists() {
                found_any = true;
                if let Some(env) = try_candidate(&candidate, source, &mut trace) {
                    return Ok(env);
                }
            }
        }
        if !found_any {
            trace.add(ResolutionStep::not_found(source.label()));
        }
    }

    // $PATH
    let mut found_any = false;
    for name in PYTHON_NAMES {
        if let Ok(path) = which::which(name) {
            found_any = true;
            if let Some(env) = try_candidate(&path, ResolutionSource::Path, &mut trace) {
                return Ok(env);
            }
        }
    }
    if !found_any {
        trace.add(ResolutionStep::not_found("$PATH (python3/python)"));
    }

    Err(PythonEnvError::PythonNotFound { trace })
}

/// Validate one discovered candidate, recording a trace step on rejection.
fn try_candidate(
    path: &Path,
    source: ResolutionSource,
    trace: &mut ResolutionTrace,
) -> Option<PythonEnv> {
    let label = source.label();
    // Venv interpreters are symlinks; resolving them would escape the venv
    if !path.exists() {
        trace.add(ResolutionStep::rejected(
            label,
            path,
            None,
            "path does not exist".to_string(),
        ));
        return None;
    }
    if !is_executable(path) {
        trace.add(ResolutionStep::rejected(
            label,
            path,
            None,
            "not executable".to_string(),
        ));
        return None;
    }
    match validate(path.to_path_buf(), source) {
        Ok(env) => Some(env),
        Err(PythonEnvError::VersionTooOld { found, .. }) => {
            let reason = format!("version {} is too old (need 3.9+)", found);
            trace.add(ResolutionStep::rejected(label, path, Some(found), reason));
            None
        }
        Err(e) => {
            trace.add(ResolutionStep::rejected(label, path, None, e.to_string()));
            None
        }
    }
}

fn validate(path: PathBuf, source: ResolutionSource) -> PythonEnvResult<PythonEnv> {
    let version = get_python_version(&path)?;
    if !version.meets_minimum() {
        return Err(PythonEnvError::VersionTooOld {
            found: version.to_string(),
            minimum: PythonVersion::minimum().to_string(),
        });
    }
    debug!(
        interpreter = %path.display(),
        %version,
        source = source.label(),
        "resolved Python interpreter"
    );
    Ok(PythonEnv {
        interpreter: path,
        version,
        source,
    })
}

/// Get Python version by running `python --version`.
pub fn get_python_version(python_path: &Path) -> PythonEnvResult<PythonVersion> {
    let output = Command::new(python_path)
        .arg("--version")
        .output()
        .map_err(|e| PythonEnvError::ExecutionFailed {
            path: python_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(PythonEnvError::ExecutionFailed {
            path: python_path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    // Older interpreters print the version to stderr
    let version_output = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr)
    } else {
        String::from_utf8_lossy(&output.stdout)
    };

    PythonVersion::parse(version_output.trim())
}

/// Whether `import <module>` succeeds under the interpreter.
pub fn check_module(python_path: &Path, module: &str) -> bool {
    tugtest_core::process::exits_cleanly(python_path, &["-c", &format!("import {}", module)])
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

// ============================================================================
// Tests
// ============================================================================
