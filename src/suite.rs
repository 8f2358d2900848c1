//! Running the emitted suite under unittest, with coverage when available.
//!
//! Both collaborators are black boxes: their exit status and raw output go
//! into the [`SuiteReport`] unparsed. [`run_suite`] returns an error when a
//! runner cannot be launched at all; [`run_suite_reported`] folds that error
//! into a failed report so the generation results survive it.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use tugtest_core::error::TugTestError;
use tugtest_core::output::{CoverageStatus, SuiteReport};
use tugtest_core::process::{run_command, CommandOutcome, CommandSpec};

/// Coverage data file name inside the test directory.
pub const COVERAGE_DATA_FILE: &str = ".coverage";

// ============================================================================
// Error Types
// ============================================================================

/// The suite runner could not be started.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl From<SuiteError> for TugTestError {
    fn from(err: SuiteError) -> Self {
        TugTestError::SuiteFailed {
            message: err.to_string(),
        }
    }
}

pub type SuiteResult<T> = Result<T, SuiteError>;

// ============================================================================
// Suite Runner
// ============================================================================

/// How to run the emitted suite.
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    pub python: PathBuf,
    /// Directory holding the generated `test_*.py` modules.
    pub test_dir: PathBuf,
    pub timeout: Duration,
    /// Whether `coverage` is importable by `python`.
    pub coverage_available: bool,
}

/// Discover and run the suite, then collect a coverage report.
pub fn run_suite(options: &SuiteOptions) -> SuiteResult<SuiteReport> {
    let test_dir = options.test_dir.to_string_lossy().into_owned();
    let mut args = vec![options.python.to_string_lossy().into_owned(), "-m".to_string()];
    if options.coverage_available {
        args.extend(["coverage".to_string(), "run".to_string(), "-m".to_string()]);
    }
    args.extend([
        "unittest".to_string(),
        "discover".to_string(),
        "-s".to_string(),
        test_dir,
        "-p".to_string(),
        "test_*.py".to_string(),
    ]);

    info!(test_dir = %options.test_dir.display(), coverage = options.coverage_available, "running generated suite");
    let run = launch(&spec(options, args))?;
    if run.timed_out {
        warn!(timeout_secs = options.timeout.as_secs(), "generated suite timed out");
    }

    let coverage = if !options.coverage_available {
        CoverageStatus::Unavailable {
            reason: format!(
                "coverage is not installed for {}",
                options.python.display()
            ),
        }
    } else {
        coverage_report(options)
    };

    Ok(SuiteReport {
        tests_passed: run.success,
        exit_code: run.exit_code,
        output: run.combined_output(),
        duration_secs: run.duration.as_secs_f64(),
        coverage,
    })
}

/// Run the suite; a launch failure becomes a report with `tests_passed` false.
pub fn run_suite_reported(options: &SuiteOptions) -> SuiteReport {
    run_suite(options).unwrap_or_else(|e| {
        warn!(error = %e, "generated suite could not be run");
        launch_failure(&e)
    })
}

fn launch_failure(err: &SuiteError) -> SuiteReport {
    SuiteReport {
        tests_passed: false,
        exit_code: None,
        output: err.to_string(),
        duration_secs: 0.0,
        coverage: CoverageStatus::Failed {
            reason: "suite was not run".to_string(),
        },
    }
}

fn coverage_report(options: &SuiteOptions) -> CoverageStatus {
    let args = vec![
        options.python.to_string_lossy().into_owned(),
        "-m".to_string(),
        "coverage".to_string(),
        "report".to_string(),
    ];
    let outcome = match launch(&spec(options, args)) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "coverage report could not be launched");
            return CoverageStatus::Failed {
                reason: e.to_string(),
            };
        }
    };
    if outcome.success {
        CoverageStatus::Collected {
            report: outcome.stdout,
        }
    } else {
        let reason = outcome.combined_output().trim().to_string();
        warn!(%reason, "coverage report failed");
        CoverageStatus::Failed { reason }
    }
}

fn spec(options: &SuiteOptions, args: Vec<String>) -> CommandSpec {
    CommandSpec::new(args, &options.test_dir)
        .with_timeout(options.timeout)
        .with_env("COVERAGE_FILE", data_file(&options.test_dir).to_string_lossy())
        .with_env("PYTHONDONTWRITEBYTECODE", "1")
}

fn launch(spec: &CommandSpec) -> SuiteResult<CommandOutcome> {
    run_command(spec).map_err(|source| SuiteError::Launch {
        program: spec.args.first().cloned().unwrap_or_default(),
        source,
    })
}

/// Coverage data file for a test directory.
pub fn data_file(test_dir: &Path) -> PathBuf {
    test_dir.join(COVERAGE_DATA_FILE)
}

// ============================================================================
// Tests
// ============================================================================
