//! JSON output types and serialization for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Status first:** Every response has `status` as first field
//! 2. **Deterministic:** Files and functions appear in processing order
//! 3. **Nullable vs absent:** Absent field means "not applicable"
//! 4. **Versioned:** Schema version in response enables forward compatibility

use std::fmt::Write as _;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{OutputErrorCode, TugTestError};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Run Report
// ============================================================================

/// Result of one generation run over a folder or a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Status: "ok" (the run completed; see `success` for per-file outcome).
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Source path as given by the caller.
    pub source: String,
    /// Directory the test modules were written into.
    pub output_dir: String,
    /// ISO 8601 timestamp of the run.
    pub generated_at: String,
    /// True when every eligible file was parsed and written.
    pub success: bool,
    /// Per-file results in processing order.
    pub files: Vec<FileReport>,
    /// Counts across all files.
    pub summary: RunSummary,
    /// Suite execution result, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<SuiteReport>,
}

impl RunReport {
    /// Create an empty report for a run.
    pub fn new(source: impl Into<String>, output_dir: impl Into<String>) -> Self {
        RunReport {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            source: source.into(),
            output_dir: output_dir.into(),
            generated_at: format_timestamp(),
            success: true,
            files: Vec::new(),
            summary: RunSummary::default(),
            suite: None,
        }
    }

    /// Record a file result, updating the summary and the success flag.
    pub fn push_file(&mut self, file: FileReport) {
        match file.outcome {
            FileOutcome::Written => {
                self.summary.files_written += 1;
                self.summary.tests_generated += file.functions.len();
            }
            FileOutcome::ParseFailed | FileOutcome::EmitFailed => {
                self.summary.files_failed += 1;
                self.success = false;
            }
        }
        self.summary.functions_skipped += file.skipped.len();
        self.files.push(file);
    }

    /// Render a human-readable summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            match file.outcome {
                FileOutcome::Written => {
                    let _ = writeln!(
                        out,
                        "{} -> {}",
                        file.source,
                        file.test_file.as_deref().unwrap_or("?")
                    );
                }
                FileOutcome::ParseFailed | FileOutcome::EmitFailed => {
                    let _ = writeln!(
                        out,
                        "{}: {}",
                        file.source,
                        file.error.as_deref().unwrap_or("failed")
                    );
                }
            }
            for func in &file.functions {
                let _ = writeln!(
                    out,
                    "  Cyclomatic complexity for function '{}': {}",
                    func.name, func.complexity
                );
                let _ = writeln!(out, "    {}({}) {}", func.name, func.arguments.join(", "), func.outcome);
            }
            for skipped in &file.skipped {
                let _ = writeln!(out, "  skipped '{}': {}", skipped.name, skipped.reason);
            }
        }
        let _ = writeln!(
            out,
            "{} file(s) written, {} failed, {} test(s) generated, {} function(s) skipped",
            self.summary.files_written,
            self.summary.files_failed,
            self.summary.tests_generated,
            self.summary.functions_skipped
        );
        if let Some(suite) = &self.suite {
            let _ = writeln!(
                out,
                "suite: {}",
                if suite.tests_passed { "passed" } else { "failed" }
            );
            match &suite.coverage {
                CoverageStatus::Collected { report } => {
                    out.push_str(report);
                    if !report.ends_with('\n') {
                        out.push('\n');
                    }
                }
                CoverageStatus::Unavailable { reason } => {
                    let _ = writeln!(out, "coverage unavailable: {}", reason);
                }
                CoverageStatus::Failed { reason } => {
                    let _ = writeln!(out, "coverage failed: {}", reason);
                }
            }
        }
        out
    }
}

/// Counts across all files in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files_written: usize,
    pub files_failed: usize,
    pub tests_generated: usize,
    pub functions_skipped: usize,
}

/// Outcome of one source file's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// Test module written.
    Written,
    /// Source could not be parsed; nothing written.
    ParseFailed,
    /// Test module could not be written.
    EmitFailed,
}

/// Result for a single source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    /// Source file path.
    pub source: String,
    /// Generated test module path (when written).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_file: Option<String>,
    pub outcome: FileOutcome,
    /// Functions that received a test case, in declaration order.
    pub functions: Vec<FunctionReport>,
    /// Functions excluded from synthesis.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFunction>,
    /// Failure message (for `parse_failed` / `emit_failed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    /// Create a report for a file that failed before anything was written.
    pub fn failed(source: impl Into<String>, outcome: FileOutcome, error: impl Into<String>) -> Self {
        FileReport {
            source: source.into(),
            test_file: None,
            outcome,
            functions: Vec::new(),
            skipped: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// One function that received a test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionReport {
    pub name: String,
    /// 1-based line of the definition.
    pub line: u32,
    /// Linear-chain cyclomatic complexity.
    pub complexity: i64,
    /// Synthesized argument literals, in parameter order.
    pub arguments: Vec<String>,
    pub outcome: OracleOutcome,
}

/// Captured oracle behavior as shown in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OracleOutcome {
    /// Function returned; `value` is the embedded literal.
    Returned { value: String },
    /// Function raised `exception`.
    Raised { exception: String },
}

impl std::fmt::Display for OracleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleOutcome::Returned { value } => write!(f, "== {}", value),
            OracleOutcome::Raised { exception } => write!(f, "raises {}", exception),
        }
    }
}

/// A function excluded from synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFunction {
    pub name: String,
    pub line: u32,
    pub reason: String,
}

// ============================================================================
// Suite Report
// ============================================================================

/// Result of running the emitted suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Whether the test runner exited successfully.
    pub tests_passed: bool,
    /// Runner exit code (absent when killed by timeout or signal).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Combined runner output.
    pub output: String,
    /// Runner wall time in seconds.
    pub duration_secs: f64,
    pub coverage: CoverageStatus,
}

/// Coverage collection outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CoverageStatus {
    /// Coverage collected; `report` is the collector's text report.
    Collected { report: String },
    /// Collector not installed; suite ran without coverage.
    Unavailable { reason: String },
    /// Collector was present but reporting failed.
    Failed { reason: String },
}

// ============================================================================
// Error Response
// ============================================================================

/// Error information carried in an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    /// Error-specific structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// Create from a TugTestError.
    pub fn from_error(err: &TugTestError) -> Self {
        let code = OutputErrorCode::from(err).code();
        let message = err.to_string();

        let details = match err {
            TugTestError::InvalidArguments { details, .. } => details.clone(),
            TugTestError::PathNotFound { path } => Some(serde_json::json!({ "path": path })),
            TugTestError::EmissionError { file, .. } => {
                file.as_ref().map(|f| serde_json::json!({ "file": f }))
            }
            _ => None,
        };

        ErrorInfo {
            code,
            message,
            details,
        }
    }
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create an error response from a TugTestError.
    pub fn from_error(err: &TugTestError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

/// Emit a response as compact JSON (single line) to a writer.
pub fn emit_response_compact<T: Serialize>(
    response: &T,
    writer: &mut impl Write,
) -> io::Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

/// Format current timestamp for JSON (ISO 8601).
fn format_timestamp() -> String {
    use chrono::{DateTime, Utc};
    use std::time::SystemTime;

    let datetime: DateTime<Utc> = SystemTime::now().into();
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Tests
// ============================================================================
