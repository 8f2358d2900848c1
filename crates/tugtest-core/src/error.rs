//! Error types and error code constants for tugtest.
//!
//! This module provides a unified error type (`TugTestError`) that bridges
//! domain-specific errors from different subsystems (parsing, the oracle
//! worker, emission, the suite runner) into a common format suitable for
//! JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Resolution errors (input path or interpreter not found)
//! - `4`: Emission errors (failed to write generated tests)
//! - `5`: Suite failed (runner could not be launched)
//! - `10`: Internal errors (bugs, worker protocol failures)
//!
//! Per-file and per-function failures never reach this type; they are
//! recorded in the run report. Only run-fatal conditions are converted here.

use std::fmt;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input path, wrong extension).
    InvalidArguments = 2,
    /// Resolution errors (path missing, no Python interpreter).
    ResolutionError = 3,
    /// Emission errors (output directory not writable).
    EmissionError = 4,
    /// The optional suite run could not be launched.
    SuiteFailed = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum TugTestError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Input path does not exist.
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    /// No usable Python interpreter.
    #[error("python environment error: {message}")]
    PythonUnavailable { message: String },

    /// Generated tests could not be written.
    #[error("emission error: {message}")]
    EmissionError {
        message: String,
        file: Option<String>,
    },

    /// The suite runner could not be launched.
    #[error("suite runner failed: {message}")]
    SuiteFailed { message: String },

    /// Oracle worker error.
    #[error("worker error: {message}")]
    WorkerError { message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&TugTestError> for OutputErrorCode {
    fn from(err: &TugTestError) -> Self {
        match err {
            TugTestError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            TugTestError::PathNotFound { .. } => OutputErrorCode::ResolutionError,
            TugTestError::PythonUnavailable { .. } => OutputErrorCode::ResolutionError,
            TugTestError::EmissionError { .. } => OutputErrorCode::EmissionError,
            TugTestError::SuiteFailed { .. } => OutputErrorCode::SuiteFailed,
            TugTestError::WorkerError { .. } => OutputErrorCode::InternalError,
            TugTestError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<TugTestError> for OutputErrorCode {
    fn from(err: TugTestError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl TugTestError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        TugTestError::InvalidArguments {
            message: message.into(),
            details: None,
        }
    }

    /// Create an invalid arguments error with JSON details.
    pub fn invalid_args_with_details(
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        TugTestError::InvalidArguments {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Create a path not found error.
    pub fn path_not_found(path: impl Into<String>) -> Self {
        TugTestError::PathNotFound { path: path.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        TugTestError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn path_not_found_maps_to_resolution_error() {
            let err = TugTestError::path_not_found("src/missing");
            assert_eq!(
                OutputErrorCode::from(&err),
                OutputErrorCode::ResolutionError
            );
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn invalid_arguments_maps_to_invalid_arguments() {
            let err = TugTestError::invalid_args("not a python file");
            assert_eq!(
                OutputErrorCode::from(&err),
                OutputErrorCode::InvalidArguments
            );
            assert_eq!(err.error_code().code(), 2);
        }

        #[test]
        fn python_unavailable_maps_to_resolution_error() {
            let err = TugTestError::PythonUnavailable {
                message: "no interpreter".to_string(),
            };
            assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
        }

        #[test]
        fn emission_error_maps_to_emission_error() {
            let err = TugTestError::EmissionError {
                message: "permission denied".to_string(),
                file: Some("out/test_a.py".to_string()),
            };
            assert_eq!(err.error_code().code(), 4);
        }

        #[test]
        fn suite_failed_maps_to_suite_failed() {
            let err = TugTestError::SuiteFailed {
                message: "python exited".to_string(),
            };
            assert_eq!(err.error_code().code(), 5);
        }

        #[test]
        fn internal_and_worker_errors_map_to_internal_error() {
            let err = TugTestError::internal("unexpected state");
            assert_eq!(err.error_code().code(), 10);
            let err = TugTestError::WorkerError {
                message: "crashed".to_string(),
            };
            assert_eq!(err.error_code().code(), 10);
        }
    }

    mod display {
        use super::*;

        #[test]
        fn messages_include_context() {
            let err = TugTestError::path_not_found("src/lib");
            assert_eq!(err.to_string(), "path not found: src/lib");

            let err = TugTestError::invalid_args("expected a .py file");
            assert_eq!(err.to_string(), "invalid arguments: expected a .py file");
        }

        #[test]
        fn error_code_display_is_numeric() {
            assert_eq!(OutputErrorCode::SuiteFailed.to_string(), "5");
        }
    }
}
