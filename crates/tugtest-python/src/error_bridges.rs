//! Error bridge implementations for Python-side errors.
//!
//! `impl From<X> for TugTestError` conversions for the run-fatal error
//! types of this crate. Per-file errors (`ParseError`, `EmitError` for a
//! single module) are normally recorded in the run report instead; the
//! bridges exist for the cases where they abort the whole run.

use tugtest_core::error::TugTestError;

use crate::emit::EmitError;
use crate::env::PythonEnvError;
use crate::files::FileError;
use crate::parser::ParseError;
use crate::worker::WorkerError;

// ============================================================================
// Bridge: PythonEnvError -> TugTestError
// ============================================================================

impl From<PythonEnvError> for TugTestError {
    fn from(err: PythonEnvError) -> Self {
        TugTestError::PythonUnavailable {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Bridge: WorkerError -> TugTestError
// ============================================================================

impl From<WorkerError> for TugTestError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::PythonNotFound { path } => TugTestError::PythonUnavailable {
                message: format!("Python interpreter not found at {}", path.display()),
            },
            other => TugTestError::WorkerError {
                message: other.to_string(),
            },
        }
    }
}

// ============================================================================
// Bridge: FileError -> TugTestError
// ============================================================================

impl From<FileError> for TugTestError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound { path } => TugTestError::PathNotFound { path },
            FileError::NotADirectory { path } => {
                TugTestError::invalid_args(format!("not a directory: {}", path))
            }
            FileError::Io(e) => TugTestError::internal(format!("reading source folder: {}", e)),
        }
    }
}

// ============================================================================
// Bridge: EmitError -> TugTestError
// ============================================================================

impl From<EmitError> for TugTestError {
    fn from(err: EmitError) -> Self {
        TugTestError::EmissionError {
            file: Some(err.path().display().to_string()),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Bridge: ParseError -> TugTestError
// ============================================================================

impl From<ParseError> for TugTestError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::ParserFailure { .. } => TugTestError::internal(err.to_string()),
            other => TugTestError::invalid_args(other.to_string()),
        }
    }
}
