//! Test helpers for Python-dependent tests.
//!
//! These helpers make tests fail loudly in CI when no interpreter is
//! available, but skip gracefully in local development environments.

use std::path::PathBuf;

use crate::env::resolve_python;

/// Check if we're in a CI environment.
pub fn is_ci() -> bool {
    std::env::var("CI").is_ok() || std::env::var("GITHUB_ACTIONS").is_ok()
}

/// Find a usable Python interpreter or handle its absence.
///
/// - **In CI:** panics with an actionable error.
/// - **Locally:** returns `None` so the test can skip.
///
/// ```ignore
/// #[test]
/// fn my_python_test() {
///     let Some(python) = require_python() else {
///         return;
///     };
///     // ...
/// }
/// ```
pub fn require_python() -> Option<PathBuf> {
    match resolve_python(None) {
        Ok(env) => Some(env.interpreter().to_path_buf()),
        Err(e) => {
            if is_ci() {
                panic!(
                    "CI environment requires Python 3.9+ but resolution failed.\n\n\
                     Error: {}\n\n\
                     Add to your CI workflow:\n  \
                       export TUGTEST_PYTHON=${{pythonLocation}}/bin/python",
                    e
                );
            }
            eprintln!("Skipping test: Python resolution failed: {}", e);
            None
        }
    }
}

/// Like [`require_python`], but also requires `coverage` to be importable.
///
/// Missing `coverage` always skips; it is an optional collaborator.
pub fn require_python_with_coverage() -> Option<PathBuf> {
    let python = require_python()?;
    if crate::env::check_module(&python, "coverage") {
        Some(python)
    } else {
        eprintln!("Skipping test: coverage not installed for {}", python.display());
        None
    }
}
