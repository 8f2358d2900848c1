//! Oracle execution: run the real function and capture what it did.
//!
//! Every invocation ends in exactly one [`OracleResult`]. Infrastructure
//! trouble (worker crash, protocol error) is logged and folded into
//! `Failure("Exception")` so the pipeline never stalls on a single function.

use std::path::Path;

use tracing::warn;
use tugtest_core::output::OracleOutcome;

use crate::parser::FunctionSignature;
use crate::synth::ArgumentBinding;
use crate::values::{coerce_literal, ArgValue, PyValue};
use crate::worker::{CompileRequest, InvokeRequest, InvokeResponse, WorkerHandle};

/// Exception kind recorded when the worker itself fails.
pub const INFRASTRUCTURE_FAILURE: &str = "Exception";

// ============================================================================
// Resolution Context
// ============================================================================

/// Ordered, duplicate-free module search paths for one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionContext {
    paths: Vec<String>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        ResolutionContext::default()
    }

    /// Context that makes modules in `folder` importable.
    pub fn for_folder(folder: &Path) -> Self {
        let mut ctx = ResolutionContext::new();
        ctx.push(folder.to_string_lossy());
        ctx
    }

    /// Append a path; already-present paths are ignored.
    pub fn push(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

// ============================================================================
// Calls and Results
// ============================================================================

/// Everything needed to execute one function once.
#[derive(Debug, Clone, Copy)]
pub struct OracleCall<'a> {
    pub signature: &'a FunctionSignature,
    pub module_path: &'a Path,
    pub module_name: &'a str,
    pub binding: &'a ArgumentBinding,
    pub context: &'a ResolutionContext,
}

/// Observed behavior of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleResult {
    /// The function returned this value.
    Success(PyValue),
    /// The function raised; the payload is the exception's class name.
    Failure(String),
}

impl OracleResult {
    /// Report form of the result.
    pub fn to_outcome(&self) -> OracleOutcome {
        match self {
            OracleResult::Success(value) => OracleOutcome::Returned {
                value: value
                    .to_literal()
                    .unwrap_or_else(|| format!("<{} instance>", value.type_name())),
            },
            OracleResult::Failure(kind) => OracleOutcome::Raised {
                exception: kind.clone(),
            },
        }
    }
}

/// Executes functions to observe their behavior.
pub trait Oracle {
    fn invoke(&mut self, call: &OracleCall<'_>) -> OracleResult;

    /// Reject module source the target interpreter would not compile.
    ///
    /// `Err` carries the compiler's message.
    fn check_source(&mut self, _path: &Path, _text: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Convert a binding's literals to worker argument values.
pub fn argument_values(binding: &ArgumentBinding) -> Vec<ArgValue> {
    binding.iter().map(|arg| coerce_literal(&arg.literal)).collect()
}

// ============================================================================
// Worker-backed Oracle
// ============================================================================

/// Oracle that executes functions in the Python worker process.
#[derive(Debug)]
pub struct WorkerOracle {
    worker: WorkerHandle,
}

impl WorkerOracle {
    pub fn new(worker: WorkerHandle) -> Self {
        WorkerOracle { worker }
    }

    /// Stop the worker process.
    pub fn shutdown(mut self) {
        if let Err(e) = self.worker.shutdown() {
            warn!(error = %e, "oracle worker shutdown failed");
        }
    }
}

impl Oracle for WorkerOracle {
    fn invoke(&mut self, call: &OracleCall<'_>) -> OracleResult {
        let args = argument_values(call.binding);
        let module_path = call.module_path.to_string_lossy();
        let request = InvokeRequest {
            module_name: call.module_name,
            module_path: &module_path,
            function_name: &call.signature.name,
            function_source: &call.signature.source,
            args: &args,
            search_paths: call.context.paths(),
        };
        match self.worker.invoke(&request) {
            Ok(InvokeResponse::Success { value }) => OracleResult::Success(value),
            Ok(InvokeResponse::Failure { exception }) => OracleResult::Failure(exception),
            Err(e) => {
                warn!(
                    function = %call.signature.name,
                    error = %e,
                    "oracle worker failed; recording generic exception"
                );
                OracleResult::Failure(INFRASTRUCTURE_FAILURE.to_string())
            }
        }
    }

    fn check_source(&mut self, path: &Path, text: &str) -> Result<(), String> {
        let path = path.to_string_lossy();
        let request = CompileRequest {
            path: &path,
            source: text,
        };
        match self.worker.compile(&request) {
            Ok(response) if response.valid => Ok(()),
            Ok(response) => {
                let detail = response
                    .detail
                    .unwrap_or_else(|| "SyntaxError".to_string());
                Err(match response.line {
                    Some(line) => format!("{} at {}:{}", detail, path, line),
                    None => format!("{} in {}", detail, path),
                })
            }
            Err(e) => {
                // Invocation still reports per-function failures
                warn!(file = %path, error = %e, "compile check unavailable; accepting source");
                Ok(())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{ArgumentSynthesizer, IntSource};
    use crate::test_helpers::require_python;
    use crate::worker::spawn_worker;

    #[test]
    fn context_is_ordered_and_duplicate_free() {
        let mut ctx = ResolutionContext::new();
        ctx.push("/src");
        ctx.push("/lib");
        ctx.push("/src");
        assert_eq!(ctx.paths(), &["/src".to_string(), "/lib".to_string()]);
    }

    #[test]
    fn folder_context_has_one_entry() {
        let ctx = ResolutionContext::for_folder(Path::new("/work/pkg"));
        assert_eq!(ctx.paths(), &["/work/pkg".to_string()]);
    }

    #[test]
    fn binding_literals_are_coerced() {
        let binding = ArgumentSynthesizer::new(IntSource::Fixed(3))
            .synthesize(&["a".to_string(), "name".to_string()]);
        assert_eq!(
            argument_values(&binding),
            vec![
                ArgValue::Int {
                    text: "3".to_string()
                },
                ArgValue::Str {
                    value: "name_example".to_string()
                }
            ]
        );
    }

    #[test]
    fn outcomes_for_reports() {
        let ok = OracleResult::Success(PyValue::Str {
            value: "olleh".to_string(),
        });
        assert_eq!(
            ok.to_outcome(),
            OracleOutcome::Returned {
                value: "\"olleh\"".to_string()
            }
        );

        let opaque = OracleResult::Success(PyValue::Opaque {
            type_name: "Widget".to_string(),
        });
        assert_eq!(
            opaque.to_outcome(),
            OracleOutcome::Returned {
                value: "<Widget instance>".to_string()
            }
        );

        let raised = OracleResult::Failure("ValueError".to_string());
        assert_eq!(raised.to_outcome().to_string(), "raises ValueError");
    }

    #[test]
    fn worker_oracle_sees_module_globals() {
        let Some(python) = require_python() else {
            return;
        };
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("greet.py");
        std::fs::write(
            &path,
            "PREFIX = 'hi '\n\ndef helper(x):\n    return PREFIX + x\n\ndef greet(name):\n    return helper(name)\n",
        )
        .unwrap();

        let sig = FunctionSignature {
            name: "greet".to_string(),
            params: vec!["name".to_string()],
            line: 6,
            source: "def greet(name):\n    return helper(name)\n".to_string(),
            body: Vec::new(),
        };
        let binding =
            ArgumentSynthesizer::new(IntSource::Fixed(1)).synthesize(&sig.params);
        let ctx = ResolutionContext::for_folder(dir.path());
        let mut oracle = WorkerOracle::new(spawn_worker(&python).unwrap());

        let result = oracle.invoke(&OracleCall {
            signature: &sig,
            module_path: &path,
            module_name: "greet",
            binding: &binding,
            context: &ctx,
        });
        assert_eq!(
            result,
            OracleResult::Success(PyValue::Str {
                value: "hi name_example".to_string()
            })
        );
        oracle.shutdown();
    }

    #[test]
    fn check_source_uses_the_interpreter_compiler() {
        let Some(python) = require_python() else {
            return;
        };
        let mut oracle = WorkerOracle::new(spawn_worker(&python).unwrap());
        let path = Path::new("/work/pkg/legacy.py");

        assert_eq!(oracle.check_source(path, "def echo(s):\n    return s\n"), Ok(()));
        let err = oracle
            .check_source(path, "exec \"x = 1\"\n\ndef echo(s):\n    return s\n")
            .unwrap_err();
        assert!(err.starts_with("SyntaxError"), "{}", err);
        assert!(err.ends_with("legacy.py:1"), "{}", err);
        oracle.shutdown();
    }

    #[test]
    fn system_exit_is_a_failure() {
        let Some(python) = require_python() else {
            return;
        };
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("quit.py");
        let source = "import sys\n\ndef leave(s):\n    sys.exit(s)\n";
        std::fs::write(&path, source).unwrap();

        let sig = FunctionSignature {
            name: "leave".to_string(),
            params: vec!["s".to_string()],
            line: 3,
            source: "def leave(s):\n    sys.exit(s)\n".to_string(),
            body: Vec::new(),
        };
        let binding = ArgumentSynthesizer::new(IntSource::Fixed(1)).synthesize(&sig.params);
        let ctx = ResolutionContext::for_folder(dir.path());
        let mut oracle = WorkerOracle::new(spawn_worker(&python).unwrap());

        let result = oracle.invoke(&OracleCall {
            signature: &sig,
            module_path: &path,
            module_name: "quit",
            binding: &binding,
            context: &ctx,
        });
        assert_eq!(result, OracleResult::Failure("SystemExit".to_string()));
    }
}
