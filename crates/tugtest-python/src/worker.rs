//! Oracle worker manager: spawns and talks to the Python subprocess.
//!
//! - Spawn worker subprocess with JSON-lines protocol
//! - Wait for ready message with timeout
//! - Send requests and receive responses
//! - Respawn after a crash
//!
//! Protocol: JSON-lines over stdin/stdout
//! - Request: `{"id": <int>, "op": "<operation>", ...params...}`
//! - Response: `{"id": <int>, "status": "ok"|"error", ...result...}`
//!
//! Invocations have no timeout: a function that never returns blocks the
//! run. The worker script lives in a private temp directory for the lifetime
//! of the handle.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use crate::values::{ArgValue, PyValue};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for worker to send ready message.
const READY_TIMEOUT_SECS: u64 = 10;

/// Embedded worker script.
const WORKER_SCRIPT: &str = include_str!("oracle_worker.py");

const WORKER_SCRIPT_NAME: &str = "tugtest_oracle_worker.py";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during worker operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker: {reason}")]
    SpawnFailed { reason: String },

    #[error("worker did not become ready within {timeout_secs}s")]
    ReadyTimeout { timeout_secs: u64 },

    /// Worker process crashed (broken pipe or EOF).
    #[error("worker process crashed: {reason}")]
    WorkerCrashed { reason: String },

    /// Worker returned an error response.
    #[error("worker error: {code} - {message}")]
    WorkerResponseError { code: String, message: String },

    #[error("invalid worker response: {reason}")]
    InvalidResponse { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Python interpreter not found at {path}")]
    PythonNotFound { path: PathBuf },
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

// ============================================================================
// Protocol Types
// ============================================================================

/// Worker ready message (sent on startup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyMessage {
    pub status: String,
    pub version: String,
    pub python_version: String,
}

/// Generic worker response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// Request ID (echoed back).
    pub id: Option<u64>,
    /// Status: "ok" or "error".
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operation-specific payload.
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Parameters of an `invoke` request.
#[derive(Debug, Clone, Serialize)]
pub struct InvokeRequest<'a> {
    pub module_name: &'a str,
    pub module_path: &'a str,
    pub function_name: &'a str,
    pub function_source: &'a str,
    pub args: &'a [ArgValue],
    pub search_paths: &'a [String],
}

/// Payload of a successful `invoke` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvokeResponse {
    Success { value: PyValue },
    Failure { exception: String },
}

/// Parameters of a `compile` request.
#[derive(Debug, Clone, Serialize)]
pub struct CompileRequest<'a> {
    pub path: &'a str,
    pub source: &'a str,
}

/// Whether CPython accepts a module's source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResponse {
    pub valid: bool,
    /// Compiler message when rejected.
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

// ============================================================================
// Worker Handle
// ============================================================================

/// Handle to a running oracle worker process.
pub struct WorkerHandle {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_reader: Option<BufReader<ChildStdout>>,
    /// Next request ID (monotonically increasing).
    next_request_id: u64,
    python_path: PathBuf,
    /// Holds the materialized worker script.
    script_dir: TempDir,
    /// Worker version (from ready message).
    worker_version: Option<String>,
    python_version: Option<String>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("python_path", &self.python_path)
            .field("running", &self.is_running())
            .field("worker_version", &self.worker_version)
            .finish()
    }
}

impl WorkerHandle {
    /// Check if the worker is running.
    pub fn is_running(&self) -> bool {
        self.child.is_some() && self.stdin.is_some() && self.stdout_reader.is_some()
    }

    pub fn worker_version(&self) -> Option<&str> {
        self.worker_version.as_deref()
    }

    /// Interpreter version reported by the worker.
    pub fn python_version(&self) -> Option<&str> {
        self.python_version.as_deref()
    }

    /// Send a request and wait for its response.
    ///
    /// A dead worker is respawned first. I/O failures mark the worker as
    /// crashed so the next request starts a fresh process.
    pub fn send_request(
        &mut self,
        op: &str,
        params: serde_json::Value,
    ) -> WorkerResult<WorkerResponse> {
        if !self.is_running() {
            self.respawn()?;
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let mut request = serde_json::json!({
            "id": request_id,
            "op": op,
        });
        if let (serde_json::Value::Object(params_map), serde_json::Value::Object(req_map)) =
            (params, &mut request)
        {
            for (k, v) in params_map {
                req_map.insert(k, v);
            }
        }

        let request_line = serde_json::to_string(&request)?;
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(WorkerError::WorkerCrashed {
                reason: "stdin closed".to_string(),
            });
        };
        if let Err(e) = writeln!(stdin, "{}", request_line).and_then(|_| stdin.flush()) {
            self.mark_crashed();
            return Err(WorkerError::WorkerCrashed {
                reason: e.to_string(),
            });
        }

        loop {
            let Some(reader) = self.stdout_reader.as_mut() else {
                return Err(WorkerError::WorkerCrashed {
                    reason: "stdout closed".to_string(),
                });
            };
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    self.mark_crashed();
                    return Err(WorkerError::WorkerCrashed {
                        reason: "unexpected EOF".to_string(),
                    });
                }
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let response: WorkerResponse = match serde_json::from_str(line) {
                        Ok(response) => response,
                        Err(e) => {
                            // The stream is no longer trustworthy
                            self.mark_crashed();
                            return Err(WorkerError::InvalidResponse {
                                reason: format!("JSON parse error: {}: {}", e, line),
                            });
                        }
                    };

                    if response.id != Some(request_id) {
                        debug!(expected = request_id, got = ?response.id, "skipping stale worker response");
                        continue;
                    }

                    if response.status == "error" {
                        return Err(WorkerError::WorkerResponseError {
                            code: response.error_code.unwrap_or_default(),
                            message: response.message.unwrap_or_default(),
                        });
                    }

                    return Ok(response);
                }
                Err(e) => {
                    self.mark_crashed();
                    return Err(WorkerError::WorkerCrashed {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    // ========================================================================
    // High-Level Operations
    // ========================================================================

    /// Load a module, define the function in its namespace, and call it.
    pub fn invoke(&mut self, request: &InvokeRequest<'_>) -> WorkerResult<InvokeResponse> {
        let response = self.send_request("invoke", serde_json::to_value(request)?)?;
        serde_json::from_value(response.data).map_err(|e| WorkerError::InvalidResponse {
            reason: format!("invoke payload: {}", e),
        })
    }

    /// Compile module source with the worker's interpreter without running it.
    pub fn compile(&mut self, request: &CompileRequest<'_>) -> WorkerResult<CompileResponse> {
        let response = self.send_request("compile", serde_json::to_value(request)?)?;
        serde_json::from_value(response.data).map_err(|e| WorkerError::InvalidResponse {
            reason: format!("compile payload: {}", e),
        })
    }

    /// Gracefully shutdown the worker.
    pub fn shutdown(&mut self) -> WorkerResult<()> {
        if !self.is_running() {
            return Ok(());
        }

        let _ = self.send_request("shutdown", serde_json::json!({}));

        if let Some(mut child) = self.child.take() {
            // Give it a moment to exit on its own
            std::thread::sleep(Duration::from_millis(50));
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    let _ = child.kill();
                    let _ = child.wait();
                }
            }
        }

        self.stdin = None;
        self.stdout_reader = None;
        debug!("oracle worker shut down");
        Ok(())
    }

    // ========================================================================
    // Internal Methods
    // ========================================================================

    /// Drop all handles; the next request respawns.
    fn mark_crashed(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.stdin = None;
        self.stdout_reader = None;
    }

    fn respawn(&mut self) -> WorkerResult<()> {
        self.mark_crashed();
        warn!("respawning oracle worker");
        let script = self.script_path();
        let python_path = self.python_path.clone();
        start_process(&python_path, &script, self)
    }

    fn script_path(&self) -> PathBuf {
        self.script_dir.path().join(WORKER_SCRIPT_NAME)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

// ============================================================================
// Spawn Function
// ============================================================================

/// Spawn an oracle worker process.
///
/// Materializes the worker script into a private temp directory, starts the
/// interpreter on it and waits for the ready message.
pub fn spawn_worker(python_path: &Path) -> WorkerResult<WorkerHandle> {
    if !python_path.exists() {
        return Err(WorkerError::PythonNotFound {
            path: python_path.to_path_buf(),
        });
    }

    let script_dir = materialize_worker_script()?;

    let mut handle = WorkerHandle {
        child: None,
        stdin: None,
        stdout_reader: None,
        next_request_id: 1,
        python_path: python_path.to_path_buf(),
        script_dir,
        worker_version: None,
        python_version: None,
    };

    let script = handle.script_path();
    start_process(python_path, &script, &mut handle)?;

    debug!(
        python = %python_path.display(),
        python_version = handle.python_version().unwrap_or("?"),
        "oracle worker ready"
    );
    Ok(handle)
}

/// Start the interpreter and wait for ready (initial spawn and respawn).
fn start_process(python_path: &Path, script: &Path, handle: &mut WorkerHandle) -> WorkerResult<()> {
    let mut child = Command::new(python_path)
        .arg(script)
        .env("PYTHONDONTWRITEBYTECODE", "1")
        .env("PYTHONIOENCODING", "utf-8")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        // Output of the code under test ends up here
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| WorkerError::SpawnFailed {
            reason: e.to_string(),
        })?;

    let stdin = child.stdin.take().ok_or_else(|| WorkerError::SpawnFailed {
        reason: "failed to capture stdin".to_string(),
    })?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| WorkerError::SpawnFailed {
            reason: "failed to capture stdout".to_string(),
        })?;

    handle.child = Some(child);
    handle.stdin = Some(stdin);
    handle.stdout_reader = Some(BufReader::new(stdout));

    if let Err(e) = wait_for_ready(handle) {
        handle.mark_crashed();
        return Err(e);
    }
    Ok(())
}

/// Wait for the worker to send its ready message.
fn wait_for_ready(handle: &mut WorkerHandle) -> WorkerResult<()> {
    let start = Instant::now();
    let reader = handle
        .stdout_reader
        .as_mut()
        .ok_or_else(|| WorkerError::SpawnFailed {
            reason: "stdout not captured".to_string(),
        })?;

    loop {
        if start.elapsed() >= Duration::from_secs(READY_TIMEOUT_SECS) {
            return Err(WorkerError::ReadyTimeout {
                timeout_secs: READY_TIMEOUT_SECS,
            });
        }

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                return Err(WorkerError::SpawnFailed {
                    reason: "worker exited before sending ready message".to_string(),
                });
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Ok(ready) = serde_json::from_str::<ReadyMessage>(line) {
                    if ready.status == "ready" {
                        handle.worker_version = Some(ready.version);
                        handle.python_version = Some(ready.python_version);
                        return Ok(());
                    }
                }
                if let Ok(error) = serde_json::from_str::<WorkerResponse>(line) {
                    if error.status == "error" {
                        return Err(WorkerError::SpawnFailed {
                            reason: error.message.unwrap_or_else(|| "unknown error".to_string()),
                        });
                    }
                }
            }
            Err(e) => {
                return Err(WorkerError::SpawnFailed {
                    reason: format!("error reading from worker: {}", e),
                });
            }
        }
    }
}

fn materialize_worker_script() -> WorkerResult<TempDir> {
    let dir = tempfile::Builder::new().prefix("tugtest-worker").tempdir()?;
    std::fs::write(dir.path().join(WORKER_SCRIPT_NAME), WORKER_SCRIPT)?;
    Ok(dir)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::require_python;
    use crate::values::coerce_literal;

    fn write_module(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn materialized_script_matches_embedded() {
        let dir = materialize_worker_script().unwrap();
        let content = std::fs::read_to_string(dir.path().join(WORKER_SCRIPT_NAME)).unwrap();
        assert_eq!(content, WORKER_SCRIPT);
        assert!(content.contains("def main():"));
    }

    #[test]
    fn invoke_response_wire_format() {
        let ok: InvokeResponse = serde_json::from_value(serde_json::json!({
            "outcome": "success",
            "value": {"type": "int", "repr": "9"}
        }))
        .unwrap();
        assert_eq!(
            ok,
            InvokeResponse::Success {
                value: PyValue::Int {
                    repr: "9".to_string()
                }
            }
        );

        let raised: InvokeResponse = serde_json::from_value(serde_json::json!({
            "outcome": "failure",
            "exception": "ZeroDivisionError"
        }))
        .unwrap();
        assert_eq!(
            raised,
            InvokeResponse::Failure {
                exception: "ZeroDivisionError".to_string()
            }
        );
    }

    #[test]
    fn missing_interpreter_is_reported() {
        let err = spawn_worker(Path::new("/no/such/python3")).unwrap_err();
        assert!(matches!(err, WorkerError::PythonNotFound { .. }));
    }

    #[test]
    fn spawn_and_ready() {
        let Some(python) = require_python() else {
            return;
        };
        let handle = spawn_worker(&python).unwrap();
        assert!(handle.is_running());
        assert_eq!(handle.worker_version(), Some("1"));
        assert!(handle.python_version().is_some());
    }

    #[test]
    fn invoke_returns_value_and_exception() {
        let Some(python) = require_python() else {
            return;
        };
        let dir = tempfile::TempDir::new().unwrap();
        let source = "SCALE = 10\n\ndef scaled(a):\n    print('noise')\n    return a * SCALE\n\ndef fail(s):\n    raise KeyError(s)\n";
        let module = write_module(dir.path(), "calc.py", source);
        let module_path = module.to_string_lossy();
        let paths = vec![dir.path().to_string_lossy().into_owned()];
        let mut handle = spawn_worker(&python).unwrap();

        let args = [coerce_literal("3")];
        let response = handle
            .invoke(&InvokeRequest {
                module_name: "calc",
                module_path: &module_path,
                function_name: "scaled",
                function_source: "def scaled(a):\n    print('noise')\n    return a * SCALE\n",
                args: &args,
                search_paths: &paths,
            })
            .unwrap();
        assert_eq!(
            response,
            InvokeResponse::Success {
                value: PyValue::Int {
                    repr: "30".to_string()
                }
            }
        );

        let args = [coerce_literal("\"k\"")];
        let response = handle
            .invoke(&InvokeRequest {
                module_name: "calc",
                module_path: &module_path,
                function_name: "fail",
                function_source: "def fail(s):\n    raise KeyError(s)\n",
                args: &args,
                search_paths: &paths,
            })
            .unwrap();
        assert_eq!(
            response,
            InvokeResponse::Failure {
                exception: "KeyError".to_string()
            }
        );
    }

    fn invoke_in(
        handle: &mut WorkerHandle,
        module_path: &str,
        source: &str,
        function_name: &str,
        args: &[ArgValue],
        search_paths: &[String],
    ) -> InvokeResponse {
        handle
            .invoke(&InvokeRequest {
                module_name: "paths",
                module_path,
                function_name,
                function_source: source,
                args,
                search_paths,
            })
            .unwrap()
    }

    fn path_list(response: InvokeResponse) -> Vec<String> {
        let items = match response {
            InvokeResponse::Success {
                value: PyValue::List { items },
            } => items,
            other => panic!("expected a list, got {:?}", other),
        };
        items
            .into_iter()
            .map(|item| match item {
                PyValue::Str { value } => value,
                other => panic!("expected str, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn search_paths_are_added_once_and_removed_after() {
        let Some(python) = require_python() else {
            return;
        };
        let dir = tempfile::TempDir::new().unwrap();
        let source = "import sys\n\ndef count(s):\n    return sys.path.count(s)\n\ndef snapshot():\n    return list(sys.path)\n";
        let module = write_module(dir.path(), "paths.py", source);
        let module_path = module.to_string_lossy();
        let folder = dir.path().to_string_lossy().into_owned();
        let mut handle = spawn_worker(&python).unwrap();

        let before = path_list(invoke_in(&mut handle, &module_path, source, "snapshot", &[], &[]));
        assert!(!before.contains(&folder));

        let doubled = vec![folder.clone(), folder.clone()];
        let args = [ArgValue::Str {
            value: folder.clone(),
        }];
        for _ in 0..2 {
            let response = invoke_in(&mut handle, &module_path, source, "count", &args, &doubled);
            assert_eq!(
                response,
                InvokeResponse::Success {
                    value: PyValue::Int {
                        repr: "1".to_string()
                    }
                }
            );
        }

        let after = path_list(invoke_in(&mut handle, &module_path, source, "snapshot", &[], &[]));
        assert_eq!(after, before);
    }

    #[test]
    fn search_paths_already_present_are_left_alone() {
        let Some(python) = require_python() else {
            return;
        };
        let dir = tempfile::TempDir::new().unwrap();
        let source = "import sys\n\ndef snapshot():\n    return list(sys.path)\n";
        let module = write_module(dir.path(), "paths.py", source);
        let module_path = module.to_string_lossy();
        let mut handle = spawn_worker(&python).unwrap();

        let before = path_list(invoke_in(&mut handle, &module_path, source, "snapshot", &[], &[]));
        let present = before[0].clone();
        let during = path_list(invoke_in(
            &mut handle,
            &module_path,
            source,
            "snapshot",
            &[],
            &[present.clone()],
        ));
        assert_eq!(during, before);
        let after = path_list(invoke_in(&mut handle, &module_path, source, "snapshot", &[], &[]));
        assert_eq!(after, before);
        assert_eq!(after.iter().filter(|p| **p == present).count(), 1);
    }

    #[test]
    fn search_paths_do_not_shadow_the_standard_library() {
        let Some(python) = require_python() else {
            return;
        };
        let dir = tempfile::TempDir::new().unwrap();
        write_module(dir.path(), "calendar.py", "MARK = 'local'\n");
        let source = "import calendar\n\ndef which():\n    return getattr(calendar, 'MARK', 'stdlib')\n";
        let module = write_module(dir.path(), "paths.py", source);
        let module_path = module.to_string_lossy();
        let paths = vec![dir.path().to_string_lossy().into_owned()];
        let mut handle = spawn_worker(&python).unwrap();

        let response = invoke_in(&mut handle, &module_path, source, "which", &[], &paths);
        assert_eq!(
            response,
            InvokeResponse::Success {
                value: PyValue::Str {
                    value: "stdlib".to_string()
                }
            }
        );
    }

    #[test]
    fn compile_rejects_what_cpython_rejects() {
        let Some(python) = require_python() else {
            return;
        };
        let mut handle = spawn_worker(&python).unwrap();

        for source in [
            "print \"legacy\"\n",
            "def f(a, a):\n    return a\n",
            "return 1\n",
        ] {
            let response = handle
                .compile(&CompileRequest {
                    path: "legacy.py",
                    source,
                })
                .unwrap();
            assert!(!response.valid, "{:?} accepted", source);
            assert!(response.detail.unwrap().starts_with("SyntaxError"));
            assert_eq!(response.line, Some(1));
        }

        let response = handle
            .compile(&CompileRequest {
                path: "ok.py",
                source: "def f(a):\n    return a\n",
            })
            .unwrap();
        assert!(response.valid);
        assert_eq!(response.detail, None);
    }

    #[test]
    fn respawns_after_crash() {
        let Some(python) = require_python() else {
            return;
        };
        let dir = tempfile::TempDir::new().unwrap();
        let module = write_module(dir.path(), "m.py", "def one():\n    return 1\n");
        let module_path = module.to_string_lossy();
        let mut handle = spawn_worker(&python).unwrap();

        if let Some(ref mut child) = handle.child {
            let _ = child.kill();
            let _ = child.wait();
        }

        let request = InvokeRequest {
            module_name: "m",
            module_path: &module_path,
            function_name: "one",
            function_source: "def one():\n    return 1\n",
            args: &[],
            search_paths: &[],
        };
        // The first call observes the dead process
        assert!(handle.invoke(&request).is_err());
        assert!(!handle.is_running());
        let response = handle.invoke(&request).unwrap();
        assert!(matches!(response, InvokeResponse::Success { .. }));
    }

    #[test]
    fn shutdown_stops_the_process() {
        let Some(python) = require_python() else {
            return;
        };
        let mut handle = spawn_worker(&python).unwrap();
        handle.shutdown().unwrap();
        assert!(!handle.is_running());
    }
}
