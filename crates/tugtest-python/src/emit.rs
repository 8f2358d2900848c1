//! unittest module rendering and writing.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::oracle::OracleResult;
use crate::parser::check_syntax;
use crate::synth::ArgumentBinding;
use crate::values::python_string_literal;

// ============================================================================
// Error Types
// ============================================================================

/// Errors writing a generated test module.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write test module {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EmitError {
    pub fn path(&self) -> &Path {
        match self {
            EmitError::CreateDir { path, .. } | EmitError::Write { path, .. } => path,
        }
    }
}

pub type EmitResult<T> = Result<T, EmitError>;

// ============================================================================
// Test Case
// ============================================================================

/// One rendered test method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub function: String,
    pub text: String,
}

impl TestCase {
    /// Render the test method for one function.
    ///
    /// Argument literals are embedded exactly as synthesized.
    pub fn render(
        function: &str,
        module_name: &str,
        binding: &ArgumentBinding,
        result: &OracleResult,
    ) -> Self {
        let call = format!("{}({})", function, binding.call_args());
        let mut text = String::new();
        let _ = writeln!(text);
        let _ = writeln!(text, "    def test_{}(self):", function);
        let _ = writeln!(text, "        # Test for {} in {}", function, module_name);
        match result {
            OracleResult::Success(value) => {
                let _ = writeln!(text, "        result = {}", call);
                match value.to_literal() {
                    Some(literal) => {
                        let _ = writeln!(text, "        self.assertEqual(result, {})", literal);
                    }
                    None => {
                        let _ = writeln!(
                            text,
                            "        self.assertEqual(type(result).__name__, {})",
                            python_string_literal(value.type_name())
                        );
                    }
                }
            }
            OracleResult::Failure(kind) => {
                let _ = writeln!(text, "        with self.assertRaises({}):", kind);
                let _ = writeln!(text, "            {}", call);
            }
        }
        TestCase {
            function: function.to_string(),
            text,
        }
    }
}

// ============================================================================
// Test Module
// ============================================================================

/// All test cases for one source file plus the fixed boilerplate.
#[derive(Debug, Clone)]
pub struct TestModule {
    /// Source module base name (`string_utils`).
    pub module_name: String,
    /// Absolute folder containing the source module.
    pub source_folder: PathBuf,
    /// Fragments in declaration order.
    pub cases: Vec<TestCase>,
}

impl TestModule {
    pub fn new(module_name: impl Into<String>, source_folder: impl Into<PathBuf>) -> Self {
        TestModule {
            module_name: module_name.into(),
            source_folder: source_folder.into(),
            cases: Vec::new(),
        }
    }

    /// Append a fragment. Same-named functions are kept; the later method
    /// wins when Python builds the class.
    pub fn push(&mut self, case: TestCase) {
        if self.cases.iter().any(|c| c.function == case.function) {
            warn!(
                module = %self.module_name,
                function = %case.function,
                "duplicate test method; the later definition shadows the earlier one"
            );
        }
        self.cases.push(case);
    }

    /// `Test` + Python `str.capitalize` of the module name.
    pub fn class_name(&self) -> String {
        format!("Test{}", capitalize(&self.module_name))
    }

    /// File name of the generated module.
    pub fn file_name(&self) -> String {
        format!("test_{}.py", self.module_name)
    }

    /// Distinct tested function names in first-seen order.
    fn tested_functions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for case in &self.cases {
            if !names.contains(&case.function.as_str()) {
                names.push(&case.function);
            }
        }
        names
    }

    pub fn render(&self) -> String {
        let folder = python_string_literal(&self.source_folder.to_string_lossy());
        let mut out = String::new();
        out.push_str("import unittest\n");
        out.push_str("import sys\n");
        out.push_str("import os\n");
        let _ = writeln!(out, "if {} not in sys.path:", folder);
        let _ = writeln!(out, "    sys.path.append({})", folder);
        let _ = write!(out, "\nfrom {} import *\n", self.module_name);
        // The wildcard skips `_private` names and anything left out of `__all__`
        let names = self.tested_functions();
        if !names.is_empty() {
            let _ = writeln!(out, "from {} import {}", self.module_name, names.join(", "));
        }
        let _ = write!(out, "\nclass {}(unittest.TestCase):\n", self.class_name());
        if self.cases.is_empty() {
            out.push_str("    def test_placeholder(self):\n");
            out.push_str("        pass\n");
        }
        for case in &self.cases {
            out.push_str(&case.text);
        }
        out
    }
}

/// Python's `str.capitalize`: first character upper, the rest lower.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Render `module`, write it under `out_dir`, and return the written path.
///
/// The directory is created on demand and an existing file is overwritten.
pub fn write_module(out_dir: &Path, module: &TestModule) -> EmitResult<PathBuf> {
    std::fs::create_dir_all(out_dir).map_err(|source| EmitError::CreateDir {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let path = out_dir.join(module.file_name());
    let text = module.render();
    if let Err(e) = check_syntax(&path, &text) {
        warn!(file = %path.display(), error = %e, "generated module does not parse");
    }
    std::fs::write(&path, text).map_err(|source| EmitError::Write {
        path: path.clone(),
        source,
    })?;
    debug!(file = %path.display(), cases = module.cases.len(), "wrote test module");
    Ok(path)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{ArgumentSynthesizer, IntSource};
    use crate::values::PyValue;
    use tempfile::TempDir;

    fn binding(names: &[&str]) -> ArgumentBinding {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        ArgumentSynthesizer::new(IntSource::Fixed(5)).synthesize(&names)
    }

    #[test]
    fn success_case_asserts_literal() {
        let case = TestCase::render(
            "reverse_string",
            "string_utils",
            &binding(&["s"]),
            &OracleResult::Success(PyValue::Str {
                value: "eulav_tluafed".to_string(),
            }),
        );
        assert_eq!(
            case.text,
            "\n    def test_reverse_string(self):\n\
             \x20       # Test for reverse_string in string_utils\n\
             \x20       result = reverse_string(\"default_value\")\n\
             \x20       self.assertEqual(result, \"eulav_tluafed\")\n"
        );
    }

    #[test]
    fn failure_case_asserts_raises() {
        let case = TestCase::render(
            "divide",
            "calc",
            &binding(&["a", "b"]),
            &OracleResult::Failure("ZeroDivisionError".to_string()),
        );
        assert!(case.text.contains("        with self.assertRaises(ZeroDivisionError):\n"));
        assert!(case.text.contains("            divide(5, 5)\n"));
    }

    #[test]
    fn opaque_case_compares_type_name() {
        let case = TestCase::render(
            "make",
            "factory",
            &binding(&[]),
            &OracleResult::Success(PyValue::Opaque {
                type_name: "Widget".to_string(),
            }),
        );
        assert!(case.text.contains("result = make()"));
        assert!(case
            .text
            .contains("self.assertEqual(type(result).__name__, \"Widget\")"));
    }

    #[test]
    fn empty_module_has_placeholder() {
        let module = TestModule::new("helpers", "/src/pkg");
        let text = module.render();
        assert!(text.starts_with("import unittest\nimport sys\nimport os\n"));
        assert!(text.contains("if \"/src/pkg\" not in sys.path:\n    sys.path.append(\"/src/pkg\")\n"));
        assert!(text.contains("\nfrom helpers import *\n\nclass TestHelpers"));
        assert!(text.contains("class TestHelpers(unittest.TestCase):\n"));
        assert!(text.ends_with("    def test_placeholder(self):\n        pass\n"));
    }

    #[test]
    fn cases_keep_declaration_order_and_duplicates() {
        let mut module = TestModule::new("m", "/src");
        for name in ["second", "first", "second"] {
            module.push(TestCase::render(
                name,
                "m",
                &binding(&[]),
                &OracleResult::Success(PyValue::None),
            ));
        }
        let text = module.render();
        assert!(!text.contains("test_placeholder"));
        assert!(text.contains("\nfrom m import *\nfrom m import second, first\n"));
        let order: Vec<_> = text
            .lines()
            .filter_map(|l| l.trim().strip_prefix("def test_"))
            .collect();
        assert_eq!(order, vec!["second(self):", "first(self):", "second(self):"]);
    }

    #[test]
    fn private_functions_are_imported_by_name() {
        let mut module = TestModule::new("priv", "/src");
        module.push(TestCase::render(
            "_shout",
            "priv",
            &binding(&["s"]),
            &OracleResult::Success(PyValue::Str {
                value: "DEFAULT_VALUE".to_string(),
            }),
        ));
        let text = module.render();
        assert!(text.contains("from priv import *\nfrom priv import _shout\n"));
        assert!(text.contains("result = _shout(\"default_value\")"));
    }

    #[test]
    fn class_name_follows_str_capitalize() {
        assert_eq!(capitalize("string_utils"), "String_utils");
        assert_eq!(capitalize("HTTPClient"), "Httpclient");
        assert_eq!(capitalize(""), "");
        assert_eq!(TestModule::new("io", "/x").class_name(), "TestIo");
    }

    #[test]
    fn writes_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("test_pkg");
        let module = TestModule::new("calc", "/src/pkg");

        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("test_calc.py"), "stale").unwrap();

        let path = write_module(&out, &module).unwrap();
        assert_eq!(path, out.join("test_calc.py"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), module.render());
    }

    #[test]
    fn rendered_module_parses() {
        let mut module = TestModule::new("calc", "/src/with \"quotes\"");
        module.push(TestCase::render(
            "add",
            "calc",
            &binding(&["a", "b"]),
            &OracleResult::Success(PyValue::Int {
                repr: "10".to_string(),
            }),
        ));
        assert!(check_syntax(Path::new("test_calc.py"), &module.render()).is_ok());
    }

    #[test]
    fn unwritable_directory_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let err = write_module(&blocker.join("sub"), &TestModule::new("m", "/s")).unwrap_err();
        assert!(matches!(err, EmitError::CreateDir { .. }));
    }
}
