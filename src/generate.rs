//! Run orchestration: source files in, unittest modules out.
//!
//! Per file the pipeline is parse, then per function synthesize, execute
//! and render, then write. Files are independent: a file that fails to parse
//! or write is recorded in the report and the run moves on. Only conditions
//! that make every file fail (missing input, no interpreter, unwritable
//! output root) abort the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};
use tugtest_core::error::TugTestError;
use tugtest_core::output::{FileOutcome, FileReport, FunctionReport, RunReport, SkippedFunction};
use tugtest_python::complexity;
use tugtest_python::emit::{write_module, TestCase, TestModule};
use tugtest_python::env::resolve_python;
use tugtest_python::files::{collect_source_files, is_eligible_file};
use tugtest_python::oracle::{Oracle, OracleCall, ResolutionContext, WorkerOracle};
use tugtest_python::parser::{FunctionItem, PythonParser};
use tugtest_python::synth::{ArgumentSynthesizer, IntSource};
use tugtest_python::worker::spawn_worker;

use crate::suite::{run_suite_reported, SuiteOptions};

/// Default limit for the optional suite run.
pub const DEFAULT_SUITE_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Options
// ============================================================================

/// Inputs for one generation run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Folder of modules, or a single `.py` file.
    pub source: PathBuf,
    /// Root under which `test_<folder>/` is created.
    pub output: PathBuf,
    /// Explicit interpreter; discovered when absent.
    pub python: Option<PathBuf>,
    /// Seed for `a`/`b` integers.
    pub seed: Option<u64>,
    /// Pin every `a`/`b` integer to this value. Takes precedence over `seed`.
    pub fixed_int: Option<i64>,
    /// Run the emitted suite afterwards.
    pub run_tests: bool,
    pub suite_timeout: Duration,
}

impl GenerateOptions {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        GenerateOptions {
            source: source.into(),
            output: output.into(),
            python: None,
            seed: None,
            fixed_int: None,
            run_tests: false,
            suite_timeout: DEFAULT_SUITE_TIMEOUT,
        }
    }

    fn int_source(&self) -> IntSource {
        match (self.fixed_int, self.seed) {
            (Some(value), _) => IntSource::Fixed(value),
            (None, Some(seed)) => IntSource::seeded(seed),
            (None, None) => IntSource::from_entropy(),
        }
    }
}

// ============================================================================
// Input Plan
// ============================================================================

/// What a run will process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPlan {
    /// Absolute folder that plays the source-folder role.
    pub folder: PathBuf,
    /// Files to process, in order.
    pub files: Vec<PathBuf>,
    /// `<output>/test_<folder base name>`.
    pub output_dir: PathBuf,
}

/// Resolve the source path into a folder, its files and the output directory.
pub fn plan_inputs(source: &Path, output: &Path) -> Result<InputPlan, TugTestError> {
    if !source.exists() {
        return Err(TugTestError::path_not_found(source.display().to_string()));
    }
    let source = source
        .canonicalize()
        .map_err(|e| TugTestError::internal(format!("resolving {}: {}", source.display(), e)))?;

    let (folder, files) = if source.is_dir() {
        let files = collect_source_files(&source)?;
        (source, files)
    } else {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !is_eligible_file(&name) {
            return Err(TugTestError::invalid_args_with_details(
                format!("not an eligible Python module: {}", source.display()),
                serde_json::json!({ "path": source.display().to_string() }),
            ));
        }
        let folder = source
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| TugTestError::invalid_args("source file has no parent folder"))?;
        (folder, vec![source])
    };

    let base = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    let output_dir = output.join(format!("test_{}", base));

    Ok(InputPlan {
        folder,
        files,
        output_dir,
    })
}

// ============================================================================
// Generator
// ============================================================================

/// Per-file pipeline over a chosen oracle.
pub struct Generator<O: Oracle> {
    parser: PythonParser,
    synthesizer: ArgumentSynthesizer,
    oracle: O,
}

impl<O: Oracle> Generator<O> {
    pub fn new(oracle: O, ints: IntSource) -> Result<Self, TugTestError> {
        Ok(Generator {
            parser: PythonParser::new()?,
            synthesizer: ArgumentSynthesizer::new(ints),
            oracle,
        })
    }

    pub fn into_oracle(self) -> O {
        self.oracle
    }

    /// Process every planned file in order.
    pub fn run(&mut self, plan: &InputPlan, report: &mut RunReport) {
        let context = ResolutionContext::for_folder(&plan.folder);
        for file in &plan.files {
            let file_report = self.process_file(file, &plan.folder, &plan.output_dir, &context);
            report.push_file(file_report);
        }
    }

    /// Generate and write the test module for one source file.
    pub fn process_file(
        &mut self,
        path: &Path,
        folder: &Path,
        output_dir: &Path,
        context: &ResolutionContext,
    ) -> FileReport {
        let file_name = path.display().to_string();
        info!("Generating tests for {}", file_name);

        let source = match self.parser.parse_file(path) {
            Ok(source) => source,
            Err(e) => {
                warn!(file = %file_name, error = %e, "skipping file that does not parse");
                return FileReport::failed(file_name, FileOutcome::ParseFailed, e.to_string());
            }
        };
        if let Err(message) = self.oracle.check_source(path, source.text()) {
            warn!(file = %file_name, error = %message, "skipping file the interpreter rejects");
            return FileReport::failed(file_name, FileOutcome::ParseFailed, message);
        }
        let module_name = source.module_name();

        let mut module = TestModule::new(module_name.clone(), folder);
        let mut functions = Vec::new();
        let mut skipped = Vec::new();

        for item in source.functions() {
            let sig = match item {
                FunctionItem::Eligible(sig) => sig,
                FunctionItem::Skipped { name, line, reason } => {
                    info!(function = %name, %reason, "skipping function");
                    skipped.push(SkippedFunction {
                        name,
                        line,
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            let report = complexity::analyze(&sig);
            info!(
                "Cyclomatic complexity for function '{}': {}",
                report.function, report.complexity
            );

            let binding = self.synthesizer.synthesize(&sig.params);
            let result = self.oracle.invoke(&OracleCall {
                signature: &sig,
                module_path: path,
                module_name: &module_name,
                binding: &binding,
                context,
            });

            module.push(TestCase::render(&sig.name, &module_name, &binding, &result));
            functions.push(FunctionReport {
                name: sig.name.clone(),
                line: sig.line,
                complexity: report.complexity,
                arguments: binding.literals(),
                outcome: result.to_outcome(),
            });
        }

        match write_module(output_dir, &module) {
            Ok(test_file) => FileReport {
                source: file_name,
                test_file: Some(test_file.display().to_string()),
                outcome: FileOutcome::Written,
                functions,
                skipped,
                error: None,
            },
            Err(e) => {
                warn!(file = %file_name, error = %e, "failed to write test module");
                FileReport {
                    source: file_name,
                    test_file: None,
                    outcome: FileOutcome::EmitFailed,
                    functions,
                    skipped,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Run generation end to end with the Python worker as oracle.
pub fn generate(options: &GenerateOptions) -> Result<RunReport, TugTestError> {
    let plan = plan_inputs(&options.source, &options.output)?;
    std::fs::create_dir_all(&plan.output_dir).map_err(|e| TugTestError::EmissionError {
        message: format!("cannot create output directory: {}", e),
        file: Some(plan.output_dir.display().to_string()),
    })?;

    let python = resolve_python(options.python.as_deref())?;
    info!(
        python = %python.interpreter().display(),
        version = %python.version(),
        files = plan.files.len(),
        "starting generation"
    );

    let mut report = RunReport::new(
        options.source.display().to_string(),
        plan.output_dir.display().to_string(),
    );

    let worker = spawn_worker(python.interpreter())?;
    let mut generator = Generator::new(WorkerOracle::new(worker), options.int_source())?;
    generator.run(&plan, &mut report);
    generator.into_oracle().shutdown();

    if options.run_tests {
        report.suite = Some(run_suite_reported(&SuiteOptions {
            python: python.interpreter().to_path_buf(),
            test_dir: plan.output_dir.clone(),
            timeout: options.suite_timeout,
            coverage_available: python.has_coverage(),
        }));
    }

    Ok(report)
}

// ============================================================================
// Tests
// ============================================================================
