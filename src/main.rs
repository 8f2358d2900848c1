//! Binary entry point for the tugtest CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Generate tests for every module in a folder
//! tugtest generate src/pkg --output generated
//!
//! # Reproducible integers, then run the suite under coverage
//! tugtest generate src/pkg --output generated --seed 7 --run-tests
//!
//! # JSON report for tooling
//! tugtest generate src/pkg/util.py --output generated --format json
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use tugtest::generate::{generate, GenerateOptions};
use tugtest_core::error::{OutputErrorCode, TugTestError};
use tugtest_core::output::{emit_response, ErrorResponse, RunReport};

// ============================================================================
// CLI Structure
// ============================================================================

/// Characterization tests for Python modules.
///
/// Runs each top-level function with synthesized arguments and writes
/// unittest modules asserting whatever it returned or raised.
#[derive(Parser, Debug)]
#[command(name = "tugtest", version, about = "Characterization tests for Python modules")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Python interpreter used to execute functions and run the suite.
    #[arg(long, global = true)]
    python: Option<PathBuf>,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Output format for the run report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    /// Human-readable summary (default).
    #[default]
    Text,
    /// Full JSON report.
    Json,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Generate unittest modules for a folder or a single `.py` file.
    Generate {
        /// Folder of Python modules, or one module.
        #[arg(env = "FOLDER_PATH")]
        path: PathBuf,
        /// Folder that receives `test_<folder>/`.
        #[arg(long, short, env = "OUTPUT_FOLDER")]
        output: PathBuf,
        /// Seed for the integers given to `a`/`b` parameters.
        #[arg(long)]
        seed: Option<u64>,
        /// Give every `a`/`b` parameter this integer.
        #[arg(long)]
        fixed_int: Option<i64>,
        /// Run the generated suite (under coverage when installed).
        #[arg(long)]
        run_tests: bool,
        /// Suite time limit in seconds.
        #[arg(long, default_value_t = 300)]
        suite_timeout: u64,
        /// Output format.
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,
    },
}

// ============================================================================
// Main
// ============================================================================

fn main() -> ExitCode {
    // Process environment wins over .env entries
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON so callers always get one document
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<ExitCode, TugTestError> {
    match cli.command {
        Command::Generate {
            path,
            output,
            seed,
            fixed_int,
            run_tests,
            suite_timeout,
            format,
        } => {
            let options = GenerateOptions {
                source: path,
                output,
                python: cli.global.python,
                seed,
                fixed_int,
                run_tests,
                suite_timeout: Duration::from_secs(suite_timeout),
            };
            let report = generate(&options)?;
            print_report(&report, format)?;
            Ok(if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn print_report(report: &RunReport, format: ReportFormat) -> Result<(), TugTestError> {
    let mut stdout = io::stdout();
    let written = match format {
        ReportFormat::Json => emit_response(report, &mut stdout),
        ReportFormat::Text => write!(stdout, "{}", report.render_text()),
    };
    written
        .and_then(|_| stdout.flush())
        .map_err(|e| TugTestError::internal(format!("writing report: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn generate_defaults() {
            let cli =
                Cli::try_parse_from(["tugtest", "generate", "src/pkg", "--output", "out"]).unwrap();
            assert!(cli.global.python.is_none());
            match cli.command {
                Command::Generate {
                    path,
                    output,
                    seed,
                    fixed_int,
                    run_tests,
                    suite_timeout,
                    format,
                } => {
                    assert_eq!(path, PathBuf::from("src/pkg"));
                    assert_eq!(output, PathBuf::from("out"));
                    assert_eq!(seed, None);
                    assert_eq!(fixed_int, None);
                    assert!(!run_tests);
                    assert_eq!(suite_timeout, 300);
                    assert_eq!(format, ReportFormat::Text);
                }
            }
        }

        #[test]
        fn generate_all_flags() {
            let cli = Cli::try_parse_from([
                "tugtest",
                "--python",
                "/usr/bin/python3",
                "--log-level",
                "debug",
                "generate",
                "calc.py",
                "-o",
                "out",
                "--seed",
                "7",
                "--fixed-int",
                "3",
                "--run-tests",
                "--suite-timeout",
                "30",
                "--format",
                "json",
            ])
            .unwrap();
            assert_eq!(cli.global.python, Some(PathBuf::from("/usr/bin/python3")));
            assert!(matches!(cli.global.log_level, LogLevel::Debug));
            match cli.command {
                Command::Generate {
                    seed,
                    fixed_int,
                    run_tests,
                    suite_timeout,
                    format,
                    ..
                } => {
                    assert_eq!(seed, Some(7));
                    assert_eq!(fixed_int, Some(3));
                    assert!(run_tests);
                    assert_eq!(suite_timeout, 30);
                    assert_eq!(format, ReportFormat::Json);
                }
            }
        }

        #[test]
        fn invalid_format_is_rejected() {
            let result = Cli::try_parse_from([
                "tugtest", "generate", "src", "--output", "out", "--format", "xml",
            ]);
            assert!(result.is_err());
        }
    }
}
