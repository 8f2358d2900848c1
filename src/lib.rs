//! tugtest: characterization tests for Python modules.
//!
//! Parses Python sources, synthesizes arguments from parameter names, runs
//! each top-level function to observe what it does, and writes unittest
//! modules that pin that behavior down.

// Core infrastructure - re-exported from tugtest-core
pub use tugtest_core::error;
pub use tugtest_core::output;
pub use tugtest_core::process;

// Language support
pub use tugtest_python as python;

// Orchestration
pub mod generate;
pub mod suite;
