//! Python support for tugtest.
//!
//! This crate turns Python source files into characterization tests:
//! - Source parsing and top-level function extraction (tree-sitter)
//! - Argument synthesis from parameter names
//! - Oracle execution in a Python worker process
//! - Linear-chain complexity diagnostics
//! - unittest module emission
//! - Python interpreter resolution

pub mod complexity;
pub mod emit;
pub mod env;
pub mod files;
pub mod oracle;
pub mod parser;
pub mod synth;
pub mod test_helpers;
pub mod values;
pub mod worker;

// Conversions into the unified TugTestError
mod error_bridges;
