//! Core infrastructure for tugtest.
//!
//! This crate provides language-agnostic infrastructure:
//! - Unified error type and stable error codes
//! - Serializable run reports for CLI output
//! - External process execution with timeouts

pub mod error;
pub mod output;
pub mod process;
