//! ODHARNESS: batch validation harness for orbit determination.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod discovery;
pub mod engine;
pub mod validation;
pub mod storage;
