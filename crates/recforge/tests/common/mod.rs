//! Shared test utilities for recforge integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution with temp directories
//! - `ContentFileBuilder` for writing content files programmatically

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{drain, run, OperationRun, TestHarness};
