//! nbgrade-core — Notebook model, import validation and grading results.
//!
//! The interpreter-free half of the grader: everything here works on text
//! and data, so tooling can validate notebooks and read results without
//! starting Python.

pub mod config;
pub mod error;
pub mod imports;
pub mod model;
pub mod notebook;
pub mod report;

pub use error::GradeError;
pub use model::{AllowedImports, GradeStatus, GradingResult, TestOutcome};
pub use notebook::Notebook;
