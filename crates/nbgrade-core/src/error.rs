//! Grading error types.
//!
//! Every fatal failure the harness can hit while loading a notebook or a
//! test module. The loader and test runner return these to their caller; the
//! grading orchestrator folds them into an error-shaped `GradingResult`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the grading core.
#[derive(Debug, Error)]
pub enum GradeError {
    /// The notebook path does not exist.
    #[error("notebook not found: {}", .0.display())]
    NotebookNotFound(PathBuf),

    /// The notebook exists but is not a readable nbformat document.
    #[error("invalid notebook {}: {message}", path.display())]
    NotebookInvalid { path: PathBuf, message: String },

    /// The concatenated code cells do not parse.
    #[error("syntax error in code at line {line}, column {column}")]
    SyntaxRejected { line: usize, column: usize },

    /// The first disallowed top-level module found in the source.
    #[error("import not allowed: {module}")]
    ImportRejected { module: String },

    /// A cell ran past its wall-clock budget.
    #[error("code execution timed out after {seconds}s")]
    TimeoutExceeded { seconds: u64 },

    /// Any other exception raised while executing notebook code.
    #[error("notebook execution failed: {0}")]
    ExecutionFailed(String),

    /// The test-definition file could not be read, compiled or executed.
    #[error("could not load test file {}: {message}", path.display())]
    TestModuleLoadFailed { path: PathBuf, message: String },

    /// The embedded interpreter itself misbehaved.
    #[error("interpreter error: {0}")]
    Interpreter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GradeError {
    /// Stable snake_case name for the error kind, used in logs and JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            GradeError::NotebookNotFound(_) => "notebook_not_found",
            GradeError::NotebookInvalid { .. } => "notebook_invalid",
            GradeError::SyntaxRejected { .. } => "syntax_rejected",
            GradeError::ImportRejected { .. } => "import_rejected",
            GradeError::TimeoutExceeded { .. } => "timeout_exceeded",
            GradeError::ExecutionFailed(_) => "execution_failed",
            GradeError::TestModuleLoadFailed { .. } => "test_module_load_failed",
            GradeError::Interpreter(_) => "interpreter",
            GradeError::Io(_) => "io",
        }
    }

    /// Returns `true` for failures caused by the submitted notebook rather
    /// than by the harness inputs or environment.
    pub fn is_submission_fault(&self) -> bool {
        matches!(
            self,
            GradeError::SyntaxRejected { .. }
                | GradeError::ImportRejected { .. }
                | GradeError::TimeoutExceeded { .. }
                | GradeError::ExecutionFailed(_)
        )
    }
}
