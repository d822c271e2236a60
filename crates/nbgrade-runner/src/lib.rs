//! nbgrade-runner — Restricted notebook execution and grading.
//!
//! Runs student notebooks inside the embedded CPython interpreter with a
//! restricted set of built-ins and a per-cell time budget, collects the
//! callables they define, runs instructor tests against them and folds the
//! outcome into a [`GradingResult`].

pub mod api;
pub mod capabilities;
pub mod loader;
pub mod registry;
pub mod sandbox;
pub mod test_runner;
mod watchdog;

use std::path::Path;

use pyo3::prelude::*;
use tracing::{error, info, warn};

use nbgrade_core::config::GraderConfig;
use nbgrade_core::{AllowedImports, GradeError, GradingResult};

pub use capabilities::{Capabilities, CapabilityError};
pub use registry::{CallableKind, FunctionRegistry};
pub use sandbox::Sandbox;
pub use watchdog::HarnessTimeout;

/// Grades notebooks against test files using one fixed configuration.
pub struct Grader {
    config: GraderConfig,
    sandbox: Sandbox,
}

impl Grader {
    /// Build a grader, rejecting configurations that expose forbidden
    /// built-ins.
    pub fn new(config: GraderConfig) -> Result<Self, CapabilityError> {
        let capabilities = Capabilities::with_extra(&config.extra_builtins)?;
        let sandbox = Sandbox::new(capabilities, config.cell_timeout());
        Ok(Self { config, sandbox })
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Validate and execute a notebook, returning its public callables.
    pub fn load(
        &self,
        py: Python<'_>,
        notebook: &Path,
        allowed: Option<&AllowedImports>,
    ) -> Result<FunctionRegistry, GradeError> {
        let allowed = allowed.unwrap_or(&self.config.allowed_imports);
        loader::load_notebook_funcs(py, notebook, Some(allowed), &self.sandbox)
    }

    /// Grade `notebook` against the tests in `tests`.
    ///
    /// Never fails: every error becomes an error-status result with score 0.
    pub fn grade(
        &self,
        notebook: &Path,
        tests: &Path,
        allowed: Option<&AllowedImports>,
    ) -> GradingResult {
        Python::attach(|py| self.grade_with(py, notebook, tests, allowed))
    }

    /// [`Grader::grade`] for callers already holding the GIL.
    pub fn grade_with(
        &self,
        py: Python<'_>,
        notebook: &Path,
        tests: &Path,
        allowed: Option<&AllowedImports>,
    ) -> GradingResult {
        match self.try_grade(py, notebook, tests, allowed) {
            Ok(result) => {
                info!(
                    notebook = %notebook.display(),
                    score = result.score,
                    passed = result.passed_tests,
                    total = result.total_tests,
                    "graded"
                );
                result
            }
            Err(e) => {
                if e.is_submission_fault() {
                    warn!(notebook = %notebook.display(), kind = e.kind(), error = %e, "submission rejected");
                } else {
                    error!(notebook = %notebook.display(), kind = e.kind(), error = %e, "grading failed");
                }
                GradingResult::failure(e.to_string())
            }
        }
    }

    fn try_grade(
        &self,
        py: Python<'_>,
        notebook: &Path,
        tests: &Path,
        allowed: Option<&AllowedImports>,
    ) -> Result<GradingResult, GradeError> {
        let allowed = allowed.unwrap_or(&self.config.allowed_imports);
        let registry = loader::load_notebook_funcs(py, notebook, Some(allowed), &self.sandbox)?;

        api::install(py, &self.config.api_module_aliases).map_err(sandbox::interpreter_error)?;
        let _run = api::ActiveRun::enter(&self.sandbox, allowed);
        let outcomes = test_runner::run_tests(py, tests, &registry, self.config.test_timeout())?;
        Ok(GradingResult::from_outcomes(outcomes))
    }
}

impl Default for Grader {
    fn default() -> Self {
        Self {
            config: GraderConfig::default(),
            sandbox: Sandbox::default(),
        }
    }
}

/// Grade with the default configuration.
pub fn grade(notebook: &Path, tests: &Path, allowed: Option<&AllowedImports>) -> GradingResult {
    Grader::default().grade(notebook, tests, allowed)
}
