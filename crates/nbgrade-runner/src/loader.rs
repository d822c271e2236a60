//! Turning a notebook file into a registry of student callables.

use std::path::Path;

use pyo3::exceptions::PySyntaxError;
use pyo3::prelude::*;
use tracing::{debug, info, warn};

use nbgrade_core::imports;
use nbgrade_core::{AllowedImports, GradeError, Notebook};

use crate::registry::FunctionRegistry;
use crate::sandbox::{describe, interpreter_error, new_namespace, Sandbox};

/// Load a notebook from disk and execute its code cells.
///
/// `allowed` defaults to the course whitelist.
pub fn load_notebook_funcs(
    py: Python<'_>,
    path: &Path,
    allowed: Option<&AllowedImports>,
    sandbox: &Sandbox,
) -> Result<FunctionRegistry, GradeError> {
    let notebook = Notebook::load(path)?;
    let default_allowed;
    let allowed = match allowed {
        Some(allowed) => allowed,
        None => {
            default_allowed = AllowedImports::course_default();
            &default_allowed
        }
    };
    let registry = load_from_notebook(py, &notebook, allowed, sandbox)?;
    info!(
        notebook = %path.display(),
        functions = registry.len(),
        "notebook loaded"
    );
    Ok(registry)
}

/// Validate and execute an already parsed notebook.
///
/// The concatenated code is compiled by the interpreter and its imports are
/// checked before any cell runs, so a rejected notebook never executes.
/// Cells then run top to bottom in one shared namespace; the first failing
/// cell aborts the load.
pub fn load_from_notebook(
    py: Python<'_>,
    notebook: &Notebook,
    allowed: &AllowedImports,
    sandbox: &Sandbox,
) -> Result<FunctionRegistry, GradeError> {
    let source = notebook.code_source();
    check_syntax(py, &source)?;
    imports::validate(&source, allowed)?;

    let namespace = new_namespace(py).map_err(interpreter_error)?;
    for (index, cell) in notebook.code_cells().enumerate() {
        let source = cell.source();
        if source.trim().is_empty() {
            continue;
        }
        let cell_number = index + 1;
        debug!(cell = cell_number, "executing cell");
        let filename = format!("<cell {cell_number}>");
        if let Err(e) = sandbox.run(py, &source, &namespace, &filename) {
            warn!(cell = cell_number, error = %e, "cell failed");
            return Err(e);
        }
    }

    FunctionRegistry::harvest(&namespace).map_err(interpreter_error)
}

/// Compile `source` to an AST without running it.
///
/// A `SyntaxError` becomes `SyntaxRejected` at the interpreter's position.
fn check_syntax(py: Python<'_>, source: &str) -> Result<(), GradeError> {
    let compile_ast = || -> PyResult<()> {
        let only_ast: i64 = PyModule::import(py, "ast")?.getattr("PyCF_ONLY_AST")?.extract()?;
        PyModule::import(py, "builtins")?
            .getattr("compile")?
            .call1((source, "<notebook>", "exec", only_ast))?;
        Ok(())
    };

    match compile_ast() {
        Ok(()) => Ok(()),
        Err(err) if err.is_instance_of::<PySyntaxError>(py) => {
            let value = err.value(py);
            let position = |attr: &str| {
                value
                    .getattr(attr)
                    .and_then(|v| v.extract::<Option<usize>>())
                    .ok()
                    .flatten()
                    .unwrap_or(1)
                    .max(1)
            };
            let (line, column) = (position("lineno"), position("offset"));
            warn!(line, column, error = %describe(py, &err), "notebook does not compile");
            Err(GradeError::SyntaxRejected { line, column })
        }
        Err(err) => Err(interpreter_error(err)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use nbgrade_core::notebook::Cell;

    use super::*;
    use crate::capabilities::Capabilities;

    fn notebook(cells: &[&str]) -> Notebook {
        Notebook {
            cells: cells.iter().map(|src| Cell::code(*src)).collect(),
            nbformat: Some(4),
        }
    }

    fn sandbox(secs: u64) -> Sandbox {
        Sandbox::new(Capabilities::course_default(), Duration::from_secs(secs))
    }

    fn allowed(modules: &[&str]) -> AllowedImports {
        AllowedImports::new(modules.iter().copied())
    }

    #[test]
    fn cells_share_one_namespace() {
        Python::attach(|py| {
            let nb = notebook(&[
                "import math",
                "",
                "def circle_area(r):\n    return math.pi * r ** 2",
                "def double_area(r):\n    return 2 * circle_area(r)",
            ]);
            let registry = load_from_notebook(py, &nb, &allowed(&["math"]), &sandbox(5)).unwrap();
            let names: Vec<&str> = registry.names().collect();
            assert_eq!(names, vec!["circle_area", "double_area"]);
            let area: f64 = registry
                .get("double_area")
                .unwrap()
                .bind(py)
                .call1((1.0,))
                .unwrap()
                .extract()
                .unwrap();
            assert!((area - 2.0 * std::f64::consts::PI).abs() < 1e-9);
        });
    }

    #[test]
    fn rejected_import_runs_no_cell() {
        Python::attach(|py| {
            let start = Instant::now();
            let nb = notebook(&["while True:\n    pass", "import os"]);
            let err = load_from_notebook(py, &nb, &allowed(&["math"]), &sandbox(30)).unwrap_err();
            assert!(matches!(err, GradeError::ImportRejected { ref module } if module == "os"));
            assert!(start.elapsed() < Duration::from_secs(5));
        });
    }

    #[test]
    fn python2_syntax_is_rejected_before_any_cell_runs() {
        Python::attach(|py| {
            let nb = notebook(&["import math\nmath.nbgrade_cell_ran = True", "print 'hi'"]);
            let err = load_from_notebook(py, &nb, &allowed(&["math"]), &sandbox(5)).unwrap_err();
            match err {
                GradeError::SyntaxRejected { line, .. } => assert_eq!(line, 3),
                other => panic!("unexpected: {other:?}"),
            }
            let ran = PyModule::import(py, "math").unwrap().hasattr("nbgrade_cell_ran").unwrap();
            assert!(!ran, "first cell must not execute");
        });
    }

    #[test]
    fn exec_statement_is_rejected() {
        Python::attach(|py| {
            let nb = notebook(&["exec 'import os'"]);
            let err = load_from_notebook(py, &nb, &allowed(&[]), &sandbox(5)).unwrap_err();
            assert_eq!(err.kind(), "syntax_rejected");
        });
    }

    #[test]
    fn failing_cell_aborts_load() {
        Python::attach(|py| {
            let nb = notebook(&["def ok():\n    return 1", "1 / 0", "def later():\n    pass"]);
            let err = load_from_notebook(py, &nb, &allowed(&[]), &sandbox(5)).unwrap_err();
            match err {
                GradeError::ExecutionFailed(msg) => assert!(msg.starts_with("ZeroDivisionError")),
                other => panic!("unexpected: {other:?}"),
            }
        });
    }

    #[test]
    fn slow_cell_times_out() {
        Python::attach(|py| {
            let nb = notebook(&["while True:\n    pass"]);
            let err = load_from_notebook(py, &nb, &allowed(&[]), &sandbox(1)).unwrap_err();
            assert!(matches!(err, GradeError::TimeoutExceeded { seconds: 1 }));
        });
    }

    #[test]
    fn missing_notebook_is_reported() {
        Python::attach(|py| {
            let err = load_notebook_funcs(py, Path::new("/no/such/nb.ipynb"), None, &sandbox(5))
                .unwrap_err();
            assert!(matches!(err, GradeError::NotebookNotFound(_)));
        });
    }

    #[test]
    fn loads_from_disk_with_default_whitelist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nb.ipynb");
        let json = serde_json::json!({
            "nbformat": 4,
            "nbformat_minor": 5,
            "metadata": {},
            "cells": [
                {"cell_type": "markdown", "metadata": {}, "source": ["# Title"]},
                {"cell_type": "code", "metadata": {}, "execution_count": null, "outputs": [],
                 "source": ["from typing import List\n", "def total(xs: List[int]) -> int:\n", "    return sum(xs)\n"]}
            ]
        });
        std::fs::write(&path, json.to_string()).unwrap();

        Python::attach(|py| {
            let registry = load_notebook_funcs(py, &path, None, &sandbox(5)).unwrap();
            assert!(registry.contains("total"));
        });
    }
}
