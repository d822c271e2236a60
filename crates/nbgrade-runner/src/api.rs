//! The `nbgrade` module importable from test files.
//!
//! Test files call `load_notebook_funcs(path, allowed_imports=None)` to get
//! a dict of a notebook's public callables. While a grading run is executing
//! a test file, calls use that run's sandbox and import whitelist; outside a
//! run they use the course defaults.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::PathBuf;

use pyo3::exceptions::{PyFileNotFoundError, PyImportError, PyRuntimeError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use nbgrade_core::{AllowedImports, GradeError};

use crate::loader;
use crate::sandbox::Sandbox;
use crate::watchdog::HarnessTimeout;

pub const API_MODULE: &str = "nbgrade";

#[derive(Clone)]
struct RunContext {
    sandbox: Sandbox,
    allowed: AllowedImports,
}

thread_local! {
    static ACTIVE: RefCell<Option<RunContext>> = const { RefCell::new(None) };
}

/// Makes a grading run's settings visible to `load_notebook_funcs` for as
/// long as the guard lives. Restores the previous settings on drop.
pub struct ActiveRun {
    previous: Option<RunContext>,
}

impl ActiveRun {
    pub fn enter(sandbox: &Sandbox, allowed: &AllowedImports) -> Self {
        let context = RunContext {
            sandbox: sandbox.clone(),
            allowed: allowed.clone(),
        };
        let previous = ACTIVE.with(|active| active.replace(Some(context)));
        Self { previous }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

fn current_context() -> RunContext {
    ACTIVE
        .with(|active| active.borrow().clone())
        .unwrap_or_else(|| RunContext {
            sandbox: Sandbox::default(),
            allowed: AllowedImports::course_default(),
        })
}

fn to_py_err(err: GradeError) -> PyErr {
    match err {
        GradeError::NotebookNotFound(_) => PyFileNotFoundError::new_err(err.to_string()),
        GradeError::ImportRejected { .. } => PyImportError::new_err(err.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

/// Load a notebook and return its public callables as a dict.
#[pyfunction]
#[pyo3(signature = (notebook_path, allowed_imports = None))]
fn load_notebook_funcs<'py>(
    py: Python<'py>,
    notebook_path: PathBuf,
    allowed_imports: Option<BTreeSet<String>>,
) -> PyResult<Bound<'py, PyDict>> {
    let context = current_context();
    let allowed = allowed_imports.map(AllowedImports::new);
    let registry = loader::load_notebook_funcs(
        py,
        &notebook_path,
        Some(allowed.as_ref().unwrap_or(&context.allowed)),
        &context.sandbox,
    )
    .map_err(to_py_err)?;
    registry.to_py_dict(py)
}

/// Register the API module in `sys.modules`, under [`API_MODULE`] and each
/// dotted alias. Missing parent packages of an alias are created empty.
pub fn install(py: Python<'_>, aliases: &[String]) -> PyResult<()> {
    let module = PyModule::new(py, API_MODULE)?;
    module.add_function(wrap_pyfunction!(load_notebook_funcs, &module)?)?;
    module.add("HarnessTimeout", py.get_type::<HarnessTimeout>())?;

    let sys_modules = PyModule::import(py, "sys")?.getattr("modules")?;
    sys_modules.set_item(API_MODULE, &module)?;
    for alias in aliases {
        register_alias(py, &sys_modules, alias, &module)?;
    }
    Ok(())
}

fn register_alias(
    py: Python<'_>,
    sys_modules: &Bound<'_, PyAny>,
    dotted: &str,
    module: &Bound<'_, PyModule>,
) -> PyResult<()> {
    let parts: Vec<&str> = dotted.split('.').filter(|p| !p.is_empty()).collect();
    let Some((leaf, packages)) = parts.split_last() else {
        return Ok(());
    };

    let mut parent: Option<Bound<'_, PyAny>> = None;
    for depth in 1..=packages.len() {
        let name = parts[..depth].join(".");
        let package = match sys_modules.get_item(&name) {
            Ok(existing) => existing,
            Err(_) => {
                let created = PyModule::new(py, &name)?;
                created.setattr("__path__", PyList::empty(py))?;
                sys_modules.set_item(&name, &created)?;
                created.into_any()
            }
        };
        if let Some(parent) = &parent {
            parent.setattr(parts[depth - 1], &package)?;
        }
        parent = Some(package);
    }

    sys_modules.set_item(parts.join("."), module)?;
    if let Some(parent) = parent {
        parent.setattr(*leaf, module)?;
    }
    Ok(())
}
