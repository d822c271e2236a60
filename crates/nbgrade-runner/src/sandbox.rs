//! Restricted execution of notebook code.

use std::time::Duration;

use pyo3::prelude::*;
use pyo3::types::PyDict;

use nbgrade_core::GradeError;

use crate::capabilities::Capabilities;
use crate::watchdog::{run_guarded, Interrupted};

/// Executes untrusted source against a caller-owned namespace with a
/// restricted set of built-ins and a per-execution time budget.
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Built-in names visible to the executed code.
    capabilities: Capabilities,
    /// Wall-clock budget for each call to [`Sandbox::run`].
    timeout: Duration,
}

impl Sandbox {
    pub fn new(capabilities: Capabilities, timeout: Duration) -> Self {
        Self {
            capabilities,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the per-execution timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Execute `code` with `namespace` as its starting globals.
    ///
    /// Execution happens in a fresh globals dictionary seeded from
    /// `namespace`, with `__builtins__` always replaced by the restricted
    /// table. Afterwards every name not starting with `__` is written back to
    /// `namespace`, as are dunder names the namespace already held. Partial
    /// effects of a failing execution are not written back.
    pub fn run(
        &self,
        py: Python<'_>,
        code: &str,
        namespace: &Bound<'_, PyDict>,
        filename: &str,
    ) -> Result<(), GradeError> {
        let globals = PyDict::new(py);
        globals.update(namespace.as_mapping()).map_err(interpreter_error)?;
        globals
            .set_item("__builtins__", self.capabilities.builtins_dict(py).map_err(interpreter_error)?)
            .map_err(interpreter_error)?;

        let builtins = PyModule::import(py, "builtins").map_err(interpreter_error)?;
        let outcome = run_guarded(py, Some(self.timeout), || {
            let compiled = builtins.getattr("compile")?.call1((code, filename, "exec"))?;
            builtins.getattr("exec")?.call1((compiled, &globals))?;
            Ok(())
        });

        match outcome {
            Ok(()) => {}
            Err(Interrupted::TimedOut) => {
                return Err(GradeError::TimeoutExceeded {
                    seconds: self.timeout.as_secs(),
                })
            }
            Err(Interrupted::Raised(err)) => {
                return Err(GradeError::ExecutionFailed(describe(py, &err)))
            }
        }

        merge_back(&globals, namespace).map_err(interpreter_error)
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(Capabilities::course_default(), Duration::from_secs(30))
    }
}

/// A fresh namespace for executing a notebook top to bottom.
pub fn new_namespace(py: Python<'_>) -> PyResult<Bound<'_, PyDict>> {
    let namespace = PyDict::new(py);
    namespace.set_item("__name__", "__main__")?;
    Ok(namespace)
}

fn merge_back(globals: &Bound<'_, PyDict>, namespace: &Bound<'_, PyDict>) -> PyResult<()> {
    for (key, value) in globals.iter() {
        let keep = match key.extract::<String>() {
            Ok(name) => !name.starts_with("__") || namespace.contains(&key)?,
            Err(_) => true,
        };
        if keep {
            namespace.set_item(key, value)?;
        }
    }
    Ok(())
}

/// `"<Type>: <message>"` for an exception raised by executed code.
pub(crate) fn describe(py: Python<'_>, err: &PyErr) -> String {
    let type_name = err
        .get_type(py)
        .name()
        .map(|n| n.to_string())
        .unwrap_or_else(|_| "Exception".to_string());
    match err.value(py).str() {
        Ok(message) if !message.to_string().is_empty() => format!("{type_name}: {message}"),
        _ => type_name,
    }
}

/// `str(exc)`, or the exception type name when that is empty.
pub(crate) fn exception_message(py: Python<'_>, err: &PyErr) -> String {
    match err.value(py).str() {
        Ok(message) if !message.to_string().is_empty() => message.to_string(),
        _ => err
            .get_type(py)
            .name()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| "Exception".to_string()),
    }
}

pub(crate) fn interpreter_error(err: PyErr) -> GradeError {
    GradeError::Interpreter(err.to_string())
}
