//! The built-in names student code is allowed to see.

use std::collections::BTreeSet;
use std::sync::Arc;

use pyo3::prelude::*;
use pyo3::types::PyDict;
use thiserror::Error;

/// Built-ins exposed to notebook code by default.
pub const COURSE_BUILTINS: &[&str] = &[
    "__name__",
    "__doc__",
    "__package__",
    "__loader__",
    "__spec__",
    "__import__",
    "__build_class__",
    "abs",
    "all",
    "any",
    "bin",
    "bool",
    "bytearray",
    "bytes",
    "callable",
    "chr",
    "classmethod",
    "complex",
    "dict",
    "dir",
    "divmod",
    "enumerate",
    "filter",
    "float",
    "format",
    "frozenset",
    "getattr",
    "hasattr",
    "hash",
    "hex",
    "id",
    "int",
    "isinstance",
    "issubclass",
    "iter",
    "len",
    "list",
    "map",
    "max",
    "min",
    "next",
    "object",
    "oct",
    "ord",
    "pow",
    "print",
    "property",
    "range",
    "repr",
    "reversed",
    "round",
    "set",
    "setattr",
    "slice",
    "sorted",
    "staticmethod",
    "str",
    "sum",
    "super",
    "tuple",
    "type",
    "vars",
    "zip",
    // exceptions students raise and catch
    "Exception",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "IndexError",
    "KeyError",
    "LookupError",
    "NameError",
    "NotImplementedError",
    "OverflowError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
    "NotImplemented",
];

/// Names that are never exposed, whatever the configuration says.
pub const FORBIDDEN_BUILTINS: &[&str] = &[
    "open",
    "eval",
    "exec",
    "compile",
    "input",
    "globals",
    "locals",
    "breakpoint",
    "exit",
    "quit",
    "help",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("builtin `{0}` cannot be exposed to student code")]
    Forbidden(String),
}

/// An immutable set of built-in names handed to the interpreter for one
/// grading invocation.
///
/// The Python-side table is rebuilt from this set on every execution, so no
/// interpreter-global state is modified.
#[derive(Debug, Clone)]
pub struct Capabilities {
    names: Arc<BTreeSet<String>>,
}

impl Capabilities {
    pub fn course_default() -> Self {
        Self {
            names: Arc::new(COURSE_BUILTINS.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// The course set plus `extra`, refusing any forbidden name.
    pub fn with_extra<I, S>(extra: I) -> Result<Self, CapabilityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: BTreeSet<String> = COURSE_BUILTINS.iter().map(|s| s.to_string()).collect();
        for name in extra {
            let name = name.as_ref().trim();
            if FORBIDDEN_BUILTINS.contains(&name) {
                return Err(CapabilityError::Forbidden(name.to_string()));
            }
            if !name.is_empty() {
                names.insert(name.to_string());
            }
        }
        Ok(Self {
            names: Arc::new(names),
        })
    }

    pub fn allows(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Build the restricted `__builtins__` dictionary.
    ///
    /// Names the running interpreter does not define are skipped.
    pub fn builtins_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let builtins = PyModule::import(py, "builtins")?;
        let table = PyDict::new(py);
        for name in self.names.iter() {
            if let Ok(value) = builtins.getattr(name.as_str()) {
                table.set_item(name, value)?;
            }
        }
        Ok(table)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::course_default()
    }
}
