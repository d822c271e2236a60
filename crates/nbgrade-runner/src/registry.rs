//! Student callables harvested from an executed notebook.

use std::collections::BTreeMap;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyType};

/// What kind of object a harvested name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    Function,
    Class,
    /// Any other callable object, such as a lambda bound to a name or an
    /// instance with `__call__`.
    Callable,
}

#[derive(Debug)]
pub struct StudentCallable {
    kind: CallableKind,
    object: Py<PyAny>,
}

impl StudentCallable {
    pub fn kind(&self) -> CallableKind {
        self.kind
    }

    pub fn bind<'py>(&self, py: Python<'py>) -> &Bound<'py, PyAny> {
        self.object.bind(py)
    }
}

/// Public callables defined by a notebook, keyed by name.
///
/// Names starting with `_` are never included. Imported modules are not
/// callable and so never appear, though imported functions and classes do.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    entries: BTreeMap<String, StudentCallable>,
}

impl FunctionRegistry {
    /// Collect the public callables from an execution namespace.
    pub fn harvest(namespace: &Bound<'_, PyDict>) -> PyResult<Self> {
        let mut entries = BTreeMap::new();
        for (key, value) in namespace.iter() {
            let Ok(name) = key.extract::<String>() else {
                continue;
            };
            if name.starts_with('_') || !value.is_callable() {
                continue;
            }
            let kind = if value.is_instance_of::<PyType>() {
                CallableKind::Class
            } else if value.hasattr("__code__")? {
                CallableKind::Function
            } else {
                CallableKind::Callable
            };
            entries.insert(
                name,
                StudentCallable {
                    kind,
                    object: value.unbind(),
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&StudentCallable> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The registry as a Python `dict` of name to object.
    pub fn to_py_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        for (name, callable) in &self.entries {
            dict.set_item(name, callable.bind(py))?;
        }
        Ok(dict)
    }

    /// Bind every entry as a global of `module`.
    pub fn bind_into(&self, module: &Bound<'_, PyModule>) -> PyResult<()> {
        let py = module.py();
        for (name, callable) in &self.entries {
            module.setattr(name.as_str(), callable.bind(py))?;
        }
        Ok(())
    }
}
