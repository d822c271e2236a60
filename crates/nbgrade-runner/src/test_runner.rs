//! Running a test-definition file against a notebook's callables.

use std::path::Path;
use std::time::Duration;

use pyo3::prelude::*;
use tracing::{debug, info};

use nbgrade_core::{GradeError, TestOutcome};

use crate::registry::FunctionRegistry;
use crate::sandbox::{describe, exception_message};
use crate::watchdog::{run_guarded, Interrupted};

/// Load `tests_path` as a fresh module, bind the registry into it and run
/// every `test_*` callable it defines.
///
/// Tests run in lexicographic order by name. Any exception a test raises
/// marks it failed; the run itself only errors when the file cannot be
/// read, compiled or executed.
pub fn run_tests(
    py: Python<'_>,
    tests_path: &Path,
    registry: &FunctionRegistry,
    test_timeout: Option<Duration>,
) -> Result<Vec<TestOutcome>, GradeError> {
    let module = load_test_module(py, tests_path, registry)?;
    let tests = discover(&module).map_err(|e| load_failed(py, tests_path, &e))?;
    info!(path = %tests_path.display(), tests = tests.len(), "running tests");

    let mut outcomes = Vec::with_capacity(tests.len());
    for (name, test) in tests {
        let outcome = match run_guarded(py, test_timeout, || test.call0().map(drop)) {
            Ok(()) => TestOutcome::pass(&name),
            Err(Interrupted::Raised(err)) => TestOutcome::fail(&name, exception_message(py, &err)),
            Err(Interrupted::TimedOut) => TestOutcome::fail(
                &name,
                format!(
                    "test timed out after {}s",
                    test_timeout.map(|t| t.as_secs()).unwrap_or_default()
                ),
            ),
        };
        debug!(test = %name, passed = outcome.passed, "test finished");
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn load_test_module<'py>(
    py: Python<'py>,
    path: &Path,
    registry: &FunctionRegistry,
) -> Result<Bound<'py, PyModule>, GradeError> {
    let source = std::fs::read_to_string(path).map_err(|e| GradeError::TestModuleLoadFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tests".to_string());

    let load = || -> PyResult<Bound<'py, PyModule>> {
        let module = PyModule::new(py, &name)?;
        module.setattr("__file__", path.to_string_lossy().into_owned())?;
        registry.bind_into(&module)?;

        let builtins = PyModule::import(py, "builtins")?;
        let filename = path.to_string_lossy();
        let compiled = builtins
            .getattr("compile")?
            .call1((source.as_str(), &*filename, "exec"))?;
        builtins.getattr("exec")?.call1((compiled, module.dict()))?;
        Ok(module)
    };
    load().map_err(|e| load_failed(py, path, &e))
}

fn discover<'py>(module: &Bound<'py, PyModule>) -> PyResult<Vec<(String, Bound<'py, PyAny>)>> {
    let mut tests = Vec::new();
    for (key, value) in module.dict().iter() {
        let Ok(name) = key.extract::<String>() else {
            continue;
        };
        if name.starts_with("test_") && value.is_callable() {
            tests.push((name, value));
        }
    }
    tests.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(tests)
}

fn load_failed(py: Python<'_>, path: &Path, err: &PyErr) -> GradeError {
    GradeError::TestModuleLoadFailed {
        path: path.to_path_buf(),
        message: describe(py, err),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use pyo3::types::PyDict;

    use super::*;

    fn registry(py: Python<'_>, src: &str) -> FunctionRegistry {
        let ns = PyDict::new(py);
        let code = CString::new(src).unwrap();
        py.run(&code, Some(&ns), None).unwrap();
        FunctionRegistry::harvest(&ns).unwrap()
    }

    fn write_tests(dir: &Path, src: &str) -> std::path::PathBuf {
        let path = dir.join("test_exercise.py");
        std::fs::write(&path, src).unwrap();
        path
    }

    #[test]
    fn runs_tests_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tests(
            dir.path(),
            "def test_b():\n    assert add(2, 3) == 5\n\
             def test_a():\n    assert add(1, 1) == 3, 'wrong sum'\n\
             def helper():\n    raise RuntimeError('not a test')\n\
             test_value = 5\n",
        );

        Python::attach(|py| {
            let reg = registry(py, "def add(a, b):\n    return a + b\n");
            let outcomes = run_tests(py, &path, &reg, None).unwrap();
            assert_eq!(outcomes.len(), 2);
            assert_eq!(outcomes[0], TestOutcome::fail("test_a", "wrong sum"));
            assert_eq!(outcomes[1], TestOutcome::pass("test_b"));
        });
    }

    #[test]
    fn bare_assert_uses_type_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tests(dir.path(), "def test_it():\n    assert False\n");
        Python::attach(|py| {
            let outcomes = run_tests(py, &path, &FunctionRegistry::default(), None).unwrap();
            assert_eq!(outcomes[0].error.as_deref(), Some("AssertionError"));
        });
    }

    #[test]
    fn failure_does_not_stop_later_tests() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tests(
            dir.path(),
            "def test_1():\n    raise KeyError('k')\n\
             def test_2():\n    1 / 0\n\
             def test_3():\n    pass\n",
        );
        Python::attach(|py| {
            let outcomes = run_tests(py, &path, &FunctionRegistry::default(), None).unwrap();
            let passed: Vec<bool> = outcomes.iter().map(|o| o.passed).collect();
            assert_eq!(passed, vec![false, false, true]);
            assert_eq!(outcomes[1].error.as_deref(), Some("division by zero"));
        });
    }

    #[test]
    fn missing_file_fails_to_load() {
        Python::attach(|py| {
            let err = run_tests(py, Path::new("/no/tests.py"), &FunctionRegistry::default(), None)
                .unwrap_err();
            assert!(matches!(err, GradeError::TestModuleLoadFailed { .. }));
        });
    }

    #[test]
    fn module_level_error_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tests(dir.path(), "raise ImportError('no fixtures')\n");
        Python::attach(|py| {
            let err = run_tests(py, &path, &FunctionRegistry::default(), None).unwrap_err();
            match err {
                GradeError::TestModuleLoadFailed { message, .. } => {
                    assert_eq!(message, "ImportError: no fixtures")
                }
                other => panic!("unexpected: {other:?}"),
            }
        });
    }

    #[test]
    fn no_tests_gives_empty_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tests(dir.path(), "x = 1\n");
        Python::attach(|py| {
            let outcomes = run_tests(py, &path, &FunctionRegistry::default(), None).unwrap();
            assert!(outcomes.is_empty());
        });
    }

    #[test]
    fn module_sees_its_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tests(
            dir.path(),
            "def test_name():\n    assert __name__ == 'test_exercise'\n    assert __file__.endswith('test_exercise.py')\n",
        );
        Python::attach(|py| {
            let outcomes = run_tests(py, &path, &FunctionRegistry::default(), None).unwrap();
            assert!(outcomes[0].passed, "{:?}", outcomes[0].error);
        });
    }

    #[test]
    fn slow_test_fails_with_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tests(
            dir.path(),
            "def test_fast():\n    pass\ndef test_slow():\n    while True:\n        pass\n",
        );
        Python::attach(|py| {
            let outcomes = run_tests(
                py,
                &path,
                &FunctionRegistry::default(),
                Some(Duration::from_secs(1)),
            )
            .unwrap();
            assert!(outcomes[0].passed);
            assert_eq!(outcomes[1].error.as_deref(), Some("test timed out after 1s"));
        });
    }
}
