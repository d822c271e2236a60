//! The `nbgrade exercise` command.

use std::path::{Path, PathBuf};

use anyhow::Result;

use nbgrade_core::config::load_config_from;

use super::grade::run_grade;
use crate::Format;

pub fn execute(
    module: String,
    exercise: String,
    root: Option<PathBuf>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    format: Format,
) -> Result<bool> {
    let config = load_config_from(config.as_deref())?;
    let root = root.unwrap_or_else(|| config.exercises_root.clone());
    let (notebook, tests) = exercise_paths(&root, &module, &exercise);
    tracing::debug!(
        notebook = %notebook.display(),
        tests = %tests.display(),
        "resolved exercise"
    );
    run_grade(config, &notebook, &tests, output.as_deref(), format)
}

/// `<root>/<module>/exercises/<exercise>.ipynb` and its `_tests.py` sibling.
fn exercise_paths(root: &Path, module: &str, exercise: &str) -> (PathBuf, PathBuf) {
    let dir = root.join(module).join("exercises");
    (
        dir.join(format!("{exercise}.ipynb")),
        dir.join(format!("{exercise}_tests.py")),
    )
}
