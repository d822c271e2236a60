//! The `nbgrade check` command.

use std::path::PathBuf;

use anyhow::Result;

use nbgrade_core::config::load_config_from;
use nbgrade_core::{imports, GradeError, Notebook};

use super::grade::parse_allowed;

pub fn execute(
    notebook: PathBuf,
    allowed_imports: Option<String>,
    config: Option<PathBuf>,
) -> Result<bool> {
    let config = load_config_from(config.as_deref())?;
    let allowed = match allowed_imports {
        Some(list) => parse_allowed(&list),
        None => config.allowed_imports,
    };

    let source = Notebook::load(&notebook)?.code_source();
    let modules = imports::imported_modules(&source)?;

    println!("Notebook: {}", notebook.display());
    if modules.is_empty() {
        println!("Imports: (none)");
    } else {
        println!("Imports: {}", modules.join(", "));
    }

    match imports::validate(&source, &allowed) {
        Ok(()) => {
            println!("OK: all imports allowed");
            Ok(true)
        }
        Err(GradeError::ImportRejected { module }) => {
            println!("REJECTED: import not allowed: {module}");
            println!("Allowed: {allowed}");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
