//! The `nbgrade grade` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use nbgrade_core::config::{load_config_from, GraderConfig};
use nbgrade_core::{AllowedImports, GradingResult};
use nbgrade_runner::Grader;

use crate::Format;

pub fn execute(
    notebook: PathBuf,
    tests: PathBuf,
    allowed_imports: Option<String>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    format: Format,
) -> Result<bool> {
    let mut config = load_config_from(config.as_deref())?;
    if let Some(list) = allowed_imports {
        config.allowed_imports = parse_allowed(&list);
    }
    run_grade(config, &notebook, &tests, output.as_deref(), format)
}

/// Parse a comma-separated module list.
pub(crate) fn parse_allowed(list: &str) -> AllowedImports {
    match list.parse() {
        Ok(allowed) => allowed,
        Err(never) => match never {},
    }
}

/// Grade, print the result and optionally save it.
///
/// Returns `false` when the caller should exit non-zero.
pub(crate) fn run_grade(
    config: GraderConfig,
    notebook: &Path,
    tests: &Path,
    output: Option<&Path>,
    format: Format,
) -> Result<bool> {
    anyhow::ensure!(notebook.exists(), "notebook not found: {}", notebook.display());
    anyhow::ensure!(tests.exists(), "test file not found: {}", tests.display());

    let grader = Grader::new(config).context("invalid grader configuration")?;
    let result = grader.grade(notebook, tests, None);

    match format {
        Format::Text => print_text(&result),
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to serialize result")?
        ),
        Format::Markdown => print!("{}", result.to_markdown()),
    }

    if let Some(path) = output {
        result.save_json(path)?;
        eprintln!("Result written to {}", path.display());
    }

    Ok(!result.should_fail_exit())
}

fn print_text(result: &GradingResult) {
    use comfy_table::{Cell, Table};

    println!("Score: {}/100", result.score);
    println!("Tests: {}/{} passed", result.passed_tests, result.total_tests);
    println!("Status: {}", result.status);
    if let Some(error) = &result.error {
        println!("Error: {error}");
    }

    if result.test_results.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Test", "Result", "Error"]);
    for outcome in &result.test_results {
        table.add_row(vec![
            Cell::new(&outcome.name),
            Cell::new(if outcome.passed { "pass" } else { "FAIL" }),
            Cell::new(outcome.error.as_deref().unwrap_or("")),
        ]);
    }
    println!("\n{table}");
}
