//! Grader configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::AllowedImports;

/// Top-level nbgrade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    /// Modules student code may import.
    #[serde(default)]
    pub allowed_imports: AllowedImports,
    /// Wall-clock budget for each notebook cell.
    #[serde(default = "default_cell_timeout")]
    pub cell_timeout_secs: u64,
    /// Optional budget for each test function; unlimited when unset.
    #[serde(default)]
    pub test_timeout_secs: Option<u64>,
    /// Built-in names exposed to student code on top of the course set.
    #[serde(default)]
    pub extra_builtins: Vec<String>,
    /// Extra dotted module names under which the `nbgrade` API module is
    /// importable from test files.
    #[serde(default = "default_api_aliases")]
    pub api_module_aliases: Vec<String>,
    /// Directory holding `<module>/exercises/<exercise>.ipynb` trees.
    #[serde(default = "default_exercises_root")]
    pub exercises_root: PathBuf,
}

fn default_cell_timeout() -> u64 {
    30
}
fn default_api_aliases() -> Vec<String> {
    vec!["core.grading.api".to_string()]
}
fn default_exercises_root() -> PathBuf {
    PathBuf::from("modules")
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            allowed_imports: AllowedImports::course_default(),
            cell_timeout_secs: default_cell_timeout(),
            test_timeout_secs: None,
            extra_builtins: Vec::new(),
            api_module_aliases: default_api_aliases(),
            exercises_root: default_exercises_root(),
        }
    }
}

impl GraderConfig {
    pub fn cell_timeout(&self) -> Duration {
        Duration::from_secs(self.cell_timeout_secs)
    }

    pub fn test_timeout(&self) -> Option<Duration> {
        self.test_timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}

/// Load config from an explicit path, or search the default locations.
///
/// Search order when no path is given:
/// 1. `nbgrade.toml` in the current directory
/// 2. `~/.config/nbgrade/config.toml`
///
/// Environment variable overrides: `NBGRADE_ALLOWED_IMPORTS` (comma list),
/// `NBGRADE_CELL_TIMEOUT_SECS`.
pub fn load_config_from(path: Option<&Path>) -> Result<GraderConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("nbgrade.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => read_config_file(&path)?,
        None => GraderConfig::default(),
    };
    apply_overrides(
        &mut config,
        std::env::var("NBGRADE_ALLOWED_IMPORTS").ok(),
        std::env::var("NBGRADE_CELL_TIMEOUT_SECS").ok(),
    )?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<GraderConfig> {
    tracing::debug!(path = %path.display(), "loading config");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<GraderConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

/// Apply `NBGRADE_ALLOWED_IMPORTS` and `NBGRADE_CELL_TIMEOUT_SECS` values on
/// top of a loaded config, then check the result.
fn apply_overrides(
    config: &mut GraderConfig,
    allowed_imports: Option<String>,
    cell_timeout_secs: Option<String>,
) -> Result<()> {
    if let Some(modules) = allowed_imports {
        config.allowed_imports = match modules.parse::<AllowedImports>() {
            Ok(allowed) => allowed,
            Err(never) => match never {},
        };
    }

    if let Some(secs) = cell_timeout_secs {
        config.cell_timeout_secs = secs
            .trim()
            .parse()
            .with_context(|| format!("invalid NBGRADE_CELL_TIMEOUT_SECS: '{secs}'"))?;
    }

    anyhow::ensure!(
        config.cell_timeout_secs >= 1,
        "cell_timeout_secs must be at least 1"
    );
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("nbgrade"))
}
