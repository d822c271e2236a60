//! JSON persistence and rendering for grading results.

use std::path::Path;

use anyhow::{Context, Result};

use crate::model::GradingResult;

impl GradingResult {
    /// Save the result as pretty JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a result from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        let result: GradingResult =
            serde_json::from_str(&content).context("failed to parse result JSON")?;
        Ok(result)
    }

    /// Format the result as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Score:** {}/100 ({}/{} tests passed, status: {})\n\n",
            self.score, self.passed_tests, self.total_tests, self.status
        ));

        if let Some(error) = &self.error {
            md.push_str(&format!("**Error:** {}\n\n", escape_cell(error)));
        }

        if !self.test_results.is_empty() {
            md.push_str("| Test | Result | Error |\n");
            md.push_str("|------|--------|-------|\n");
            for t in &self.test_results {
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    t.name,
                    if t.passed { "pass" } else { "FAIL" },
                    t.error.as_deref().map(escape_cell).unwrap_or_default()
                ));
            }
        }

        md
    }
}

/// Keep multi-line exception text inside a single table cell.
fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use crate::model::{GradeStatus, GradingResult, TestOutcome};

    fn sample() -> GradingResult {
        GradingResult::from_outcomes(vec![
            TestOutcome::pass("test_add"),
            TestOutcome::fail("test_add_wrong", "assert 2 == 3"),
        ])
    }

    #[test]
    fn json_roundtrip() {
        let result = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("result.json");

        result.save_json(&path).unwrap();
        let loaded = GradingResult::load_json(&path).unwrap();

        assert_eq!(loaded, result);
        assert_eq!(loaded.status, GradeStatus::Success);
    }

    #[test]
    fn load_missing_file_fails() {
        let err = GradingResult::load_json(std::path::Path::new("/nope/result.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read result"));
    }

    #[test]
    fn markdown_lists_tests() {
        let md = sample().to_markdown();
        assert!(md.contains("**Score:** 50/100"));
        assert!(md.contains("| test_add | pass |"));
        assert!(md.contains("| test_add_wrong | FAIL | assert 2 == 3 |"));
    }

    #[test]
    fn markdown_error_result() {
        let md = GradingResult::failure("import not allowed: os").to_markdown();
        assert!(md.contains("status: error"));
        assert!(md.contains("**Error:** import not allowed: os"));
        assert!(!md.contains("| Test |"));
    }
}
