//! Core data model types for nbgrade.
//!
//! The import allow-list, per-test outcomes and the aggregate grading result
//! that external tooling consumes.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Top-level modules the course permits by default.
pub const COURSE_MODULES: &[&str] = &[
    "numpy",
    "pandas",
    "sklearn",
    "matplotlib",
    "scipy",
    "seaborn",
    "typing",
];

/// The set of permitted top-level import names.
///
/// Immutable once built; one value is shared by a whole grading invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowedImports(BTreeSet<String>);

impl AllowedImports {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            modules
                .into_iter()
                .map(|m| {
                    let m: String = m.into();
                    m.trim().to_string()
                })
                .filter(|m| !m.is_empty())
                .collect(),
        )
    }

    /// The fixed course whitelist.
    pub fn course_default() -> Self {
        Self::new(COURSE_MODULES.iter().copied())
    }

    /// Whether `module` (a top-level name, no dots) is permitted.
    pub fn allows(&self, module: &str) -> bool {
        self.0.contains(module)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for AllowedImports {
    fn default() -> Self {
        Self::course_default()
    }
}

impl FromStr for AllowedImports {
    type Err = std::convert::Infallible;

    /// Parses a comma- or whitespace-separated module list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(
            s.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|m| !m.is_empty()),
        ))
    }
}

impl fmt::Display for AllowedImports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(", "))
    }
}

/// The outcome of one discovered test function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Name of the test function.
    pub name: String,
    /// Whether the test returned normally.
    pub passed: bool,
    /// Stringified exception for failed tests.
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
        }
    }

    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.into()),
        }
    }
}

/// Whether the harness ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeStatus {
    Success,
    Error,
}

impl fmt::Display for GradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeStatus::Success => write!(f, "success"),
            GradeStatus::Error => write!(f, "error"),
        }
    }
}

/// The complete grading result for one notebook against one test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingResult {
    /// Percentage of passing tests, 0..=100.
    pub score: u32,
    pub total_tests: usize,
    pub passed_tests: usize,
    /// Outcomes in discovery order.
    pub test_results: Vec<TestOutcome>,
    pub status: GradeStatus,
    /// Harness failure message when `status` is `Error`.
    pub error: Option<String>,
}

impl GradingResult {
    /// Build a successful result from the raw test outcomes.
    pub fn from_outcomes(test_results: Vec<TestOutcome>) -> Self {
        let total_tests = test_results.len();
        let passed_tests = test_results.iter().filter(|t| t.passed).count();
        Self {
            score: score(passed_tests, total_tests),
            total_tests,
            passed_tests,
            test_results,
            status: GradeStatus::Success,
            error: None,
        }
    }

    /// The result shape for a harness failure before any test could run.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            score: 0,
            total_tests: 0,
            passed_tests: 0,
            test_results: Vec::new(),
            status: GradeStatus::Error,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == GradeStatus::Success
    }

    pub fn failed_tests(&self) -> usize {
        self.total_tests - self.passed_tests
    }

    /// Whether a wrapper should exit non-zero for this result.
    pub fn should_fail_exit(&self) -> bool {
        self.status == GradeStatus::Error || self.score == 0
    }
}

/// Integer percentage of passing tests, rounded down; 0 when there are none.
pub fn score(passed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (passed.min(total) * 100 / total) as u32
}
