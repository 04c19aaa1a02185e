//! Coverage entries as they flow through a pipeline run, and the rows they
//! become once persisted.
//!
//! `CoverageReport` is ephemeral: produced by the parser (or synthesized by
//! the augmenter), consumed once by the merge step. `CoverageRecord` is the
//! stored row keyed by `(repo_id, full_path)`; `CoverageUpsert` is the
//! writable projection of it that omits the backend-owned columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CovsyncError;

/// Language tag used when nothing better is known.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Compute a coverage percentage (0–100) rounded to two decimals.
/// A metric with nothing to cover counts as fully covered, and a hit count
/// above the total is capped at the total.
#[must_use]
pub fn percent(covered: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let covered = covered.min(total);
    let pct = covered as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Granularity of a coverage entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    File,
    Directory,
    Repository,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::File => "file",
            Level::Directory => "directory",
            Level::Repository => "repository",
        }
    }
}

impl FromStr for Level {
    type Err = CovsyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "file" => Ok(Level::File),
            "directory" => Ok(Level::Directory),
            "repository" => Ok(Level::Repository),
            _ => Err(CovsyncError::Parse(format!("Unknown coverage level: '{}'", s))),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed (or synthesized) coverage entry for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub level: Level,
    pub full_path: String,
    pub language: String,
    pub statement_coverage: f64,
    pub function_coverage: f64,
    pub branch_coverage: f64,
    pub line_coverage: f64,
    pub path_coverage: f64,
    pub uncovered_lines: String,
    pub uncovered_functions: String,
    pub uncovered_branches: String,
}

impl CoverageReport {
    /// Explicit zero-coverage entry for a source file no artifact mentioned.
    pub fn zero_coverage(full_path: impl Into<String>) -> Self {
        Self {
            level: Level::File,
            full_path: full_path.into(),
            language: UNKNOWN_LANGUAGE.to_string(),
            statement_coverage: 0.0,
            function_coverage: 0.0,
            branch_coverage: 0.0,
            line_coverage: 0.0,
            path_coverage: 0.0,
            uncovered_lines: String::new(),
            uncovered_functions: String::new(),
            uncovered_branches: String::new(),
        }
    }
}

/// A persisted per-path coverage row, as read back from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub owner_id: i64,
    pub repo_id: i64,
    pub branch_name: String,
    pub level: Level,
    pub full_path: String,
    pub language: String,
    pub statement_coverage: f64,
    pub function_coverage: f64,
    pub branch_coverage: f64,
    pub line_coverage: f64,
    pub path_coverage: f64,
    pub uncovered_lines: Option<String>,
    pub uncovered_functions: Option<String>,
    pub uncovered_branches: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub github_issue_url: Option<String>,
    pub file_size: Option<i64>,
    pub is_excluded_from_testing: Option<bool>,
}

/// The writable projection of a `CoverageRecord`. Backends reject `id`,
/// `created_at` and `updated_at` on upsert, so this type has no place for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageUpsert {
    pub owner_id: i64,
    pub repo_id: i64,
    pub branch_name: String,
    pub level: Level,
    pub full_path: String,
    pub language: String,
    pub statement_coverage: f64,
    pub function_coverage: f64,
    pub branch_coverage: f64,
    pub line_coverage: f64,
    pub path_coverage: f64,
    pub uncovered_lines: Option<String>,
    pub uncovered_functions: Option<String>,
    pub uncovered_branches: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub github_issue_url: Option<String>,
    pub file_size: Option<i64>,
    pub is_excluded_from_testing: Option<bool>,
}

impl CoverageUpsert {
    /// The percentages that must be finite for the row to be writable.
    pub fn percentages(&self) -> [(&'static str, f64); 5] {
        [
            ("statement_coverage", self.statement_coverage),
            ("function_coverage", self.function_coverage),
            ("branch_coverage", self.branch_coverage),
            ("line_coverage", self.line_coverage),
            ("path_coverage", self.path_coverage),
        ]
    }
}

/// A repository-level rollup row waiting to be appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRepoCoverage {
    pub owner_id: i64,
    pub owner_name: String,
    pub repo_id: i64,
    pub repo_name: String,
    pub branch_name: String,
    pub language: String,
    pub line_coverage: f64,
    pub statement_coverage: f64,
    pub function_coverage: f64,
    pub branch_coverage: f64,
    pub created_by: String,
}

/// An appended rollup row, as returned by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoCoverage {
    pub id: i64,
    pub owner_id: i64,
    pub owner_name: String,
    pub repo_id: i64,
    pub repo_name: String,
    pub branch_name: String,
    pub language: String,
    pub line_coverage: f64,
    pub statement_coverage: f64,
    pub function_coverage: f64,
    pub branch_coverage: f64,
    pub created_by: String,
    pub created_at: String,
}

/// Branch recorded when the triggering CI run carries no branch name.
pub const DETACHED_BRANCH: &str = "detached";

/// Identity of the CI run being reconciled.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub owner_id: i64,
    pub owner_name: String,
    pub repo_id: i64,
    pub repo_name: String,
    pub run_id: i64,
    pub branch_name: String,
    pub user_name: String,
}

impl RunContext {
    /// `owner/repo`, for log lines.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner_name, self.repo_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_to_two_places() {
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(percent(2, 3), 66.67);
        assert_eq!(percent(5, 7), 71.43);
    }

    #[test]
    fn test_percent_zero_total_is_full() {
        assert_eq!(percent(0, 0), 100.0);
    }

    #[test]
    fn test_percent_caps_hits_at_total() {
        assert_eq!(percent(3, 2), 100.0);
        assert_eq!(percent(u64::MAX, 1), 100.0);
    }

    #[test]
    fn test_level_serde_lowercase() {
        let json = serde_json::to_string(&Level::Repository).unwrap();
        assert_eq!(json, "\"repository\"");
        let level: Level = serde_json::from_str("\"directory\"").unwrap();
        assert_eq!(level, Level::Directory);
        assert!("package".parse::<Level>().is_err());
    }

    #[test]
    fn test_zero_coverage_entry() {
        let r = CoverageReport::zero_coverage("src/a.py");
        assert_eq!(r.level, Level::File);
        assert_eq!(r.language, UNKNOWN_LANGUAGE);
        assert_eq!(r.line_coverage, 0.0);
        assert!(r.uncovered_lines.is_empty());
    }
}
