//! Build the rows to upsert by layering fresh coverage over stored state.
//!
//! For each report entry the row is assembled in three layers, later layers
//! winning field by field:
//!
//! 1. the existing stored record for the path, if any,
//! 2. the run's metadata (owner, repo, branch, language, updater),
//! 3. the freshly computed coverage fields.
//!
//! Fields only the first layer carries (`github_issue_url`, `file_size`,
//! `created_by`, `is_excluded_from_testing`) therefore survive every run.

use std::collections::HashMap;

use log::warn;

use crate::error::{CovsyncError, Result};
use crate::model::{CoverageRecord, CoverageReport, CoverageUpsert, RunContext, UNKNOWN_LANGUAGE};

/// Build one writable row per report entry, in report order. Rows that fail
/// validation are logged and dropped; the rest are still returned.
pub fn build_upserts(
    reports: &[CoverageReport],
    existing: &HashMap<String, CoverageRecord>,
    run: &RunContext,
    run_language: &str,
) -> Vec<CoverageUpsert> {
    let mut rows = Vec::with_capacity(reports.len());
    for report in reports {
        let row = merge_entry(report, existing.get(&report.full_path), run, run_language);
        match validate_row(&row) {
            Ok(()) => rows.push(row),
            Err(e) => warn!(
                "Skipping coverage row for `{}`, full_path=`{}`: {}",
                run.slug(),
                row.full_path,
                e
            ),
        }
    }
    rows
}

/// Merge a single entry with its stored record.
pub fn merge_entry(
    report: &CoverageReport,
    existing: Option<&CoverageRecord>,
    run: &RunContext,
    run_language: &str,
) -> CoverageUpsert {
    let (created_by, github_issue_url, file_size, is_excluded_from_testing) = match existing {
        Some(rec) => (
            rec.created_by.clone(),
            rec.github_issue_url.clone(),
            rec.file_size,
            rec.is_excluded_from_testing,
        ),
        None => (Some(run.user_name.clone()), None, None, Some(false)),
    };

    // Synthesized entries carry no language of their own.
    let language = if report.language == UNKNOWN_LANGUAGE {
        run_language.to_string()
    } else {
        report.language.clone()
    };

    let mut row = CoverageUpsert {
        owner_id: run.owner_id,
        repo_id: run.repo_id,
        branch_name: run.branch_name.clone(),
        level: report.level,
        full_path: report.full_path.clone(),
        language,
        statement_coverage: report.statement_coverage,
        function_coverage: report.function_coverage,
        branch_coverage: report.branch_coverage,
        line_coverage: report.line_coverage,
        path_coverage: report.path_coverage,
        uncovered_lines: Some(report.uncovered_lines.clone()),
        uncovered_functions: Some(report.uncovered_functions.clone()),
        uncovered_branches: Some(report.uncovered_branches.clone()),
        created_by,
        updated_by: Some(run.user_name.clone()),
        github_issue_url,
        file_size,
        is_excluded_from_testing,
    };
    clear_fully_covered(&mut row);
    row
}

/// A metric at exactly 100% has nothing uncovered to list.
fn clear_fully_covered(row: &mut CoverageUpsert) {
    if row.line_coverage == 100.0 {
        row.uncovered_lines = None;
    }
    if row.function_coverage == 100.0 {
        row.uncovered_functions = None;
    }
    if row.branch_coverage == 100.0 {
        row.uncovered_branches = None;
    }
}

/// A row is writable when every percentage is finite and it encodes as JSON.
pub fn validate_row(row: &CoverageUpsert) -> Result<()> {
    for (name, value) in row.percentages() {
        if !value.is_finite() {
            return Err(CovsyncError::Write(format!("{} is not finite: {}", name, value)));
        }
    }
    serde_json::to_string(row)?;
    Ok(())
}
