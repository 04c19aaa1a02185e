//! Repository-level rollup: one history row per successful run.

use crate::model::{CoverageReport, Level, NewRepoCoverage, RunContext};

/// Build the history row from the run's repository-level entry.
///
/// Returns `None` when no entry is at repository level. The row's language
/// is the first entry's language.
pub fn build_rollup(reports: &[CoverageReport], run: &RunContext) -> Option<NewRepoCoverage> {
    let repo = reports.iter().find(|r| r.level == Level::Repository)?;
    let language = reports.first().map(|r| r.language.clone())?;

    Some(NewRepoCoverage {
        owner_id: run.owner_id,
        owner_name: run.owner_name.clone(),
        repo_id: run.repo_id,
        repo_name: run.repo_name.clone(),
        branch_name: run.branch_name.clone(),
        language,
        line_coverage: repo.line_coverage,
        statement_coverage: repo.statement_coverage,
        function_coverage: repo.function_coverage,
        branch_coverage: repo.branch_coverage,
        created_by: run.user_name.clone(),
    })
}
