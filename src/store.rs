//! The persistence seam. The pipeline only ever talks to a `CoverageStore`;
//! `db` (SQLite) and `postgrest` (Supabase REST) provide the implementations.

use crate::error::Result;
use crate::model::{CoverageRecord, CoverageUpsert, NewRepoCoverage, RepoCoverage};

pub trait CoverageStore {
    /// Rows for `repo_id` whose `full_path` is in `paths`. One call is one
    /// backend request; callers are responsible for keeping `paths` within
    /// the backend's request-size ceiling (see `batch::fetch_existing`).
    fn fetch_by_paths(&mut self, repo_id: i64, paths: &[String]) -> Result<Vec<CoverageRecord>>;

    /// Insert-or-update keyed on `(repo_id, full_path)`, all-or-nothing.
    /// Returns the rows as stored.
    fn upsert_coverages(&mut self, rows: &[CoverageUpsert]) -> Result<Vec<CoverageRecord>>;

    /// Append one row to the repository coverage history.
    fn insert_repo_coverage(&mut self, row: &NewRepoCoverage) -> Result<RepoCoverage>;
}
