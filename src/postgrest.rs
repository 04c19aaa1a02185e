//! Supabase (PostgREST) backed `CoverageStore`.

use log::debug;
use serde::de::DeserializeOwned;

use crate::error::{CovsyncError, Result};
use crate::model::{CoverageRecord, CoverageUpsert, NewRepoCoverage, RepoCoverage};
use crate::store::CoverageStore;

const COVERAGES_TABLE: &str = "coverages";
const REPO_COVERAGE_TABLE: &str = "repo_coverage";

pub struct PostgrestStore {
    base_url: String,
    api_key: String,
}

impl PostgrestStore {
    /// `url` is the project URL (`https://<ref>.supabase.co`); the REST
    /// root is derived from it.
    pub fn new(url: &str, api_key: impl Into<String>) -> Self {
        Self {
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authed(&self, req: ureq::Request) -> ureq::Request {
        req.set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Accept", "application/json")
            .set("User-Agent", "covsync")
    }
}

/// PostgREST `in.(...)` operand for a list of paths. Each path is quoted so
/// commas and parentheses inside it stay literal.
pub fn in_filter(paths: &[String]) -> String {
    let quoted: Vec<String> = paths
        .iter()
        .map(|p| format!("\"{}\"", p.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

/// Turn a ureq result into a typed body, keeping the server's error text.
fn read_json<T: DeserializeOwned>(
    resp: std::result::Result<ureq::Response, ureq::Error>,
    wrap: fn(String) -> CovsyncError,
) -> Result<T> {
    match resp {
        Ok(resp) => Ok(resp.into_json()?),
        Err(ureq::Error::Status(code, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            Err(wrap(format!("HTTP {}: {}", code, body)))
        }
        Err(e) => Err(e.into()),
    }
}

impl CoverageStore for PostgrestStore {
    fn fetch_by_paths(&mut self, repo_id: i64, paths: &[String]) -> Result<Vec<CoverageRecord>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Querying {} paths for repo {}", paths.len(), repo_id);
        let req = self
            .authed(ureq::get(&self.table_url(COVERAGES_TABLE)))
            .query("select", "*")
            .query("repo_id", &format!("eq.{}", repo_id))
            .query("full_path", &in_filter(paths));
        read_json(req.call(), CovsyncError::Query)
    }

    fn upsert_coverages(&mut self, rows: &[CoverageUpsert]) -> Result<Vec<CoverageRecord>> {
        let req = self
            .authed(ureq::post(&self.table_url(COVERAGES_TABLE)))
            .query("on_conflict", "repo_id,full_path")
            .set("Prefer", "resolution=merge-duplicates,return=representation");
        read_json(req.send_json(rows), CovsyncError::Write)
    }

    fn insert_repo_coverage(&mut self, row: &NewRepoCoverage) -> Result<RepoCoverage> {
        let req = self
            .authed(ureq::post(&self.table_url(REPO_COVERAGE_TABLE)))
            .set("Prefer", "return=representation");
        let mut inserted: Vec<RepoCoverage> = read_json(req.send_json(row), CovsyncError::Write)?;
        if inserted.is_empty() {
            return Err(CovsyncError::Write(
                "repo_coverage insert returned no rows".to_string(),
            ));
        }
        Ok(inserted.swap_remove(0))
    }
}
