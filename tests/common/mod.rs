#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;

use covsync::error::{CovsyncError, Result};
use covsync::model::{
    CoverageRecord, CoverageUpsert, NewRepoCoverage, RepoCoverage, RunContext,
};
use covsync::sources::{ArtifactRef, ArtifactSource, FileTreeProvider};
use covsync::store::CoverageStore;
use rusqlite::Connection;
use tempfile::TempDir;

/// Create a fresh temporary database, returning the connection, dir handle, and db path.
/// The caller must hold onto `TempDir` to keep the temp directory alive.
pub fn setup_db() -> (Connection, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let conn = covsync::db::open(&db_path).unwrap();
    covsync::db::init_schema(&conn).unwrap();
    (conn, dir, db_path)
}

pub fn run_context() -> RunContext {
    RunContext {
        owner_id: 11,
        owner_name: "acme".to_string(),
        repo_id: 42,
        repo_name: "widgets".to_string(),
        run_id: 1001,
        branch_name: "main".to_string(),
        user_name: "ci-bot".to_string(),
    }
}

/// Artifacts served from memory.
#[derive(Default)]
pub struct FakeSource {
    pub artifacts: Vec<(ArtifactRef, Option<String>)>,
    pub list_error: Option<fn() -> CovsyncError>,
    pub fail_downloads: bool,
    pub downloaded: Vec<String>,
}

impl FakeSource {
    pub fn with(artifacts: &[(&str, &str)]) -> Self {
        Self {
            artifacts: artifacts
                .iter()
                .enumerate()
                .map(|(i, (name, text))| {
                    let body = if text.is_empty() { None } else { Some(text.to_string()) };
                    (ArtifactRef::new(i.to_string(), *name), body)
                })
                .collect(),
            ..Self::default()
        }
    }
}

impl ArtifactSource for FakeSource {
    fn list_artifacts(&mut self) -> Result<Vec<ArtifactRef>> {
        if let Some(make) = self.list_error {
            return Err(make());
        }
        Ok(self.artifacts.iter().map(|(a, _)| a.clone()).collect())
    }

    fn download(&mut self, artifact: &ArtifactRef) -> Result<Option<String>> {
        if self.fail_downloads {
            return Err(CovsyncError::Download(format!("{}: connection reset", artifact.name)));
        }
        self.downloaded.push(artifact.name.clone());
        Ok(self
            .artifacts
            .iter()
            .find(|(a, _)| a == artifact)
            .and_then(|(_, body)| body.clone()))
    }
}

pub struct FakeTree(pub Vec<String>);

impl FakeTree {
    pub fn of(paths: &[&str]) -> Self {
        FakeTree(paths.iter().map(|p| p.to_string()).collect())
    }
}

impl FileTreeProvider for FakeTree {
    fn list_files(&self, _owner: &str, _repo: &str, _branch: &str) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// A `CoverageStore` with upsert-by-key semantics and switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    pub rows: HashMap<(i64, String), CoverageRecord>,
    pub history: Vec<RepoCoverage>,
    pub fetch_calls: Vec<Vec<String>>,
    /// Zero-based index of the fetch call that fails.
    pub fail_fetch_call: Option<usize>,
    pub fail_upsert: bool,
    pub fail_rollup: bool,
    pub upsert_calls: usize,
    pub next_id: i64,
}

impl MemoryStore {
    pub fn get(&self, repo_id: i64, path: &str) -> Option<&CoverageRecord> {
        self.rows.get(&(repo_id, path.to_string()))
    }

    pub fn seed(&mut self, record: CoverageRecord) {
        self.rows
            .insert((record.repo_id, record.full_path.clone()), record);
    }
}

impl CoverageStore for MemoryStore {
    fn fetch_by_paths(&mut self, repo_id: i64, paths: &[String]) -> Result<Vec<CoverageRecord>> {
        let call = self.fetch_calls.len();
        self.fetch_calls.push(paths.to_vec());
        if self.fail_fetch_call == Some(call) {
            return Err(CovsyncError::Query("HTTP 400: URI too long".to_string()));
        }
        Ok(paths
            .iter()
            .filter_map(|p| self.rows.get(&(repo_id, p.clone())).cloned())
            .collect())
    }

    fn upsert_coverages(&mut self, rows: &[CoverageUpsert]) -> Result<Vec<CoverageRecord>> {
        self.upsert_calls += 1;
        if self.fail_upsert {
            return Err(CovsyncError::Write("HTTP 500".to_string()));
        }
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let key = (row.repo_id, row.full_path.clone());
            let (id, created_at) = match self.rows.get(&key) {
                Some(prev) => (prev.id, prev.created_at.clone()),
                None => {
                    self.next_id += 1;
                    (Some(self.next_id), Some("2024-01-01T00:00:00Z".to_string()))
                }
            };
            let record = CoverageRecord {
                id,
                owner_id: row.owner_id,
                repo_id: row.repo_id,
                branch_name: row.branch_name.clone(),
                level: row.level,
                full_path: row.full_path.clone(),
                language: row.language.clone(),
                statement_coverage: row.statement_coverage,
                function_coverage: row.function_coverage,
                branch_coverage: row.branch_coverage,
                line_coverage: row.line_coverage,
                path_coverage: row.path_coverage,
                uncovered_lines: row.uncovered_lines.clone(),
                uncovered_functions: row.uncovered_functions.clone(),
                uncovered_branches: row.uncovered_branches.clone(),
                created_by: row.created_by.clone(),
                updated_by: row.updated_by.clone(),
                created_at,
                updated_at: Some("2024-06-01T00:00:00Z".to_string()),
                github_issue_url: row.github_issue_url.clone(),
                file_size: row.file_size,
                is_excluded_from_testing: row.is_excluded_from_testing,
            };
            self.rows.insert(key, record.clone());
            stored.push(record);
        }
        Ok(stored)
    }

    fn insert_repo_coverage(&mut self, row: &NewRepoCoverage) -> Result<RepoCoverage> {
        if self.fail_rollup {
            return Err(CovsyncError::Write("repo_coverage unavailable".to_string()));
        }
        let stored = RepoCoverage {
            id: self.history.len() as i64 + 1,
            owner_id: row.owner_id,
            owner_name: row.owner_name.clone(),
            repo_id: row.repo_id,
            repo_name: row.repo_name.clone(),
            branch_name: row.branch_name.clone(),
            language: row.language.clone(),
            line_coverage: row.line_coverage,
            statement_coverage: row.statement_coverage,
            function_coverage: row.function_coverage,
            branch_coverage: row.branch_coverage,
            created_by: row.created_by.clone(),
            created_at: "2024-06-01T00:00:00Z".to_string(),
        };
        self.history.push(stored.clone());
        Ok(stored)
    }
}
