use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row, ToSql, Transaction};
use std::path::Path;

use crate::error::{CovsyncError, Result};
use crate::model::{CoverageRecord, CoverageUpsert, Level, NewRepoCoverage, RepoCoverage};
use crate::store::CoverageStore;

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

const COVERAGE_COLUMNS: &str = "id, owner_id, repo_id, branch_name, level, full_path, language, \
     statement_coverage, function_coverage, branch_coverage, line_coverage, path_coverage, \
     uncovered_lines, uncovered_functions, uncovered_branches, created_by, updated_by, \
     created_at, updated_at, github_issue_url, file_size, is_excluded_from_testing";

const REPO_COVERAGE_COLUMNS: &str = "id, owner_id, owner_name, repo_id, repo_name, branch_name, \
     language, line_coverage, statement_coverage, function_coverage, branch_coverage, \
     created_by, created_at";

/// Open (or create) the covsync database at the given path.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

/// Ensure the schema is initialized. Safe to call on an already-initialized DB.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: u32 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?;
    if count == 0 {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    let version: u32 =
        conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(CovsyncError::Other(format!(
            "Database schema version {} is newer than this binary supports ({}). \
             Please upgrade covsync.",
            version, SCHEMA_VERSION
        )));
    }
    if version < SCHEMA_VERSION {
        return Err(CovsyncError::Other(format!(
            "Database schema version {} predates this binary ({}) and has no \
             migration path. Delete the database and re-ingest.",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

impl ToSql for Level {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Level {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse::<Level>().map_err(|_| FromSqlError::InvalidType)
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<CoverageRecord> {
    Ok(CoverageRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        repo_id: row.get(2)?,
        branch_name: row.get(3)?,
        level: row.get(4)?,
        full_path: row.get(5)?,
        language: row.get(6)?,
        statement_coverage: row.get(7)?,
        function_coverage: row.get(8)?,
        branch_coverage: row.get(9)?,
        line_coverage: row.get(10)?,
        path_coverage: row.get(11)?,
        uncovered_lines: row.get(12)?,
        uncovered_functions: row.get(13)?,
        uncovered_branches: row.get(14)?,
        created_by: row.get(15)?,
        updated_by: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
        github_issue_url: row.get(19)?,
        file_size: row.get(20)?,
        is_excluded_from_testing: row.get(21)?,
    })
}

fn row_to_repo_coverage(row: &Row) -> rusqlite::Result<RepoCoverage> {
    Ok(RepoCoverage {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_name: row.get(2)?,
        repo_id: row.get(3)?,
        repo_name: row.get(4)?,
        branch_name: row.get(5)?,
        language: row.get(6)?,
        line_coverage: row.get(7)?,
        statement_coverage: row.get(8)?,
        function_coverage: row.get(9)?,
        branch_coverage: row.get(10)?,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
    })
}

/// Rows for `repo_id` whose `full_path` is one of `paths`.
pub fn fetch_coverages(conn: &Connection, repo_id: i64, paths: &[String]) -> Result<Vec<CoverageRecord>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (0..paths.len())
        .map(|i| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM coverages WHERE repo_id = ?1 AND full_path IN ({})",
        COVERAGE_COLUMNS, placeholders
    );
    let mut values: Vec<&dyn ToSql> = Vec::with_capacity(paths.len() + 1);
    values.push(&repo_id);
    values.extend(paths.iter().map(|p| p as &dyn ToSql));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(values.as_slice(), row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Insert-or-update every row in one transaction and return them as stored.
///
/// On conflict the author, creation time, linked issue and test exclusion of
/// the stored row are kept; everything else takes the new value.
pub fn upsert_coverages(conn: &mut Connection, rows: &[CoverageUpsert]) -> Result<Vec<CoverageRecord>> {
    let tx = conn.transaction()?;
    let stored = upsert_coverages_tx(&tx, rows)?;
    tx.commit()?;
    Ok(stored)
}

fn upsert_coverages_tx(tx: &Transaction, rows: &[CoverageUpsert]) -> Result<Vec<CoverageRecord>> {
    let now = Utc::now().to_rfc3339();
    let mut stored = Vec::with_capacity(rows.len());
    {
        let mut upsert = tx.prepare_cached(
            "INSERT INTO coverages (owner_id, repo_id, branch_name, level, full_path, language, \
                 statement_coverage, function_coverage, branch_coverage, line_coverage, path_coverage, \
                 uncovered_lines, uncovered_functions, uncovered_branches, created_by, updated_by, \
                 created_at, updated_at, github_issue_url, file_size, is_excluded_from_testing) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17, ?18, ?19, ?20) \
             ON CONFLICT(repo_id, full_path) DO UPDATE SET \
                 owner_id = excluded.owner_id, \
                 branch_name = excluded.branch_name, \
                 level = excluded.level, \
                 language = excluded.language, \
                 statement_coverage = excluded.statement_coverage, \
                 function_coverage = excluded.function_coverage, \
                 branch_coverage = excluded.branch_coverage, \
                 line_coverage = excluded.line_coverage, \
                 path_coverage = excluded.path_coverage, \
                 uncovered_lines = excluded.uncovered_lines, \
                 uncovered_functions = excluded.uncovered_functions, \
                 uncovered_branches = excluded.uncovered_branches, \
                 updated_by = excluded.updated_by, \
                 updated_at = excluded.updated_at, \
                 file_size = COALESCE(excluded.file_size, coverages.file_size)",
        )?;
        for row in rows {
            upsert.execute(params![
                row.owner_id,
                row.repo_id,
                row.branch_name,
                row.level,
                row.full_path,
                row.language,
                row.statement_coverage,
                row.function_coverage,
                row.branch_coverage,
                row.line_coverage,
                row.path_coverage,
                row.uncovered_lines,
                row.uncovered_functions,
                row.uncovered_branches,
                row.created_by,
                row.updated_by,
                now,
                row.github_issue_url,
                row.file_size,
                row.is_excluded_from_testing,
            ])?;
        }
    }

    let mut select = tx.prepare_cached(&format!(
        "SELECT {} FROM coverages WHERE repo_id = ?1 AND full_path = ?2",
        COVERAGE_COLUMNS
    ))?;
    for row in rows {
        stored.push(select.query_row(params![row.repo_id, row.full_path], row_to_record)?);
    }
    Ok(stored)
}

/// Append one history row.
pub fn insert_repo_coverage(conn: &Connection, row: &NewRepoCoverage) -> Result<RepoCoverage> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO repo_coverage (owner_id, owner_name, repo_id, repo_name, branch_name, language, \
             line_coverage, statement_coverage, function_coverage, branch_coverage, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            row.owner_id,
            row.owner_name,
            row.repo_id,
            row.repo_name,
            row.branch_name,
            row.language,
            row.line_coverage,
            row.statement_coverage,
            row.function_coverage,
            row.branch_coverage,
            row.created_by,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    let stored = conn.query_row(
        &format!("SELECT {} FROM repo_coverage WHERE id = ?1", REPO_COVERAGE_COLUMNS),
        params![id],
        row_to_repo_coverage,
    )?;
    Ok(stored)
}

// ── Query helpers ──────────────────────────────────────────────────────────

/// Stored rows for a repository, optionally restricted to one level.
/// Sorted by path, or worst line coverage first.
pub fn list_coverages(
    conn: &Connection,
    repo_id: i64,
    level: Option<Level>,
    sort_by_coverage: bool,
) -> Result<Vec<CoverageRecord>> {
    let order = if sort_by_coverage {
        "line_coverage ASC, full_path ASC"
    } else {
        "full_path ASC"
    };
    let sql = format!(
        "SELECT {} FROM coverages WHERE repo_id = ?1 AND (?2 IS NULL OR level = ?2) ORDER BY {}",
        COVERAGE_COLUMNS, order
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![repo_id, level], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Rollup history for a repository, oldest first.
pub fn list_repo_coverage(conn: &Connection, repo_id: i64) -> Result<Vec<RepoCoverage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM repo_coverage WHERE repo_id = ?1 ORDER BY id ASC",
        REPO_COVERAGE_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![repo_id], row_to_repo_coverage)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

impl CoverageStore for Connection {
    fn fetch_by_paths(&mut self, repo_id: i64, paths: &[String]) -> Result<Vec<CoverageRecord>> {
        fetch_coverages(self, repo_id, paths)
    }

    fn upsert_coverages(&mut self, rows: &[CoverageUpsert]) -> Result<Vec<CoverageRecord>> {
        upsert_coverages(self, rows)
    }

    fn insert_repo_coverage(&mut self, row: &NewRepoCoverage) -> Result<RepoCoverage> {
        insert_repo_coverage(self, row)
    }
}
