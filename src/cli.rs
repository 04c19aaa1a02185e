//! Command handler functions for the covsync CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use rusqlite::Connection;

use crate::db;
use crate::github::GitHubClient;
use crate::model::{Level, RunContext};
use crate::normalize::normalize_artifacts;
use crate::pipeline::{CiSource, Pipeline, PipelineOutcome};

/// Run the pipeline for one CI run. A missing GitHub token is a skipped run,
/// not an error.
pub fn cmd_ingest(
    pipeline: &mut Pipeline,
    ci: CiSource,
    github_token: Option<&str>,
    github_api: Option<&str>,
    circleci_token: Option<String>,
    run: &RunContext,
) -> Result<String> {
    let Some(token) = github_token.filter(|t| !t.is_empty()) else {
        warn!("No GitHub token configured, skipping `{}`", run.slug());
        return Ok(describe_outcome(None, run));
    };
    let mut github = GitHubClient::new(token);
    if let Some(base) = github_api {
        github = github.with_api_base(base);
    }
    let outcome = pipeline
        .run_for_ci(ci, &github, circleci_token, run)
        .with_context(|| format!("Coverage sync failed for {} run {}", run.slug(), run.run_id))?;
    Ok(describe_outcome(outcome, run))
}

/// Run the offline half of the pipeline over local LCOV files. `files_from`
/// lists the repository's files, one path per line; without it no
/// zero-coverage entries are added.
pub fn cmd_ingest_file(
    pipeline: &mut Pipeline,
    lcov_files: &[PathBuf],
    files_from: Option<&Path>,
    run: &RunContext,
) -> Result<String> {
    let mut texts = Vec::with_capacity(lcov_files.len());
    for path in lcov_files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        texts.push(text);
    }
    let tree = match files_from {
        Some(path) => read_file_list(path)?,
        None => Vec::new(),
    };

    let reports = normalize_artifacts(&texts, pipeline.parser, pipeline.detector);
    let outcome = pipeline.persist(reports, &tree, run)?;
    Ok(describe_outcome(outcome, run))
}

fn read_file_list(path: &Path) -> Result<Vec<String>> {
    let listing = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file list {}", path.display()))?;
    Ok(listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.trim_start_matches("./").to_string())
        .collect())
}

fn describe_outcome(outcome: Option<PipelineOutcome>, run: &RunContext) -> String {
    let Some(outcome) = outcome else {
        return format!("No coverage written for {} (branch '{}')\n", run.slug(), run.branch_name);
    };
    let mut out = format!(
        "Wrote {} coverage rows for {} (branch '{}')\n",
        outcome.written.len(),
        run.slug(),
        run.branch_name
    );
    if let Some(repo) = outcome.repo_coverage {
        writeln!(
            out,
            "Repository coverage: lines {:.2}%, statements {:.2}%, functions {:.2}%, branches {:.2}%",
            repo.line_coverage, repo.statement_coverage, repo.function_coverage, repo.branch_coverage
        )
        .unwrap();
    }
    out
}

pub fn cmd_files(
    conn: &Connection,
    repo_id: i64,
    level: Option<Level>,
    sort_by_coverage: bool,
) -> Result<String> {
    let rows = db::list_coverages(conn, repo_id, level, sort_by_coverage)?;
    if rows.is_empty() {
        return Ok(format!("No coverage stored for repo {}.\n", repo_id));
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<60} {:<10} {:>8} {:>8} {:>8}",
        "PATH", "LEVEL", "LINES", "FUNCS", "BRANCHES"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(98)).unwrap();
    for r in &rows {
        writeln!(
            out,
            "{:<60} {:<10} {:>7.2}% {:>7.2}% {:>7.2}%",
            r.full_path, r.level, r.line_coverage, r.function_coverage, r.branch_coverage
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_history(conn: &Connection, repo_id: i64) -> Result<String> {
    let rows = db::list_repo_coverage(conn, repo_id)?;
    if rows.is_empty() {
        return Ok(format!("No coverage history for repo {}.\n", repo_id));
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<27} {:<20} {:<12} {:>8} {:>8} {:>8}",
        "CREATED", "BRANCH", "LANGUAGE", "LINES", "FUNCS", "BRANCHES"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(88)).unwrap();
    for r in &rows {
        writeln!(
            out,
            "{:<27} {:<20} {:<12} {:>7.2}% {:>7.2}% {:>7.2}%",
            r.created_at,
            r.branch_name,
            r.language,
            r.line_coverage,
            r.function_coverage,
            r.branch_coverage
        )
        .unwrap();
    }
    Ok(out)
}
