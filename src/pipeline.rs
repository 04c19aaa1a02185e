//! One CI run, end to end: artifacts in, upserted coverage rows and a
//! history row out.
//!
//! Every step is sequential. Download and write failures abort the run;
//! missing provider configuration and empty inputs end it quietly with
//! `Ok(None)`.

use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};

use crate::augment::{add_uncovered_source_files, dedupe_by_path};
use crate::batch::{fetch_existing, BatchLimits};
use crate::circleci::CircleCiSource;
use crate::detect::LanguageDetector;
use crate::error::{CovsyncError, Result};
use crate::github::{GitHubActionsSource, GitHubClient};
use crate::merge::build_upserts;
use crate::model::{CoverageRecord, CoverageReport, RepoCoverage, RunContext, DETACHED_BRANCH};
use crate::normalize::normalize_artifact;
use crate::parsers::ReportParser;
use crate::rollup::build_rollup;
use crate::sources::{is_coverage_artifact, ArtifactSource, FileTreeProvider};
use crate::store::CoverageStore;

/// The CI provider whose artifacts feed a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiSource {
    Github,
    CircleCi,
}

impl FromStr for CiSource {
    type Err = CovsyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(CiSource::Github),
            "circleci" => Ok(CiSource::CircleCi),
            _ => Err(CovsyncError::Parse(format!(
                "Unknown CI source: '{}'. Expected 'github' or 'circleci'",
                s
            ))),
        }
    }
}

impl fmt::Display for CiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CiSource::Github => f.write_str("github"),
            CiSource::CircleCi => f.write_str("circleci"),
        }
    }
}

/// What a run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub written: Vec<CoverageRecord>,
    pub repo_coverage: Option<RepoCoverage>,
}

/// Branch to record for a run. Detached-HEAD runs carry none.
pub fn resolve_branch(branch: Option<&str>) -> String {
    match branch.filter(|b| !b.is_empty()) {
        Some(b) => b.to_string(),
        None => {
            info!("No branch on the CI run, recording coverage under '{}'", DETACHED_BRANCH);
            DETACHED_BRANCH.to_string()
        }
    }
}

pub struct Pipeline<'a> {
    pub store: &'a mut dyn CoverageStore,
    pub parser: &'a dyn ReportParser,
    pub detector: &'a dyn LanguageDetector,
    pub limits: BatchLimits,
}

impl Pipeline<'_> {
    /// Run against a concrete CI provider. For CircleCI, `run.run_id` is the
    /// GitHub check suite id that links to the CircleCI workflows.
    pub fn run_for_ci(
        &mut self,
        ci: CiSource,
        github: &GitHubClient,
        circleci_token: Option<String>,
        run: &RunContext,
    ) -> Result<Option<PipelineOutcome>> {
        let mut source: Box<dyn ArtifactSource + '_> = match ci {
            CiSource::Github => Box::new(GitHubActionsSource::new(
                github,
                &run.owner_name,
                &run.repo_name,
                run.run_id,
            )),
            CiSource::CircleCi => match circleci_source(github, circleci_token, run) {
                Ok(source) => Box::new(source),
                Err(CovsyncError::SourceConfig(msg)) => {
                    warn!("Skipping coverage for `{}`: {}", run.slug(), msg);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            },
        };
        self.run(source.as_mut(), github, run)
    }

    /// Collect every coverage artifact of the run, then persist.
    pub fn run(
        &mut self,
        source: &mut dyn ArtifactSource,
        tree: &dyn FileTreeProvider,
        run: &RunContext,
    ) -> Result<Option<PipelineOutcome>> {
        let artifacts = match source.list_artifacts() {
            Ok(artifacts) => artifacts,
            Err(CovsyncError::SourceConfig(msg)) => {
                warn!("Skipping coverage for `{}`: {}", run.slug(), msg);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut reports = Vec::new();
        for artifact in artifacts.iter().filter(|a| is_coverage_artifact(&a.name)) {
            match source.download(artifact)? {
                Some(text) => {
                    let entries = normalize_artifact(&text, self.parser, self.detector);
                    debug!("Artifact {} yielded {} entries", artifact.name, entries.len());
                    reports.extend(entries);
                }
                None => debug!("Artifact {} is empty, skipping", artifact.name),
            }
        }

        if reports.is_empty() {
            info!("No coverage artifacts for `{}` run {}", run.slug(), run.run_id);
            return Ok(None);
        }

        let files = tree.list_files(&run.owner_name, &run.repo_name, &run.branch_name)?;
        self.persist(reports, &files, run)
    }

    /// Augment, merge with stored rows, upsert, then append the rollup.
    ///
    /// The rollup row is taken from the normalized entries as received, so the
    /// first artifact's repository entry is the one recorded. It is written
    /// last: if it fails the file rows stay written and the error still
    /// propagates.
    pub fn persist(
        &mut self,
        mut reports: Vec<CoverageReport>,
        files: &[String],
        run: &RunContext,
    ) -> Result<Option<PipelineOutcome>> {
        if reports.is_empty() {
            return Ok(None);
        }
        let slug = run.slug();
        let rollup = build_rollup(&reports, run);

        let added = add_uncovered_source_files(&mut reports, files);
        if added > 0 {
            info!("Added {} uncovered source files for `{}`", added, slug);
        }
        let reports = dedupe_by_path(reports, &slug);

        let paths: Vec<String> = reports.iter().map(|r| r.full_path.clone()).collect();
        let existing = fetch_existing(&mut *self.store, run.repo_id, &paths, self.limits);
        let run_language = self.detector.detect(&reports);
        let rows = build_upserts(&reports, &existing, run, &run_language);
        if rows.is_empty() {
            warn!("No writable coverage rows for `{}`", slug);
            return Ok(None);
        }

        let written = self.store.upsert_coverages(&rows)?;
        info!("Upserted {} coverage rows for `{}`", written.len(), slug);

        let repo_coverage = match rollup {
            Some(row) => Some(self.store.insert_repo_coverage(&row)?),
            None => None,
        };

        Ok(Some(PipelineOutcome {
            written,
            repo_coverage,
        }))
    }
}

fn circleci_source(
    github: &GitHubClient,
    token: Option<String>,
    run: &RunContext,
) -> Result<CircleCiSource> {
    if token.as_deref().map_or(true, str::is_empty) {
        return Err(CovsyncError::SourceConfig("no CircleCI token configured".to_string()));
    }
    let workflow_ids = github
        .circleci_workflow_ids(&run.owner_name, &run.repo_name, run.run_id)
        .unwrap_or_else(|e| {
            warn!("Failed to read CircleCI workflow ids for `{}`: {}", run.slug(), e);
            Vec::new()
        });
    CircleCiSource::new(token, workflow_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ci_source_round_trip() {
        assert_eq!("github".parse::<CiSource>().unwrap(), CiSource::Github);
        assert_eq!("CircleCI".parse::<CiSource>().unwrap(), CiSource::CircleCi);
        assert_eq!(CiSource::CircleCi.to_string(), "circleci");
        assert!("jenkins".parse::<CiSource>().is_err());
    }

    #[test]
    fn test_resolve_branch() {
        assert_eq!(resolve_branch(Some("main")), "main");
        assert_eq!(resolve_branch(None), "detached");
        assert_eq!(resolve_branch(Some("")), "detached");
    }

    #[test]
    fn test_circleci_without_token_is_noop() {
        let github = GitHubClient::new("unused");
        let run = RunContext {
            owner_id: 1,
            owner_name: "acme".to_string(),
            repo_id: 2,
            repo_name: "widgets".to_string(),
            run_id: 3,
            branch_name: "main".to_string(),
            user_name: "bot".to_string(),
        };
        let err = circleci_source(&github, None, &run).err().unwrap();
        assert!(matches!(err, CovsyncError::SourceConfig(_)));
    }
}
